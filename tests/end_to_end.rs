use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use edgebus::broker::{BrokerConfig, MessageBroker};
use edgebus::payload::Payload;
use edgebus::protocol::{ProtocolMessage, UnsubscribeStatus};
use edgebus::utils::{BrokerError, logging};
use serde_json::json;

fn frame_broker(dir: &std::path::Path) -> MessageBroker {
    logging::init("debug");
    let config = BrokerConfig::from_value(json!({
        "targets": [{ "protocol": "file", "name": "f", "file_options": {} }],
        "pipes": [{
            "message_id": "m",
            "destinations": [{
                "target_name": "f",
                "file_message_options": {
                    "directory": dir.join("out").to_string_lossy(),
                    "filename": "${count}_frame"
                }
            }]
        }]
    }))
    .unwrap();
    let broker = MessageBroker::new(config).unwrap();
    broker.initialize().unwrap();
    broker
}

#[test]
fn file_pipe_writes_counted_frames() {
    let dir = tempfile::tempdir().unwrap();
    let broker = frame_broker(dir.path());

    let frames: Vec<Arc<Payload>> = (0u8..3)
        .map(|i| Arc::new(Payload::from_bytes(vec![i, 42, 42])))
        .collect();
    for frame in &frames {
        broker.publish("m", frame.clone()).unwrap();
    }

    let out = dir.path().join("out");
    for (i, frame) in frames.iter().enumerate() {
        let written = fs::read(out.join(format!("{i}_frame"))).unwrap();
        assert_eq!(written, frame.serialize().as_ref());
    }
    assert_eq!(fs::read_dir(&out).unwrap().count(), 3);
}

#[test]
fn local_subscription_and_async_publish() {
    let dir = tempfile::tempdir().unwrap();
    let broker = frame_broker(dir.path());

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let token = broker
        .subscribe(
            "m",
            Arc::new(move |payload: Arc<Payload>| {
                sink.lock().unwrap().push(payload.serialize().into_owned());
                Ok(())
            }),
        )
        .unwrap();

    let completions = Arc::new(AtomicUsize::new(0));
    let done = completions.clone();
    broker
        .publish_str_async(
            "m",
            "hello",
            Arc::new(move |_protocol: &str, _message: &ProtocolMessage, ok: bool| {
                assert!(ok);
                done.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    broker.flush();

    assert_eq!(completions.load(Ordering::SeqCst), 2);
    assert_eq!(*received.lock().unwrap(), vec![b"hello".to_vec()]);
    assert_eq!(
        fs::read(dir.path().join("out").join("0_frame")).unwrap(),
        b"hello"
    );
    assert_eq!(broker.unsubscribe(token).unwrap(), UnsubscribeStatus::Removed);
}

#[test]
fn unknown_protocol_is_rejected() {
    let config = BrokerConfig::from_value(json!({
        "targets": [{ "protocol": "carrier-pigeon", "name": "p" }]
    }))
    .unwrap();
    let broker = MessageBroker::new(config).unwrap();
    assert!(matches!(
        broker.initialize(),
        Err(BrokerError::InvalidArgument(msg)) if msg.contains("carrier-pigeon")
    ));
}
