use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::protocol::{Address, PinDriver, S3Address};

fn expander() -> Arc<MacroExpander> {
    Arc::new(MacroExpander::new())
}

fn invalid_message(result: Result<()>) -> String {
    match result {
        Err(BrokerError::InvalidArgument(msg)) => msg,
        other => panic!("expected invalid argument, got {other:?}"),
    }
}

#[test]
fn test_missing_field_is_named() {
    let factory = FileFactory::new(expander(), 1);
    let msg = invalid_message(factory.validate_message_options(&json!({ "directory": "./out" })));
    assert_eq!(msg, "file_message_options: missing required field 'filename'");
}

#[test]
fn test_mistyped_field_is_named() {
    let factory = S3Factory::new(expander(), 1);
    let msg = invalid_message(factory.validate_message_options(&json!({
        "bucket": "b",
        "key": "k",
        "overwrite": "no"
    })));
    assert_eq!(
        msg,
        "s3_message_options: field 'overwrite' must be a boolean, found a string"
    );

    let msg = invalid_message(factory.validate_message_options(&json!({ "bucket": 5, "key": "k" })));
    assert!(msg.contains("'bucket' must be a string"));
}

#[test]
fn test_options_must_be_object() {
    let factory = MqttFactory::new(expander());
    let msg = invalid_message(factory.validate_message_options(&json!(["topic"])));
    assert!(msg.contains("expected a JSON object"));
}

#[test]
fn test_s3_message_defaults() {
    let factory = S3Factory::new(expander(), 1);
    let payload = Arc::new(Payload::from_string("x"));
    let message = factory
        .create_message(
            payload.clone(),
            &json!({ "bucket": "frames", "key": "cam/${id}.jpg" }),
        )
        .unwrap();
    assert_eq!(
        message.address(),
        &Address::S3(S3Address {
            bucket: "frames".into(),
            key: format!("cam/{}.jpg", payload.id()),
            key_template: "cam/${id}.jpg".into(),
            overwrite: true,
            batch_payload_expansion: true,
        })
    );
}

#[test]
fn test_publish_only_factories_reject_subscriptions() {
    let s3 = S3Factory::new(expander(), 1);
    let file = FileFactory::new(expander(), 1);
    let gpio = GpioFactory::new(expander());
    let factories: [&dyn ProtocolFactory; 3] = [&s3, &file, &gpio];
    for factory in factories {
        assert!(matches!(
            factory.create_subscription(&json!({ "topic": "t" })),
            Err(BrokerError::NotImplemented(_))
        ));
    }
}

#[test]
fn test_mqtt_subscription() {
    let factory = MqttFactory::new(expander());
    assert_eq!(
        factory.create_subscription(&json!({ "topic": "cmd/#" })).unwrap(),
        Subscription::mqtt("cmd/#")
    );
    assert!(factory.create_subscription(&json!({})).is_err());
}

#[test]
fn test_mqtt_settings_from_options() {
    let factory = MqttFactory::new(expander());
    let settings = factory
        .settings(
            &json!({ "endpoint": "broker.local", "region": "eu-west-1", "client-id": "cam-1" }),
            &Credentials::default(),
        )
        .unwrap();
    assert_eq!(settings.host, "broker.local");
    assert_eq!(settings.port, 1883);
    assert_eq!(settings.client_id, "cam-1");
    assert_eq!(settings.region, "eu-west-1");
    assert!(settings.tls.is_none());

    let settings = factory
        .settings(
            &json!({ "endpoint": "broker.local:2883", "region": "eu-west-1" }),
            &Credentials::default(),
        )
        .unwrap();
    assert_eq!(settings.port, 2883);
    assert!(settings.client_id.starts_with("edgebus-"));
}

#[test]
fn test_mqtt_settings_require_endpoint_and_region() {
    let factory = MqttFactory::new(expander());
    let err = factory
        .settings(&json!({ "endpoint": "broker.local" }), &Credentials::default())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid argument: mqtt_options: missing required field 'region'"
    );
}

#[test]
fn test_mqtt_tls_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let ca = dir.path().join("ca.pem");
    let cert = dir.path().join("cert.pem");
    let key = dir.path().join("key.pem");
    for (path, body) in [(&ca, "ca"), (&cert, "cert"), (&key, "key")] {
        std::fs::write(path, body).unwrap();
    }
    let factory = MqttFactory::new(expander());
    let credentials = Credentials {
        ca_path: Some(ca),
        cert_path: Some(cert),
        key_path: Some(key),
    };
    let settings = factory
        .settings(
            &json!({ "endpoint": "iot.example.com", "region": "us-east-1" }),
            &credentials,
        )
        .unwrap();
    assert_eq!(settings.port, 8883);
    let tls = settings.tls.unwrap();
    assert_eq!(tls.ca, b"ca");
    assert_eq!(tls.client_auth, Some((b"cert".to_vec(), b"key".to_vec())));

    let half = Credentials {
        cert_path: None,
        ..credentials
    };
    assert!(factory
        .settings(&json!({ "endpoint": "h", "region": "r" }), &half)
        .is_err());
}

struct NullPins;

impl PinDriver for NullPins {
    fn write(&self, _pin: u8, _high: bool) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_gpio_factory_builds_client_and_message() {
    let factory = GpioFactory::new(expander()).with_driver(Arc::new(NullPins));
    let client = factory
        .create_protocol(&json!({}), &Credentials::default())
        .unwrap();
    assert_eq!(client.protocol(), Protocol::Gpio);

    let options = json!({
        "rules": "Anomaly;All",
        "signal_types": "rising;falling",
        "pins": "17;27",
        "pulse_width_ms": "1;1"
    });
    factory.validate_message_options(&options).unwrap();
    let message = factory
        .create_message(Arc::new(Payload::from_bytes(vec![1])), &options)
        .unwrap();
    client.publish(&message).unwrap();
}

#[test]
fn test_gpio_factory_rejects_unequal_lists() {
    let factory = GpioFactory::new(expander());
    let result = factory.create_message(
        Arc::new(Payload::from_bytes(vec![1])),
        &json!({
            "rules": "Anomaly;Normal",
            "signal_types": "rising;rising",
            "pins": "17;27;22",
            "pulse_width_ms": "10;10"
        }),
    );
    assert!(matches!(result, Err(BrokerError::InvalidArgument(_))));
}

#[test]
fn test_default_factories_cover_every_protocol() {
    let factories = default_factories(expander(), WorkerSizes::default());
    let protocols: Vec<Protocol> = factories.iter().map(|f| f.protocol()).collect();
    for protocol in [
        Protocol::Mqtt,
        Protocol::S3,
        Protocol::File,
        Protocol::Gpio,
        Protocol::Loopback,
    ] {
        assert!(protocols.contains(&protocol));
    }
    let s3 = factories
        .iter()
        .find(|f| f.protocol() == Protocol::S3)
        .unwrap();
    assert_eq!(s3.options_key(), "s3_options");
    assert_eq!(s3.message_options_key(), "s3_message_options");
}
