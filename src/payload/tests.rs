use std::sync::Arc;

use super::{Classification, Payload};

#[test]
fn test_payload_new_has_identity() {
    let a = Payload::from_string("hello");
    let b = Payload::from_string("hello");
    assert!(!a.id().is_empty());
    assert_ne!(a.id(), b.id());
    assert_eq!(a.correlation_id(), "");
    assert!(a.timestamp() > 0);
}

#[test]
fn test_payload_builders() {
    let p = Payload::from_bytes(vec![1, 2, 3])
        .with_correlation_id("corr-7")
        .with_timestamp(42);
    assert_eq!(p.correlation_id(), "corr-7");
    assert_eq!(p.timestamp(), 42);
    assert_eq!(&*p.serialize(), &[1, 2, 3]);
}

#[test]
fn test_payload_classification() {
    assert_eq!(
        Payload::from_bytes(vec![1, 0]).classification(),
        Classification::Anomaly
    );
    assert_eq!(
        Payload::from_bytes(vec![0, 1]).classification(),
        Classification::Normal
    );
    assert_eq!(
        Payload::from_bytes(Vec::new()).classification(),
        Classification::Normal
    );
}

#[test]
fn test_batch_serializes_manifest() {
    let first = Arc::new(Payload::from_string("abc").with_correlation_id("c1"));
    let second = Arc::new(Payload::from_string("de"));
    let batch = Payload::batch(vec![first.clone(), second.clone()]);

    assert!(batch.is_batch());
    assert_eq!(batch.items().len(), 2);

    let manifest: serde_json::Value = serde_json::from_slice(&batch.serialize()).unwrap();
    assert_eq!(manifest["id"], batch.id());
    assert_eq!(manifest["items"][0]["id"], first.id());
    assert_eq!(manifest["items"][0]["correlation_id"], "c1");
    assert_eq!(manifest["items"][0]["size"], 3);
    assert_eq!(manifest["items"][1]["size"], 2);
}
