use super::BrokerError;
use super::logging;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warn");
}

#[test]
fn delivery_error_lists_failed_destinations() {
    let err = BrokerError::Delivery {
        failed: vec!["s3_archive".to_string(), "loopback".to_string()],
    };
    assert_eq!(err.to_string(), "delivery failed for: s3_archive, loopback");
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: BrokerError = io.into();
    assert!(matches!(err, BrokerError::Io(_)));
}
