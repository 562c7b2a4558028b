use std::fs;
use std::path::PathBuf;

use serial_test::serial;

use super::*;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.config_path, PathBuf::from("config/broker.json"));
    assert_eq!(settings.broker.file_workers, 4);
    assert_eq!(settings.broker.s3_workers, 4);
    assert!(settings.broker.credentials.ca_path.is_none());
    assert_eq!(settings.logging.level, "info");
}

#[test]
fn test_merge_keeps_given_fields() {
    let settings = Settings::merge(PartialSettings {
        broker: Some(PartialBrokerSettings {
            s3_workers: Some(2),
            ..Default::default()
        }),
        logging: None,
    });
    assert_eq!(settings.broker.s3_workers, 2);
    assert_eq!(settings.broker.file_workers, 4);
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edgebus.toml");
    fs::write(
        &path,
        r#"
            [broker]
            config_path = "/etc/edgebus/broker.json"
            file_workers = 8

            [broker.credentials]
            ca_path = "/etc/edgebus/ca.pem"

            [logging]
            level = "debug"
        "#,
    )
    .unwrap();

    let base = dir.path().join("edgebus");
    let settings = load_config_from(&base.to_string_lossy()).unwrap();
    assert_eq!(
        settings.broker.config_path,
        PathBuf::from("/etc/edgebus/broker.json")
    );
    assert_eq!(settings.broker.file_workers, 8);
    assert_eq!(settings.broker.s3_workers, 4);
    assert_eq!(
        settings.broker.credentials.ca_path,
        Some(PathBuf::from("/etc/edgebus/ca.pem"))
    );
    assert_eq!(settings.logging.level, "debug");
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edgebus.toml");
    fs::write(&path, "[broker]\nfile_workers = 8\n").unwrap();
    let base = dir.path().join("edgebus");

    temp_env::with_vars(
        [
            ("EDGEBUS_BROKER__FILE_WORKERS", Some("16")),
            ("EDGEBUS_LOGGING__LEVEL", Some("warn")),
        ],
        || {
            let settings = load_config_from(&base.to_string_lossy()).unwrap();
            assert_eq!(settings.broker.file_workers, 16);
            assert_eq!(settings.logging.level, "warn");
        },
    );
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("absent");
    let settings = load_config_from(&base.to_string_lossy()).unwrap();
    assert_eq!(settings.broker.file_workers, 4);
}
