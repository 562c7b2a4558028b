use std::path::PathBuf;

use serde::Deserialize;

use crate::factory::Credentials;
use crate::queue::multi_worker::DEFAULT_WORKERS;

/// Process settings of the `edgebus` binary.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Where the routing configuration lives and how the broker is sized.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub config_path: PathBuf,
    pub file_workers: usize,
    pub s3_workers: usize,
    pub credentials: Credentials,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Settings as found in files and the environment, every field optional.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialBrokerSettings {
    pub config_path: Option<PathBuf>,
    pub file_workers: Option<usize>,
    pub s3_workers: Option<usize>,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                config_path: PathBuf::from("config/broker.json"),
                file_workers: DEFAULT_WORKERS,
                s3_workers: DEFAULT_WORKERS,
                credentials: Credentials::default(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fills every field missing from `partial` with its default.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let broker = partial.broker.unwrap_or_default();
        let logging = partial.logging.unwrap_or_default();

        Settings {
            broker: BrokerSettings {
                config_path: broker.config_path.unwrap_or(default.broker.config_path),
                file_workers: broker.file_workers.unwrap_or(default.broker.file_workers),
                s3_workers: broker.s3_workers.unwrap_or(default.broker.s3_workers),
                credentials: broker.credentials.unwrap_or(default.broker.credentials),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}
