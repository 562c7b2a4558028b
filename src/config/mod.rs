//! Process settings loaded with the `config` crate.
//!
//! Sources, later ones winning: built-in defaults, `config/default.*`
//! (optional, any format the `config` crate reads) and `EDGEBUS_*`
//! environment variables with `__` between nested keys, for example
//! `EDGEBUS_BROKER__FILE_WORKERS=8`.

mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BrokerSettings, LoggingSettings, PartialBrokerSettings, PartialLoggingSettings,
    PartialSettings, Settings,
};

pub const ENV_PREFIX: &str = "EDGEBUS";

/// Loads settings from `config/default` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads settings from the file `base` (extension optional) and the environment.
pub fn load_config_from(base: &str) -> Result<Settings, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name(base).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    Ok(Settings::merge(partial))
}

#[cfg(test)]
mod tests;
