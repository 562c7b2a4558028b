//! CLI for edgebus
//!
//! Subcommands:
//! - `run`: initialize a broker from its routing configuration and log every
//!   local delivery until Ctrl-C
//! - `publish`: publish one text or file payload synchronously and exit

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use edgebus::broker::{BrokerConfig, MessageBroker};
use edgebus::config::{Settings, load_config};
use edgebus::factory::WorkerSizes;
use edgebus::payload::Payload;
use edgebus::utils::logging;

#[derive(Parser)]
#[command(name = "edgebus")]
enum Command {
    /// Run the broker until interrupted
    Run {
        /// Routing configuration (defaults to `broker.config_path`)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Publish a single payload
    Publish {
        message_id: String,
        /// Text to publish, or `@path` to publish a file's bytes
        payload: String,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            return exit_code(Err(e.into()));
        }
    };
    logging::init(&settings.logging.level);

    exit_code(match Command::parse() {
        Command::Run { config } => run(&settings, config),
        Command::Publish {
            message_id,
            payload,
            config,
        } => publish(&settings, config, &message_id, &payload),
    })
}

/// Logs a failure once and turns it into the process exit status.
fn exit_code(result: Result<(), Box<dyn std::error::Error>>) -> ExitCode {
    if succeeded(result) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn succeeded(result: Result<(), Box<dyn std::error::Error>>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("edgebus failed: {e}");
            false
        }
    }
}

fn routing_config(
    settings: &Settings,
    path: Option<PathBuf>,
) -> Result<BrokerConfig, Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(|| settings.broker.config_path.clone());
    info!("loading routing configuration from {}", path.display());
    Ok(BrokerConfig::from_file(&path)?)
}

fn open_broker(
    settings: &Settings,
    config: BrokerConfig,
) -> Result<MessageBroker, Box<dyn std::error::Error>> {
    let broker = MessageBroker::with_settings(
        config,
        settings.broker.credentials.clone(),
        WorkerSizes {
            file: settings.broker.file_workers,
            s3: settings.broker.s3_workers,
        },
    )?;
    broker.initialize()?;
    Ok(broker)
}

fn run(settings: &Settings, config: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let routing = routing_config(settings, config)?;

    // every id that can reach a local subscriber
    let ids: BTreeSet<String> = routing
        .pipes
        .iter()
        .map(|p| p.message_id.clone())
        .chain(
            routing
                .targets
                .iter()
                .flat_map(|t| t.mqtt_subscriptions.iter().map(|s| s.subscription_id.clone())),
        )
        .collect();

    let broker = open_broker(settings, routing)?;
    for id in ids {
        let label = id.clone();
        broker.subscribe(
            &id,
            Arc::new(move |payload: Arc<Payload>| {
                info!(
                    "'{label}': payload {} ({} bytes, correlation id '{}')",
                    payload.id(),
                    payload.serialize().len(),
                    payload.correlation_id()
                );
                Ok(())
            }),
        )?;
    }

    info!("edgebus running, press Ctrl-C to stop");
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(tokio::signal::ctrl_c())?;
    info!("shutdown signal received");

    broker.flush();
    Ok(())
}

fn publish(
    settings: &Settings,
    config: Option<PathBuf>,
    message_id: &str,
    payload: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = match payload.strip_prefix('@') {
        Some(path) => Payload::from_bytes(fs::read(path)?),
        None => Payload::from_string(payload),
    };
    let broker = open_broker(settings, routing_config(settings, config)?)?;
    let payload = Arc::new(payload);
    broker.publish(message_id, payload.clone())?;
    info!("published {} to '{message_id}'", payload.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_reported_once_as_unsuccessful() {
        assert!(succeeded(Ok(())));
        assert!(!succeeded(Err("routing file missing".into())));
    }

    #[test]
    fn publish_reports_missing_routing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = publish(
            &Settings::default(),
            Some(dir.path().join("absent.json")),
            "m",
            "hello",
        );
        assert!(!succeeded(result));
    }
}
