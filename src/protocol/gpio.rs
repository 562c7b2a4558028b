//! GPIO transport.
//!
//! A message carries a list of rules; the rules whose name matches the
//! payload's classification (or `All`) pulse their pin concurrently, and
//! `publish` returns once every pulse has finished.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};

use futures::executor::block_on;
use futures::future::join_all;
use rppal::gpio::{Gpio, OutputPin};
use tracing::{debug, error, info};

use super::message::ALL_RULE;
use super::runtime::BackgroundRuntime;
use super::{
    Address, CompletionHandler, GpioRule, Protocol, ProtocolClient, ProtocolMessage,
    SubscriptionRegistry, wrong_message,
};
use crate::queue::JobQueue;
use crate::utils::{BrokerError, Result};

/// Drives output pins.
pub trait PinDriver: Send + Sync {
    fn write(&self, pin: u8, high: bool) -> Result<()>;
}

/// [`PinDriver`] for the Raspberry Pi GPIO peripheral.
pub struct RppalPinDriver {
    gpio: Gpio,
    pins: Mutex<HashMap<u8, OutputPin>>,
}

impl RppalPinDriver {
    pub fn open() -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| BrokerError::transport(format!("open gpio: {e}")))?;
        info!("gpio peripheral opened");
        Ok(Self {
            gpio,
            pins: Mutex::new(HashMap::new()),
        })
    }
}

impl PinDriver for RppalPinDriver {
    fn write(&self, pin: u8, high: bool) -> Result<()> {
        let mut pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        let output = match pins.entry(pin) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let mut output = self
                    .gpio
                    .get(pin)
                    .map_err(|e| BrokerError::transport(format!("gpio pin {pin}: {e}")))?
                    .into_output();
                output.set_reset_on_drop(false);
                slot.insert(output)
            }
        };
        if high {
            output.set_high();
        } else {
            output.set_low();
        }
        Ok(())
    }
}

struct Pulser {
    driver: Arc<dyn PinDriver>,
    runtime: BackgroundRuntime,
}

impl Pulser {
    fn drive(&self, message: &ProtocolMessage) -> Result<()> {
        let Address::Gpio(addr) = message.address() else {
            return Err(wrong_message(Protocol::Gpio, message));
        };
        let class = message.payload().classification();
        let rules: Vec<GpioRule> = addr
            .rules
            .iter()
            .filter(|r| r.name == ALL_RULE || r.name == class.as_str())
            .cloned()
            .collect();
        if rules.is_empty() {
            debug!("no gpio rule matches classification {class}");
            return Ok(());
        }

        let tasks: Vec<_> = rules
            .into_iter()
            .map(|rule| self.runtime.spawn(pulse(self.driver.clone(), rule)))
            .collect();
        let results = block_on(join_all(tasks));

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("pulse task failed: {e}")),
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            for f in &failures {
                error!("{f}");
            }
            Err(BrokerError::transport(failures.join("; ")))
        }
    }
}

async fn pulse(driver: Arc<dyn PinDriver>, rule: GpioRule) -> Result<()> {
    let active = rule.edge.active_high();
    debug!(
        "rule '{}': pin {} -> {} for {:?}",
        rule.name,
        rule.pin,
        if active { "high" } else { "low" },
        rule.pulse_width
    );
    driver.write(rule.pin, active)?;
    tokio::time::sleep(rule.pulse_width).await;
    driver.write(rule.pin, !active)
}

/// Pulses GPIO pins according to payload classification.
pub struct GpioClient {
    registry: SubscriptionRegistry,
    pulser: Arc<Pulser>,
    queue: JobQueue<Arc<ProtocolMessage>>,
}

impl GpioClient {
    pub fn new(driver: Arc<dyn PinDriver>) -> Result<Self> {
        let runtime = BackgroundRuntime::new("gpio", 1)?;
        let pulser = Arc::new(Pulser { driver, runtime });
        let queue = JobQueue::new("gpio");
        let worker_pulser = pulser.clone();
        queue.set_processor(move |message: &Arc<ProtocolMessage>| worker_pulser.drive(message));
        queue.start()?;
        Ok(Self {
            registry: SubscriptionRegistry::new(),
            pulser,
            queue,
        })
    }
}

impl ProtocolClient for GpioClient {
    fn protocol(&self) -> Protocol {
        Protocol::Gpio
    }

    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Blocks for the longest matching pulse width.
    fn publish(&self, message: &ProtocolMessage) -> Result<()> {
        self.pulser.drive(message)
    }

    /// Pulses run in enqueue order on a dedicated worker.
    fn publish_async(&self, message: Arc<ProtocolMessage>, handler: CompletionHandler) {
        self.queue.enqueue(
            message,
            Some(Box::new(move |message, result| {
                handler(Protocol::Gpio.as_str(), &message, result.is_ok())
            })),
        );
    }

    fn flush(&self) {
        self.queue.wait_idle();
    }
}

impl Drop for GpioClient {
    fn drop(&mut self) {
        self.queue.wait_idle();
        self.queue.stop();
    }
}
