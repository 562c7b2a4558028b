//! The `broker` module routes logical publishes to protocol targets.
//!
//! [`BrokerConfig`] declares named targets and the pipes mapping a
//! `message_id` to its destinations; [`MessageBroker`] owns the targets built
//! from it and the local loopback subscribers.

pub mod engine;
pub mod pipe;

pub use engine::{MessageBroker, PublishHandler};
pub use pipe::{BrokerConfig, DestinationConfig, MqttSubscriptionConfig, PipeConfig, TargetConfig};
