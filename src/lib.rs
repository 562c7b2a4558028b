//! # edgebus
//!
//! `edgebus` is a protocol-routing message broker for edge devices. A publish
//! names a `message_id` and carries a [`Payload`](payload::Payload); the broker
//! fans it out, according to a JSON routing configuration, to MQTT, S3, the
//! local filesystem, GPIO pins and in-process subscribers.
//!
//! ## Core Modules
//!
//! - `broker`: the [`MessageBroker`](broker::MessageBroker), its targets and pipes.
//! - `config`: process settings for the `edgebus` binary.
//! - `expansion`: substitution of `${id}`, `${c_id}`, `${timestamp}` and `${count}` in templates.
//! - `factory`: builds protocol clients, messages and subscriptions from JSON options.
//! - `payload`: the unit of data moved through the system.
//! - `protocol`: the protocol client abstraction and one client per transport.
//! - `queue`: single- and multi-worker job queues behind asynchronous publishing.
//! - `utils`: the shared error type and logging setup.

pub mod broker;
pub mod config;
pub mod expansion;
pub mod factory;
pub mod payload;
pub mod protocol;
pub mod queue;
pub mod utils;
