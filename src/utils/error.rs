//! The `error` module defines the error type shared by every part of `edgebus`.
//!
//! Configuration problems, type mismatches between protocol objects and the
//! clients handling them, and transport failures are all reported through
//! [`BrokerError`]. Soft outcomes (such as unsubscribing an unknown token) are
//! not errors and are returned as status values instead.

use thiserror::Error;

/// Errors raised by the broker, its protocol clients and factories.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A required value is missing, empty, mistyped or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A named entity (target, factory) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation has no meaning for this protocol.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// A subscription or message is not the kind the client handles.
    #[error("no interface: {0}")]
    NoInterface(String),

    /// The underlying network, filesystem or hardware call failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A local subscriber's handler failed or panicked.
    #[error("handler failure: {0}")]
    Handler(String),

    /// One or more destinations of a publish failed.
    #[error("delivery failed for: {}", failed.join(", "))]
    Delivery { failed: Vec<String> },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BrokerError>;

impl BrokerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
