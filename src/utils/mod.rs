//! The `utils` module holds definitions shared across `edgebus`: the crate
//! error type and logging setup.

pub mod error;
pub mod logging;

pub use error::{BrokerError, Result};

#[cfg(test)]
mod tests;
