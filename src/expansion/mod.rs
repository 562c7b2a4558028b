//! The `expansion` module materializes dynamic strings (file names, S3 keys,
//! MQTT topics, GPIO rule strings) from payload metadata.
//!
//! Recognized tokens are `${id}`, `${c_id}`, `${timestamp}` and `${count}`.
//! `${count}` is backed by a counter per distinct template string, held by a
//! [`MacroExpander`] instance rather than process-global state.

pub mod engine;

pub use engine::{COUNT, CORRELATION_ID, ID, MacroExpander, TIMESTAMP, validate_template};

#[cfg(test)]
mod tests;
