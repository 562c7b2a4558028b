//! The `payload` module defines [`Payload`], the immutable unit of data that
//! flows from publishers through the broker to every protocol client.

pub mod payload;

pub use payload::{Classification, Content, Payload};

#[cfg(test)]
mod tests;
