//! Transfer Protocol - Core data types for transfer pipelines
//!
//! This crate provides the types that flow between pipeline nodes:
//! - `Payload` - Envelope around a serialized record plus flags and arrival time
//! - `PayloadFlag` - Bit set of payload properties
//! - `EtlRecord` - Typed record with dimensions and metrics
//!
//! # Design Principles
//!
//! - **Cheap clones**: Payload bodies use `bytes::Bytes`, so fan-out to
//!   several branches shares the same buffer
//! - **Replace, never mutate**: a payload that needs a new body is derived
//!   from the original, keeping flags and timestamp intact

mod error;
mod flag;
mod payload;
mod record;

pub use error::PayloadError;
pub use flag::PayloadFlag;
pub use payload::{Payload, derive_payload};
pub use record::{EtlRecord, METRIC_KEY_FIELD, METRIC_VALUE_FIELD};

pub use bytes::Bytes;

/// Result type for payload operations
pub type Result<T> = std::result::Result<T, PayloadError>;

#[cfg(test)]
mod record_test;
