//! Payload - the envelope flowing between pipeline nodes
//!
//! A `Payload` carries one serialized record (JSON) together with the
//! metadata gathered at ingest: a flag set and the arrival time. Bodies are
//! `bytes::Bytes`, so cloning a payload for broadcast is O(1).

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::flag::PayloadFlag;
use crate::{PayloadError, Result};

/// Process-wide payload sequence
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_sn() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1
}

/// In-flight data envelope
///
/// # Lifecycle
///
/// Created by a frontend on ingest, replaced (never mutated in place) by
/// processors through [`Payload::derive`], consumed by a backend.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Serialized body
    body: Bytes,

    /// Flags set at ingest
    flag: PayloadFlag,

    /// Arrival time
    time: DateTime<Utc>,

    /// Sequence number for diagnostics
    sn: u64,
}

impl Payload {
    /// Create an empty payload stamped with the current time
    pub fn new(flag: PayloadFlag) -> Self {
        Self {
            body: Bytes::new(),
            flag,
            time: Utc::now(),
            sn: next_sn(),
        }
    }

    /// Create a payload from raw bytes
    pub fn from_bytes(data: impl Into<Bytes>, flag: PayloadFlag) -> Self {
        let mut payload = Self::new(flag);
        payload.body = data.into();
        payload
    }

    /// Create a payload by encoding `value`
    pub fn from_value<T: Serialize + ?Sized>(value: &T, flag: PayloadFlag) -> Result<Self> {
        let body = serde_json::to_vec(value).map_err(PayloadError::Encode)?;
        Ok(Self::from_bytes(body, flag))
    }

    /// Override the arrival time
    #[must_use]
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Replace the body with raw bytes
    pub fn set_body(&mut self, data: impl Into<Bytes>) {
        self.body = data.into();
    }

    /// Decode the body into `T`
    pub fn to<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(PayloadError::Empty);
        }
        serde_json::from_slice(&self.body).map_err(PayloadError::Decode)
    }

    /// Build a new payload with `body`, keeping flags and arrival time
    pub fn derive<T: Serialize + ?Sized>(&self, body: &T) -> Result<Payload> {
        let data = serde_json::to_vec(body).map_err(PayloadError::Encode)?;
        Ok(Self {
            body: Bytes::from(data),
            flag: self.flag,
            time: self.time,
            sn: next_sn(),
        })
    }

    #[inline]
    pub fn flag(&self) -> PayloadFlag {
        self.flag
    }

    #[inline]
    pub fn set_flag(&mut self, flag: PayloadFlag) {
        self.flag = flag;
    }

    /// Arrival time
    #[inline]
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    #[inline]
    pub fn sn(&self) -> u64 {
        self.sn
    }

    /// Raw body
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Derive a payload from `base` carrying `body`
///
/// Free-function form of [`Payload::derive`].
pub fn derive_payload<T: Serialize + ?Sized>(base: &Payload, body: &T) -> Result<Payload> {
    base.derive(body)
}
