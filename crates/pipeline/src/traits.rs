//! Component contracts
//!
//! Frontends, backends and processors are external collaborators of the
//! runtime. Nodes wrap them and own their lifecycle; the components only
//! move payloads.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use transfer_config::RecordFields;
use transfer_protocol::Payload;

use crate::channel::{KillSender, PayloadSender};
use crate::error::Result;

/// Data source
#[async_trait]
pub trait Frontend: Send + Sync + fmt::Display {
    /// Emit payloads until the source is exhausted
    ///
    /// The runtime drops this future when the node is stopped, so a pull
    /// that never ends on its own is fine.
    async fn pull(&self, output: &PayloadSender, kill: &KillSender);

    async fn close(&self) -> Result<()>;

    /// Acknowledge everything pulled so far
    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    /// Rewind to the last commit
    async fn reset(&self) -> Result<()> {
        Ok(())
    }
}

/// Data sink
///
/// `push` is called concurrently by up to `multi_num` workers.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Display {
    async fn push(&self, payload: Payload, kill: &KillSender);

    async fn close(&self) -> Result<()>;

    /// Restrict the fields written by this backend
    fn set_record_fields(&self, _fields: RecordFields) {}
}

/// Transform stage
#[async_trait]
pub trait DataProcessor: Send + Sync + fmt::Display {
    /// Handle one payload, or a poll tick when `payload` is `None`
    async fn process(&self, payload: Option<Payload>, output: &PayloadSender, kill: &KillSender);

    /// Called once after the input is exhausted or the node is stopped
    async fn finish(&self, _output: &PayloadSender, _kill: &KillSender) {}

    /// Poll period, zero disables polling
    fn poll(&self) -> Duration {
        Duration::ZERO
    }

    /// Lane index of this instance
    fn set_index(&mut self, _index: usize) {}
}
