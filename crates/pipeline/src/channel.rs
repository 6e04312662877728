//! Channels between nodes
//!
//! Payloads move over bounded crossfire MPMC channels so that several
//! workers can consume one stream (backend workers, connector
//! dispatchers). A channel closes once every sender is dropped, which is
//! how a node signals completion downstream.
//!
//! Runtime faults travel over a separate tokio mpsc kill channel shared by
//! every node of a pipeline.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use transfer_protocol::Payload;

use crate::error::PipelineError;

/// Sending half of a payload channel
pub type PayloadSender = crossfire::MAsyncTx<Payload>;

/// Receiving half of a payload channel
pub type PayloadReceiver = crossfire::MAsyncRx<Payload>;

/// Sending half of the kill channel
pub type KillSender = mpsc::Sender<PipelineError>;

/// Receiving half of the kill channel
pub type KillReceiver = mpsc::Receiver<PipelineError>;

/// Create a bounded payload channel, capacity is at least one
pub fn payload_channel(size: usize) -> (PayloadSender, PayloadReceiver) {
    crossfire::mpmc::bounded_async(size.max(1))
}

/// Create a kill channel
pub fn kill_channel(size: usize) -> (KillSender, KillReceiver) {
    mpsc::channel(size.max(1))
}

/// Send a payload unless `token` is cancelled first
///
/// Returns `false` when the payload was dropped, either because of
/// cancellation or because every receiver is gone.
pub async fn send_or_cancel(
    output: &PayloadSender,
    payload: Payload,
    token: &CancellationToken,
) -> bool {
    tokio::select! {
        result = output.send(payload) => result.is_ok(),
        _ = token.cancelled() => false,
    }
}

/// Report a fault on the kill channel unless `token` is cancelled first
pub async fn send_kill(kill: &KillSender, err: PipelineError, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        result = kill.send(err) => result.is_ok(),
        _ = token.cancelled() => false,
    }
}
