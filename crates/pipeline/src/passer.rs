//! Passer - builtin processor forwarding payloads unchanged
//!
//! Heads every lane of a multi-lane branch so the round-robin connector
//! has a dedicated upstream to split.

use std::fmt;

use async_trait::async_trait;
use transfer_protocol::Payload;

use crate::channel::{KillSender, PayloadSender};
use crate::traits::DataProcessor;

#[derive(Debug, Default)]
pub struct Passer {
    index: usize,
}

impl Passer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataProcessor for Passer {
    async fn process(&self, payload: Option<Payload>, output: &PayloadSender, _kill: &KillSender) {
        let Some(payload) = payload else {
            return;
        };
        let sn = payload.sn();
        if output.send(payload).await.is_err() {
            tracing::debug!(index = self.index, sn, "passer output closed, payload dropped");
        }
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

impl fmt::Display for Passer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("passer")
    }
}
