//! Master node plus followers sharing its lifecycle

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::channel::{KillSender, PayloadReceiver};
use crate::error::Result;
use crate::node::{Node, NodeRef};

/// Group of a master and its followers
///
/// Data calls go to the master only. Followers start after the master and
/// stop and wait before it.
pub struct GroupConnector {
    master: NodeRef,
    followers: Mutex<Vec<NodeRef>>,
}

impl GroupConnector {
    pub fn new(master: NodeRef) -> Self {
        Self {
            master,
            followers: Mutex::new(Vec::new()),
        }
    }

    pub fn join(&self, node: NodeRef) {
        self.followers.lock().push(node);
    }

    pub fn master(&self) -> &NodeRef {
        &self.master
    }

    pub fn followers(&self) -> Vec<NodeRef> {
        self.followers.lock().clone()
    }
}

#[async_trait]
impl Node for GroupConnector {
    fn start(&self, kill: KillSender) {
        self.master.start(kill.clone());
        for node in self.followers() {
            node.start(kill.clone());
        }
    }

    fn stop(&self) -> Result<()> {
        for node in self.followers() {
            node.stop()?;
        }
        self.master.stop()
    }

    async fn wait(&self) -> Result<()> {
        for node in self.followers() {
            node.wait().await?;
        }
        self.master.wait().await
    }

    fn connect_from(&self, input: PayloadReceiver) -> Result<()> {
        self.master.connect_from(input)
    }

    fn connect_to(&self, node: &NodeRef) -> Result<()> {
        self.master.connect_to(node)
    }

    fn output(&self) -> Option<PayloadReceiver> {
        self.master.output()
    }

    fn no_copy(&self) -> bool {
        self.master.no_copy()
    }

    fn is_running(&self) -> bool {
        self.master.is_running() || self.followers().iter().any(|n| n.is_running())
    }
}

impl fmt::Display for GroupConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.master, f)
    }
}
