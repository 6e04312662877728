//! Two-tier concurrency limits
//!
//! Every bulk adapter owns a local semaphore and shares one process-wide
//! semaphore per kind (push, flush) with every other adapter. A permit
//! holds one slot of each.

use std::sync::{Arc, OnceLock};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

static GLOBAL_PUSH: OnceLock<Arc<Semaphore>> = OnceLock::new();
static GLOBAL_FLUSH: OnceLock<Arc<Semaphore>> = OnceLock::new();

/// Process-wide push semaphore, sized by the first caller
pub fn global_push_semaphore(max_concurrency: usize) -> Arc<Semaphore> {
    Arc::clone(GLOBAL_PUSH.get_or_init(|| Arc::new(Semaphore::new(max_concurrency.max(1)))))
}

/// Process-wide flush semaphore, sized by the first caller
pub fn global_flush_semaphore(max_concurrency: usize) -> Arc<Semaphore> {
    Arc::clone(GLOBAL_FLUSH.get_or_init(|| Arc::new(Semaphore::new(max_concurrency.max(1)))))
}

/// Local semaphore chained with a shared one
#[derive(Debug, Clone)]
pub struct ChainingSemaphore {
    local: Arc<Semaphore>,
    global: Arc<Semaphore>,
}

/// Slot in both tiers, released on drop
#[derive(Debug)]
pub struct ChainedPermit {
    _local: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

impl ChainingSemaphore {
    pub fn new(local: usize, global: Arc<Semaphore>) -> Self {
        Self {
            local: Arc::new(Semaphore::new(local.max(1))),
            global,
        }
    }

    /// Acquire the local slot, then the global one
    ///
    /// Waiting on the local tier first keeps a saturated adapter from
    /// holding global slots it cannot use. `None` once a tier is closed.
    pub async fn acquire(&self) -> Option<ChainedPermit> {
        let local = Arc::clone(&self.local).acquire_owned().await.ok()?;
        let global = Arc::clone(&self.global).acquire_owned().await.ok()?;
        Some(ChainedPermit {
            _local: local,
            _global: global,
        })
    }

    /// Free local slots
    pub fn available(&self) -> usize {
        self.local.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_local_limit() {
        let sem = ChainingSemaphore::new(1, Arc::new(Semaphore::new(10)));
        let permit = sem.acquire().await.unwrap();
        assert_eq!(sem.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(20), sem.acquire()).await;
        assert!(blocked.is_err());

        drop(permit);
        assert!(sem.acquire().await.is_some());
    }

    #[tokio::test]
    async fn test_global_limit_shared() {
        let global = Arc::new(Semaphore::new(1));
        let a = ChainingSemaphore::new(5, Arc::clone(&global));
        let b = ChainingSemaphore::new(5, Arc::clone(&global));

        let held = a.acquire().await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(20), b.acquire()).await;
        assert!(blocked.is_err());
        // the timed out acquire gave its local slot back
        assert_eq!(b.available(), 5);

        drop(held);
        assert!(b.acquire().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_tier() {
        let global = Arc::new(Semaphore::new(1));
        let sem = ChainingSemaphore::new(1, Arc::clone(&global));
        global.close();
        assert!(sem.acquire().await.is_none());
    }
}
