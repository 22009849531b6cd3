use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::protocol::NodeId;

/// The single exclusive resource shared by every node.
///
/// Besides the lock itself it keeps counters that make mutual exclusion
/// observable: how many nodes hold it right now, the highest number ever
/// seen at once, and how many critical sections have completed.
#[derive(Debug, Default)]
pub struct SharedResource {
    lock: Mutex<()>,
    holders: AtomicUsize,
    max_holders: AtomicUsize,
    holder: AtomicU64,
    completed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceStats {
    pub holder: Option<NodeId>,
    pub max_concurrent_holders: usize,
    pub completed_sections: u64,
}

impl SharedResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access. The returned guard releases on drop.
    pub async fn acquire(&self, node_id: NodeId) -> ResourceGuard<'_> {
        let lock = self.lock.lock().await;
        let holders = self.holders.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_holders.fetch_max(holders, Ordering::SeqCst);
        self.holder.store(node_id, Ordering::SeqCst);
        ResourceGuard {
            _lock: lock,
            resource: self,
        }
    }

    pub fn stats(&self) -> ResourceStats {
        let holder = self.holder.load(Ordering::SeqCst);
        ResourceStats {
            holder: (holder != 0).then_some(holder),
            max_concurrent_holders: self.max_holders.load(Ordering::SeqCst),
            completed_sections: self.completed.load(Ordering::SeqCst),
        }
    }
}

pub struct ResourceGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    resource: &'a SharedResource,
}

impl Drop for ResourceGuard<'_> {
    fn drop(&mut self) {
        // counters first: the lock field drops after this body
        self.resource.holder.store(0, Ordering::SeqCst);
        self.resource.holders.fetch_sub(1, Ordering::SeqCst);
        self.resource.completed.fetch_add(1, Ordering::SeqCst);
    }
}
