use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::error::{MutexError, Result};
use crate::protocol::NodeId;

/// Source of fresh node identities.
pub trait IdGenerator: Send + Sync {
    /// Returns an identity not contained in `existing`.
    fn next_id(&self, existing: &HashSet<NodeId>) -> Result<NodeId>;
}

/// Uniformly random identities in `1..=max_id`; collisions are redrawn.
#[derive(Debug, Clone)]
pub struct RandomIdGenerator {
    max_id: u64,
}

impl RandomIdGenerator {
    pub fn new(max_id: u64) -> Self {
        Self { max_id }
    }
}

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self, existing: &HashSet<NodeId>) -> Result<NodeId> {
        if existing.len() as u64 >= self.max_id {
            return Err(MutexError::IdentityExhausted(self.max_id));
        }
        let mut rng = rand::thread_rng();
        loop {
            let id = rng.gen_range(1..=self.max_id);
            if !existing.contains(&id) {
                return Ok(id);
            }
            tracing::trace!(id, "Identity collision, retrying");
        }
    }
}

/// Hands out 1, 2, 3, ... skipping live identities. Deterministic, which
/// makes scenario tests readable.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self, existing: &HashSet<NodeId>) -> Result<NodeId> {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                return Err(MutexError::IdentityExhausted(u64::MAX));
            }
            if !existing.contains(&id) {
                return Ok(id);
            }
        }
    }
}
