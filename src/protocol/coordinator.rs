use serde::Serialize;

use crate::protocol::queue::RequestQueue;
use crate::protocol::NodeId;

/// Where a coordinator tenure currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorState {
    /// Nobody holds or waits for the resource
    Idle,
    /// The queue head has been granted and has not released yet
    Granting,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorState::Idle => write!(f, "idle"),
            CoordinatorState::Granting => write!(f, "granting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The queue was empty: the requester must be granted right away.
    Grant(NodeId),
    /// The requester waits behind others at this 1-based position.
    Queued { position: usize },
    /// The requester was already queued; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Head removed, nobody else waiting.
    Idle,
    /// Head removed, the new head must be granted.
    Grant(NodeId),
    /// The releasing node is not the queue head (for example it was granted
    /// by a deposed coordinator). The queue is left untouched.
    Stale { head: Option<NodeId> },
}

/// The coordinator capability: queue discipline for one tenure.
///
/// A tenure ends when the holder is deposed; the queue goes with it and the
/// successor starts a fresh, empty role.
#[derive(Debug)]
pub struct CoordinatorRole {
    node_id: NodeId,
    queue: RequestQueue,
}

impl CoordinatorRole {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            queue: RequestQueue::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn state(&self) -> CoordinatorState {
        if self.queue.is_empty() {
            CoordinatorState::Idle
        } else {
            CoordinatorState::Granting
        }
    }

    /// Append a requester; the only waiter is granted immediately.
    pub fn on_request(&mut self, requester: NodeId) -> RequestOutcome {
        if !self.queue.push(requester) {
            return RequestOutcome::Duplicate;
        }
        match self.queue.len() {
            1 => RequestOutcome::Grant(requester),
            position => RequestOutcome::Queued { position },
        }
    }

    /// Retire the head on behalf of `releaser` and hand over to the next waiter.
    pub fn on_release(&mut self, releaser: NodeId) -> ReleaseOutcome {
        let head = self.queue.head();
        if head != Some(releaser) {
            return ReleaseOutcome::Stale { head };
        }
        self.queue.pop();
        match self.queue.head() {
            Some(next) => ReleaseOutcome::Grant(next),
            None => ReleaseOutcome::Idle,
        }
    }

    /// End the tenure. Returns the waiters whose requests are lost.
    pub fn depose(mut self) -> Vec<NodeId> {
        self.queue.drain()
    }
}
