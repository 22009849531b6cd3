use std::collections::VecDeque;

use crate::protocol::NodeId;

/// Pending requesters in arrival order.
///
/// The head is the node currently authorized to hold the resource (or about
/// to be). An identity appears at most once.
#[derive(Debug, Default, Clone)]
pub struct RequestQueue {
    waiting: VecDeque<NodeId>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a requester. Returns false if it is already queued.
    pub fn push(&mut self, node_id: NodeId) -> bool {
        if self.contains(node_id) {
            return false;
        }
        self.waiting.push_back(node_id);
        true
    }

    /// Remove and return the head
    pub fn pop(&mut self) -> Option<NodeId> {
        self.waiting.pop_front()
    }

    pub fn head(&self) -> Option<NodeId> {
        self.waiting.front().copied()
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.waiting.contains(&node_id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Queued identities, head first
    pub fn to_vec(&self) -> Vec<NodeId> {
        self.waiting.iter().copied().collect()
    }

    /// Drop every waiter, returning them head first.
    pub fn drain(&mut self) -> Vec<NodeId> {
        self.waiting.drain(..).collect()
    }
}
