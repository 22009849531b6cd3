use crate::protocol::{MessageKind, NodeId};

/// Observable protocol and membership events.
///
/// Published on a broadcast channel; sending never blocks and is skipped
/// silently when nobody listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    NodeCreated {
        node_id: NodeId,
    },
    CoordinatorAssigned {
        node_id: NodeId,
    },
    CoordinatorDeposed {
        node_id: NodeId,
        successor: Option<NodeId>,
        discarded: Vec<NodeId>,
    },
    Requested {
        node_id: NodeId,
        coordinator: NodeId,
    },
    RequestEnqueued {
        coordinator: NodeId,
        node_id: NodeId,
        position: usize,
    },
    Granted {
        coordinator: NodeId,
        node_id: NodeId,
    },
    Entered {
        node_id: NodeId,
    },
    Exited {
        node_id: NodeId,
    },
    Released {
        node_id: NodeId,
        coordinator: NodeId,
    },
    ReleaseIgnored {
        coordinator: NodeId,
        node_id: NodeId,
    },
    RoutingFailed {
        from: NodeId,
        to: NodeId,
        kind: MessageKind,
    },
    ClockAdjusted {
        node_id: NodeId,
        delta_ms: i64,
    },
}
