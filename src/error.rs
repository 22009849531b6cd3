use thiserror::Error;

use crate::protocol::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutexError {
    #[error("No coordinator available")]
    NoCoordinator,

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node {0} does not hold the coordinator role")]
    NotCoordinator(NodeId),

    #[error("No free node identity left in 1..={0}")]
    IdentityExhausted(u64),

    #[error("Cluster is shutting down")]
    ShuttingDown,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MutexError>;
