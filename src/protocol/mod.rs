//! Message-level pieces of the centralized mutual-exclusion protocol.
//!
//! - [`Message`]: the immutable `REQUEST` / `GRANT` / `RELEASE` envelope
//! - [`RequestQueue`]: FIFO of pending requesters, duplicate-free
//! - [`CoordinatorRole`]: the queue discipline run by whichever node
//!   currently coordinates
//! - [`timer`]: randomized intervals for request timers and hold durations

pub mod coordinator;
pub mod message;
pub mod queue;
pub mod timer;

/// Identity of a node, unique among live cluster members. Always positive.
pub type NodeId = u64;

pub use coordinator::{CoordinatorRole, CoordinatorState, ReleaseOutcome, RequestOutcome};
pub use message::{Message, MessageKind};
pub use queue::RequestQueue;
