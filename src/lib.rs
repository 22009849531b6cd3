pub mod clock;
pub mod cluster;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod node;
pub mod protocol;
pub mod shutdown;
