//! Public value types: task status, the MCP wire task, and execution policy.
//!
//! The durable record lives in [`domain`](crate::domain); these are the
//! types exchanged with the hosting and protocol layers.

pub mod execution;
pub mod task;

pub use execution::*;
pub use task::*;
