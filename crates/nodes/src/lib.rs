//! `nodes` crate: the `ExecutableNode` trait and built-in node implementations.
//!
//! Every node must implement [`ExecutableNode`]. The engine's invoker
//! dispatches execution through this trait object, looked up by the
//! `node_type` string carried in a workflow definition.

pub mod builtin;
pub mod error;
pub mod mock;
pub mod traits;

pub use builtin::builtin_nodes;
pub use error::NodeError;
pub use traits::{ExecutableNode, ExecutionContext};
