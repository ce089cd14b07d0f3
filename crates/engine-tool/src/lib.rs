//! Tool Node: interface/mapping descriptor loading, command templating, and
//! the container-driven state machine that runs a single tool invocation.

pub mod command;
pub mod loader;
pub mod state;
pub mod tool_node;
pub mod wrappers;

pub use state::ToolState;
pub use tool_node::{ToolNode, ToolResultParser};
