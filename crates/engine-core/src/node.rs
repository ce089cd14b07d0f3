//! The `Node` trait: the uniform lifecycle every workflow element implements,
//! from a bare tool invocation up to a tree of combinators. Three phases:
//! prepare the node's working directories, run it to completion, or
//! interrupt it early.

use async_trait::async_trait;
use std::path::Path;

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::store::DocumentStore;

/// A single element of the workflow tree: a tool wrapper or a combinator.
///
/// Lifecycle: construct -> [`Node::prepare_environment`] -> [`Node::run`] ->
/// optionally [`Node::interrupt`]. Each instance runs at most once per
/// `run_id`; re-entrancy is not required.
#[async_trait]
pub trait Node: Send + Sync {
    /// Assign this node's identity and ensure its directories exist.
    /// Recursively invoked by combinators on their children with derived
    /// names. Idempotent: repeated calls with identical arguments must not
    /// fail and must leave `name`/`output_dir` unchanged.
    fn prepare_environment(&mut self, output_root: &Path, shared_dir: &Path, name: &str);

    /// Execute this node's action. Must call `store_metadata` exactly once
    /// on success, and attempt it on failure paths where partial work is
    /// recoverable.
    async fn run(&mut self, db: &dyn DocumentStore, run_id: &str) -> Result<(), NodeError>;

    /// Best-effort stop signal. Never raises; safe to call on a node that
    /// is not running.
    fn interrupt(&self);

    /// This node's identity and environment, set by `prepare_environment`.
    /// Combinators that need to cancel a child without re-borrowing it
    /// (Parallel, mid-join) clone this up front and call `interrupt()` on
    /// the clone instead of on the child.
    fn context(&self) -> &NodeContext;

    /// This node's hierarchical name, once `prepare_environment` has run.
    fn name(&self) -> &str {
        &self.context().name
    }
}
