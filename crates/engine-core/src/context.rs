//! `NodeContext`: the identity and environment every concrete Node embeds.
//! Grounded on `skelet0wn/limbs/limb.py::Limb.__init__`/`prepare_environment`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::info_span;

use crate::naming::depth;

/// Identity + filesystem environment shared by every Node, tool or
/// combinator. Set exactly once by `prepare_environment` before `run`.
///
/// Carries its own cancellation flag (`cancel`/`notify`) rather than relying
/// on callers holding a live reference to the Node while it runs: `interrupt`
/// takes `&self`, so the only way to stop a `run` already in flight is
/// interior mutability reachable without re-borrowing the Node itself. A
/// combinator that needs to cancel a child it no longer has access to (e.g.
/// Parallel, mid-join) clones the child's context up front, before `run`
/// begins, and triggers cancellation through that clone.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub name: String,
    pub depth: usize,
    pub output_dir: PathBuf,
    pub shared_dir: PathBuf,
    pub class: &'static str,
    cancel: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl NodeContext {
    /// `prepare_environment` is idempotent: identical arguments produce an
    /// identical context and never fail on directories that already exist.
    pub fn prepare(
        class: &'static str,
        output_root: &Path,
        shared_dir: &Path,
        name: &str,
    ) -> std::io::Result<Self> {
        let output_dir = output_root.join(name);
        std::fs::create_dir_all(&output_dir)?;
        std::fs::create_dir_all(shared_dir)?;
        Ok(Self {
            name: name.to_string(),
            depth: depth(name),
            output_dir,
            shared_dir: shared_dir.to_path_buf(),
            class,
            cancel: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        })
    }

    /// Derive the context of a named child, sharing the output root and
    /// shared directory. The child gets its own independent cancellation
    /// flag: interrupting a parent does not implicitly interrupt a child
    /// unless the parent's `interrupt` fans out explicitly.
    pub fn prepare_child(&self, class: &'static str, child_name: &str) -> std::io::Result<Self> {
        let output_root = self
            .output_dir
            .parent()
            .expect("output_dir always has a parent (the output root)");
        Self::prepare(class, output_root, &self.shared_dir, child_name)
    }

    /// A `tracing` span carrying this node's hierarchical name and depth, for
    /// the depth-padded indentation nested node logs should have.
    pub fn span(&self) -> tracing::Span {
        info_span!("node", name = %self.name, class = %self.class, depth_pad = self.depth)
    }

    /// Best-effort stop signal: flips the cooperative flag and wakes anyone
    /// awaiting `cancelled()`. Never blocks, never fails.
    pub fn interrupt(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Resolves once `interrupt` has been called. A `run` loop awaits this
    /// concurrently with its blocking work (e.g. `tokio::select!` against the
    /// container wait) to react to cancellation promptly.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}
