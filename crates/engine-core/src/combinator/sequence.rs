//! Sequence: ordered execution with configurable stop-on-success and
//! stop-on-failure. Grounded on
//! `skelet0wn/limbs/joints/sequence/node.py`.

use std::path::Path;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::metadata::{store_metadata, OutputPointer};
use crate::naming::sequence_child_name;
use crate::node::Node;
use crate::store::DocumentStore;

pub struct Sequence {
    children: Vec<Box<dyn Node>>,
    stop_on_failure: bool,
    stop_on_success: bool,
    ctx: Option<NodeContext>,
}

impl Sequence {
    pub fn new(children: Vec<Box<dyn Node>>) -> Self {
        Self {
            children,
            stop_on_failure: true,
            stop_on_success: false,
            ctx: None,
        }
    }

    pub fn stop_on_failure(mut self, value: bool) -> Self {
        self.stop_on_failure = value;
        self
    }

    pub fn stop_on_success(mut self, value: bool) -> Self {
        self.stop_on_success = value;
        self
    }
}

#[async_trait]
impl Node for Sequence {
    fn prepare_environment(&mut self, output_root: &Path, shared_dir: &Path, name: &str) {
        let ctx = NodeContext::prepare("sequence", output_root, shared_dir, name)
            .expect("failed to prepare sequence directories");
        for (index, child) in self.children.iter_mut().enumerate() {
            let child_name = sequence_child_name(&ctx.name, index);
            child.prepare_environment(output_root, shared_dir, &child_name);
        }
        self.ctx = Some(ctx);
    }

    async fn run(&mut self, db: &dyn DocumentStore, run_id: &str) -> Result<(), NodeError> {
        let ctx = self.ctx.clone().expect("prepare_environment must run first");
        let _span = ctx.span().entered();

        for (index, child) in self.children.iter_mut().enumerate() {
            match child.run(db, run_id).await {
                Ok(()) => {
                    if self.stop_on_success {
                        break;
                    }
                }
                Err(e) => {
                    if self.stop_on_failure {
                        return Err(NodeError::wrap(
                            format!("sequence child {index} ({})", child.name()),
                            e,
                        ));
                    }
                    warn!(child = child.name(), error = %e, "sequence child failed, continuing");
                }
            }
        }

        store_metadata(db, &ctx, run_id, OutputPointer::none(), None)
            .await
            .map_err(|e| {
                error!(node = %ctx.name, error = %e, "failed to store sequence metadata");
                NodeError::Store(e)
            })?;
        Ok(())
    }

    fn interrupt(&self) {
        for child in &self.children {
            child.interrupt();
        }
    }

    fn context(&self) -> &NodeContext {
        self.ctx.as_ref().expect("prepare_environment must run before context() is queried")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{stub, NullStore};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn permissive_sequence_visits_every_child() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let output_root = tempdir().unwrap();
        let shared = tempdir().unwrap();
        let mut seq = Sequence::new(vec![
            stub(true, calls.clone()),
            stub(false, calls.clone()),
            stub(true, calls.clone()),
        ])
        .stop_on_failure(false);
        seq.prepare_environment(output_root.path(), shared.path(), "n0");
        let db = NullStore;
        seq.run(&db, "run1").await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stop_on_failure_short_circuits() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let output_root = tempdir().unwrap();
        let shared = tempdir().unwrap();
        let mut seq = Sequence::new(vec![stub(true, calls.clone()), stub(false, calls.clone())]);
        seq.prepare_environment(output_root.path(), shared.path(), "n0");
        let db = NullStore;
        let err = seq.run(&db, "run1").await.unwrap_err();
        assert!(err.to_string().contains("sequence child 0"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_on_success_short_circuits() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let output_root = tempdir().unwrap();
        let shared = tempdir().unwrap();
        let mut seq = Sequence::new(vec![stub(false, calls.clone()), stub(false, calls.clone())])
            .stop_on_success(true);
        seq.prepare_environment(output_root.path(), shared.path(), "n0");
        let db = NullStore;
        seq.run(&db, "run1").await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
