//! Shared test doubles for combinator unit tests: a no-op `DocumentStore`
//! and a stub `Node` with configurable success/failure, used the way the
//! teacher's own block tests stub out collaborators.
#![cfg(test)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::context::NodeContext;
use crate::error::{NodeError, StoreError};
use crate::node::Node;
use crate::store::DocumentStore;

pub struct StubNode {
    ctx: Option<NodeContext>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for StubNode {
    fn prepare_environment(&mut self, output_root: &Path, shared_dir: &Path, name: &str) {
        self.ctx = Some(
            NodeContext::prepare("stub", output_root, shared_dir, name)
                .expect("failed to prepare stub node directories"),
        );
    }

    async fn run(&mut self, _db: &dyn DocumentStore, _run_id: &str) -> Result<(), NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(NodeError::Other("stub failure".into()))
        } else {
            Ok(())
        }
    }

    fn interrupt(&self) {
        if let Some(ctx) = &self.ctx {
            ctx.interrupt();
        }
    }

    fn context(&self) -> &NodeContext {
        self.ctx.as_ref().expect("prepare_environment must run before context() is queried")
    }
}

pub fn stub(fail: bool, calls: Arc<AtomicUsize>) -> Box<dyn Node> {
    Box::new(StubNode { ctx: None, fail, calls })
}

/// A node that blocks on its own context's cancellation before returning,
/// used to exercise Parallel's interrupt-then-join path.
pub struct BlockUntilCancelledNode {
    ctx: Option<NodeContext>,
    started: Arc<tokio::sync::Notify>,
}

impl BlockUntilCancelledNode {
    pub fn new(started: Arc<tokio::sync::Notify>) -> Box<dyn Node> {
        Box::new(Self { ctx: None, started })
    }
}

#[async_trait]
impl Node for BlockUntilCancelledNode {
    fn prepare_environment(&mut self, output_root: &Path, shared_dir: &Path, name: &str) {
        self.ctx = Some(
            NodeContext::prepare("stub", output_root, shared_dir, name)
                .expect("failed to prepare stub node directories"),
        );
    }

    async fn run(&mut self, _db: &dyn DocumentStore, _run_id: &str) -> Result<(), NodeError> {
        self.started.notify_one();
        self.context().cancelled().await;
        Ok(())
    }

    fn interrupt(&self) {
        if let Some(ctx) = &self.ctx {
            ctx.interrupt();
        }
    }

    fn context(&self) -> &NodeContext {
        self.ctx.as_ref().expect("prepare_environment must run before context() is queried")
    }
}

pub struct NullStore;

#[async_trait]
impl DocumentStore for NullStore {
    async fn find_one(
        &self,
        _collection: &str,
        _filter: Document,
        _projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError> {
        Ok(None)
    }

    async fn find(
        &self,
        _collection: &str,
        _filter: Document,
        _projection: Option<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(vec![])
    }

    async fn insert_one(&self, _collection: &str, _doc: Document) -> Result<Bson, StoreError> {
        Ok(Bson::Null)
    }

    async fn upsert_one(
        &self,
        _collection: &str,
        _filter: Document,
        _update: Document,
    ) -> Result<Bson, StoreError> {
        Ok(Bson::Null)
    }
}
