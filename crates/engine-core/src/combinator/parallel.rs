//! Parallel: a foreground/background pair; when foreground finishes,
//! background is interrupted. Grounded on
//! `skelet0wn/limbs/joints/parallel/node.py`, generalized from Python
//! `threading.Thread` to a single cooperatively-polled background future —
//! see `NodeContext::cancelled` for why a spawned `tokio::task` isn't used
//! here (it would require `db`/`back` to be `'static`).

use std::path::Path;

use async_trait::async_trait;
use tracing::warn;

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::metadata::{store_metadata, OutputPointer};
use crate::naming::{parallel_child_name, ParallelSlot};
use crate::node::Node;
use crate::store::DocumentStore;

pub struct Parallel {
    front: Box<dyn Node>,
    back: Box<dyn Node>,
    ctx: Option<NodeContext>,
}

impl Parallel {
    pub fn new(front: Box<dyn Node>, back: Box<dyn Node>) -> Self {
        Self { front, back, ctx: None }
    }
}

#[async_trait]
impl Node for Parallel {
    fn prepare_environment(&mut self, output_root: &Path, shared_dir: &Path, name: &str) {
        let ctx = NodeContext::prepare("parallel", output_root, shared_dir, name)
            .expect("failed to prepare parallel directories");
        self.front
            .prepare_environment(output_root, shared_dir, &parallel_child_name(&ctx.name, ParallelSlot::Front));
        self.back
            .prepare_environment(output_root, shared_dir, &parallel_child_name(&ctx.name, ParallelSlot::Back));
        self.ctx = Some(ctx);
    }

    async fn run(&mut self, db: &dyn DocumentStore, run_id: &str) -> Result<(), NodeError> {
        let ctx = self.ctx.clone().expect("prepare_environment must run first");
        let _span = ctx.span().entered();

        // Cloned before `back` is mutably borrowed for its run future, so it
        // can still be told to stop after `front` completes, even though by
        // then we no longer have exclusive access to `self.back` itself.
        let back_ctx = self.back.context().clone();
        let front_name = self.front.name().to_string();

        let back_future = self.back.run(db, run_id);
        let front_future = self.front.run(db, run_id);
        tokio::pin!(back_future);
        tokio::pin!(front_future);

        // `back` is polled on every wakeup of this combined future, ensuring
        // it begins progressing before `front`'s first poll, while `front`
        // drives completion.
        let front_result = std::future::poll_fn(|cx| {
            let _ = back_future.as_mut().poll(cx);
            front_future.as_mut().poll(cx)
        })
        .await;

        back_ctx.interrupt();
        if let Err(e) = back_future.await {
            warn!(child = %back_ctx.name, error = %e, "parallel background child failed, absorbing");
        }

        store_metadata(db, &ctx, run_id, OutputPointer::none(), None)
            .await
            .map_err(NodeError::Store)?;

        front_result.map_err(|e| NodeError::wrap(format!("parallel front ({front_name})"), e))
    }

    fn interrupt(&self) {
        self.front.interrupt();
        self.back.interrupt();
    }

    fn context(&self) -> &NodeContext {
        self.ctx.as_ref().expect("prepare_environment must run before context() is queried")
    }
}
