//! `store_metadata`: appends one step-metadata record to `steps`. A free
//! function rather than a trait default method, so a Tool
//! Node's state machine can call it from several failure paths without
//! fighting the borrow checker over `&mut self` — a deliberate
//! generalization of `Limb.store_metadata`.

use bson::{doc, Bson, Document};
use chrono::Utc;
use tracing::{trace, warn};

use crate::context::NodeContext;
use crate::error::StoreError;
use crate::store::{collections, DocumentStore};

/// Optional pointer to a Node's principal output record.
#[derive(Debug, Clone, Default)]
pub struct OutputPointer {
    pub collection: Option<String>,
    pub id: Option<Bson>,
}

impl OutputPointer {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(collection: impl Into<String>, id: Bson) -> Self {
        Self {
            collection: Some(collection.into()),
            id: Some(id),
        }
    }
}

/// Append one `steps` document for this Node's execution. Never mutates or
/// deletes prior step records; history is append-only.
pub async fn store_metadata(
    db: &dyn DocumentStore,
    ctx: &NodeContext,
    run_id: &str,
    output: OutputPointer,
    extra: Option<Document>,
) -> Result<Bson, StoreError> {
    let mut record = doc! {
        "name": &ctx.name,
        "class": ctx.class,
        "run_id": run_id,
        "time": Bson::DateTime(bson::DateTime::from_chrono(Utc::now())),
        "outputCollection": output.collection.clone().map(Bson::String).unwrap_or(Bson::Null),
        "outputID": output.id.clone().unwrap_or(Bson::Null),
    };
    if let Some(extra) = extra {
        for (k, v) in extra {
            record.insert(k, v);
        }
    }
    trace!(node = %ctx.name, "storing step metadata");
    let id = db.insert_one(collections::STEPS, record).await?;
    Ok(id)
}

/// Best-effort metadata write on a failure path: logs but swallows store
/// errors, since a failed engine write must never mask the original error
/// that triggered it.
pub async fn store_metadata_best_effort(
    db: &dyn DocumentStore,
    ctx: &NodeContext,
    run_id: &str,
    output: OutputPointer,
    extra: Option<Document>,
) {
    if let Err(e) = store_metadata(db, ctx, run_id, output, extra).await {
        warn!(node = %ctx.name, error = %e, "failed to store best-effort step metadata");
    }
}
