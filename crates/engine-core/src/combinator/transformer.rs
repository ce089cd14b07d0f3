//! Transformer: runs a database query and stores a derived value for
//! downstream consumption. Grounded on
//! `skelet0wn/limbs/joints/transformer/node.py`.

use std::path::Path;

use async_trait::async_trait;
use bson::{doc, Bson, Document};

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::metadata::{store_metadata, OutputPointer};
use crate::node::Node;
use crate::store::{collections, DocumentStore};

/// A pure function from the query's matched documents to an arbitrary
/// result value, stored verbatim under `{result: ...}` in `temp`.
pub type Transformation = Box<dyn Fn(&[Document]) -> Bson + Send + Sync>;

pub struct Transformer {
    collection: String,
    filter: Document,
    projection: Option<Document>,
    transformation: Transformation,
    ctx: Option<NodeContext>,
}

impl Transformer {
    pub fn new(
        collection: impl Into<String>,
        filter: Document,
        projection: Option<Document>,
        transformation: Transformation,
    ) -> Self {
        Self {
            collection: collection.into(),
            filter,
            projection,
            transformation,
            ctx: None,
        }
    }
}

/// `join_with_space`: a common transformation joining a projected scalar
/// field across every matched document with a single space, e.g. turning a
/// set of host documents into a space-separated target list for the next
/// tool in the chain.
pub fn join_with_space(field: &'static str) -> Transformation {
    Box::new(move |docs: &[Document]| {
        let parts: Vec<String> = docs
            .iter()
            .filter_map(|d| crate::store::project_path(d, field))
            .filter_map(|b| b.as_str().map(str::to_string))
            .collect();
        Bson::String(parts.join(" "))
    })
}

#[async_trait]
impl Node for Transformer {
    fn prepare_environment(&mut self, output_root: &Path, shared_dir: &Path, name: &str) {
        self.ctx = Some(
            NodeContext::prepare("transformer", output_root, shared_dir, name)
                .expect("failed to prepare transformer directories"),
        );
    }

    async fn run(&mut self, db: &dyn DocumentStore, run_id: &str) -> Result<(), NodeError> {
        let ctx = self.ctx.clone().expect("prepare_environment must run first");
        let _span = ctx.span().entered();

        let matched = db
            .find(&self.collection, self.filter.clone(), self.projection.clone())
            .await
            .map_err(NodeError::Store)?;

        let result = (self.transformation)(&matched);
        let inserted_id = db
            .insert_one(collections::TEMP, doc! { "result": result })
            .await
            .map_err(NodeError::Store)?;

        store_metadata(
            db,
            &ctx,
            run_id,
            OutputPointer::new(collections::TEMP, inserted_id),
            None,
        )
        .await
        .map_err(NodeError::Store)?;
        Ok(())
    }

    fn interrupt(&self) {}

    fn context(&self) -> &NodeContext {
        self.ctx.as_ref().expect("prepare_environment must run before context() is queried")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct RecordingStore {
        inserted: Mutex<Vec<(String, Document)>>,
        docs: Vec<Document>,
    }

    #[async_trait]
    impl DocumentStore for RecordingStore {
        async fn find_one(
            &self,
            _c: &str,
            _f: Document,
            _p: Option<Document>,
        ) -> Result<Option<Document>, crate::error::StoreError> {
            Ok(None)
        }

        async fn find(
            &self,
            _collection: &str,
            _filter: Document,
            _projection: Option<Document>,
        ) -> Result<Vec<Document>, crate::error::StoreError> {
            Ok(self.docs.clone())
        }

        async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson, crate::error::StoreError> {
            self.inserted.lock().unwrap().push((collection.to_string(), doc));
            Ok(Bson::String("temp-id-1".into()))
        }

        async fn upsert_one(
            &self,
            _c: &str,
            _f: Document,
            _u: Document,
        ) -> Result<Bson, crate::error::StoreError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn join_with_space_concatenates_projected_field() {
        let output_root = tempdir().unwrap();
        let shared = tempdir().unwrap();
        let docs = vec![
            doc! { "IP": { "ipv4": "10.0.0.1" } },
            doc! { "IP": { "ipv4": "10.0.0.2" } },
        ];
        let db = RecordingStore { inserted: Mutex::new(vec![]), docs };
        let mut t = Transformer::new(
            "machines",
            doc! { "ports.445.status": "open" },
            Some(doc! { "IP.ipv4": 1, "_id": 0 }),
            join_with_space("IP.ipv4"),
        );
        t.prepare_environment(output_root.path(), shared.path(), "n0.1");
        t.run(&db, "run1").await.unwrap();

        let inserted = db.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].0, collections::TEMP);
        assert_eq!(inserted[0].1.get_str("result").unwrap(), "10.0.0.1 10.0.0.2");
    }
}
