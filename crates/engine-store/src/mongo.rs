//! `MongoStore`: the production `DocumentStore`, backed by the official
//! `mongodb` async driver.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::{Client, Database};
use tracing::trace;

use engine_core::error::StoreError;
use engine_core::store::DocumentStore;

#[derive(Clone)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Connect to `uri` and select `database_name`. The connection string
    /// and database name are ambient configuration (`EngineConfig`), not
    /// part of the engine's own contract.
    pub async fn connect(uri: &str, database_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| StoreError(format!("connecting to {uri}: {e}")))?;
        Ok(Self { database: client.database(database_name) })
    }

    pub fn from_database(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError> {
        trace!(collection, "find_one");
        let mut query = self.database.collection::<Document>(collection).find_one(filter);
        if let Some(p) = projection {
            query = query.projection(p);
        }
        query
            .await
            .map_err(|e| StoreError(format!("find_one on {collection}: {e}")))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        trace!(collection, "find");
        let mut query = self.database.collection::<Document>(collection).find(filter);
        if let Some(p) = projection {
            query = query.projection(p);
        }
        let cursor = query
            .await
            .map_err(|e| StoreError(format!("find on {collection}: {e}")))?;

        use futures_util::TryStreamExt;
        cursor
            .try_collect()
            .await
            .map_err(|e| StoreError(format!("draining cursor on {collection}: {e}")))
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson, StoreError> {
        trace!(collection, "insert_one");
        let result = self
            .database
            .collection::<Document>(collection)
            .insert_one(doc)
            .await
            .map_err(|e| StoreError(format!("insert_one on {collection}: {e}")))?;
        Ok(result.inserted_id)
    }

    async fn upsert_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<Bson, StoreError> {
        trace!(collection, "upsert_one");
        let coll = self.database.collection::<Document>(collection);
        let update_doc = doc! { "$set": update };
        let result = coll
            .update_one(filter.clone(), update_doc)
            .upsert(true)
            .await
            .map_err(|e| StoreError(format!("upsert_one on {collection}: {e}")))?;

        if let Some(id) = result.upserted_id {
            return Ok(id);
        }
        let existing = coll
            .find_one(filter)
            .await
            .map_err(|e| StoreError(format!("re-reading upserted document on {collection}: {e}")))?;
        Ok(existing.and_then(|d| d.get("_id").cloned()).unwrap_or(Bson::Null))
    }
}
