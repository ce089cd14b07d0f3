//! `MemoryStore`: an in-process `DashMap`-backed `DocumentStore`, standing in
//! for MongoDB in unit and integration tests that don't want a live
//! database. Modeled on a `DashMap`-backed in-memory run store
//! (`Arc<DashMap<Uuid, StoredOutput>>`), generalized into a full
//! `DocumentStore` implementation.

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use dashmap::DashMap;

use engine_core::error::StoreError;
use engine_core::store::{project_path, DocumentStore};

/// Collection name -> insertion-ordered documents.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a collection's documents, for test assertions.
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections.get(collection).map(|v| v.clone()).unwrap_or_default()
    }
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| match expected {
        Bson::Document(op) if op.len() == 1 && op.contains_key("$ne") => {
            project_path(doc, key) != op.get("$ne")
        }
        other => project_path(doc, key) == Some(other),
    })
}

fn apply_projection(doc: &Document, projection: &Document) -> Document {
    let mut out = Document::new();
    for (key, _) in projection {
        if key == "_id" {
            continue;
        }
        if let Some(value) = project_path(doc, key) {
            set_dotted(&mut out, key, value.clone());
        }
    }
    if let Some(id) = doc.get("_id") {
        out.insert("_id", id.clone());
    }
    out
}

fn set_dotted(doc: &mut Document, dotted_path: &str, value: Bson) {
    let mut segments = dotted_path.split('.').peekable();
    let first = segments.next().expect("dotted path has at least one segment");
    if segments.peek().is_none() {
        doc.insert(first, value);
        return;
    }
    let nested = doc
        .entry(first.to_string())
        .or_insert_with(|| Bson::Document(Document::new()));
    if let Bson::Document(inner) = nested {
        let rest: Vec<&str> = segments.collect();
        set_dotted(inner, &rest.join("."), value);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError> {
        let docs = self.collections.get(collection);
        let found = docs
            .as_deref()
            .and_then(|docs| docs.iter().find(|d| matches(d, &filter)).cloned());
        Ok(found.map(|d| match &projection {
            Some(p) => apply_projection(&d, p),
            None => d,
        }))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self.collections.get(collection);
        let matched: Vec<Document> = docs
            .as_deref()
            .map(|docs| docs.iter().filter(|d| matches(d, &filter)).cloned().collect())
            .unwrap_or_default();
        Ok(match &projection {
            Some(p) => matched.iter().map(|d| apply_projection(d, p)).collect(),
            None => matched,
        })
    }

    async fn insert_one(&self, collection: &str, mut doc: Document) -> Result<Bson, StoreError> {
        let id = Bson::ObjectId(ObjectId::new());
        if !doc.contains_key("_id") {
            doc.insert("_id", id.clone());
        }
        let assigned_id = doc.get("_id").cloned().unwrap_or(id);
        self.collections.entry(collection.to_string()).or_default().push(doc);
        Ok(assigned_id)
    }

    async fn upsert_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<Bson, StoreError> {
        let mut entry = self.collections.entry(collection.to_string()).or_default();
        if let Some(existing) = entry.iter_mut().find(|d| matches(d, &filter)) {
            for (k, v) in update {
                set_dotted(existing, &k, v);
            }
            return Ok(existing.get("_id").cloned().unwrap_or(Bson::Null));
        }
        let mut doc = Document::new();
        for (k, v) in filter {
            set_dotted(&mut doc, &k, v);
        }
        for (k, v) in update {
            set_dotted(&mut doc, &k, v);
        }
        let id = Bson::ObjectId(ObjectId::new());
        doc.insert("_id", id.clone());
        entry.push(doc);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn insert_then_find_one_round_trips() {
        let store = MemoryStore::new();
        store
            .insert_one("steps", doc! { "name": "n0", "run_id": "r1" })
            .await
            .unwrap();
        let found = store
            .find_one("steps", doc! { "name": "n0" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get_str("run_id").unwrap(), "r1");
    }

    #[tokio::test]
    async fn ne_operator_excludes_matching_documents() {
        let store = MemoryStore::new();
        store
            .insert_one("steps", doc! { "name": "n0", "outputCollection": Bson::Null })
            .await
            .unwrap();
        store
            .insert_one("steps", doc! { "name": "n1", "outputCollection": "files" })
            .await
            .unwrap();
        let matched = store
            .find("steps", doc! { "outputCollection": { "$ne": Bson::Null } }, None)
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].get_str("name").unwrap(), "n1");
    }

    #[tokio::test]
    async fn upsert_merges_into_existing_document() {
        let store = MemoryStore::new();
        store
            .upsert_one("hosts", doc! { "ip": "10.0.0.1" }, doc! { "ports.22.status": "open" })
            .await
            .unwrap();
        store
            .upsert_one("hosts", doc! { "ip": "10.0.0.1" }, doc! { "ports.80.status": "open" })
            .await
            .unwrap();
        let hosts = store.snapshot("hosts");
        assert_eq!(hosts.len(), 1);
    }

    #[tokio::test]
    async fn upsert_dotted_keys_nest_like_mongos_own_set() {
        let store = MemoryStore::new();
        store
            .upsert_one(
                "machines",
                doc! { "IP.ipv4": "10.0.0.1" },
                doc! { "ports.445.status": "open" },
            )
            .await
            .unwrap();
        let found = store
            .find_one("machines", doc! { "ports.445.status": "open" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            project_path(&found, "IP.ipv4"),
            Some(&Bson::String("10.0.0.1".into()))
        );
    }

    #[tokio::test]
    async fn projection_descends_dotted_path() {
        let store = MemoryStore::new();
        store
            .insert_one("temp", doc! { "result": { "filepath": "/mnt/shared/x.txt" } })
            .await
            .unwrap();
        let found = store
            .find_one("temp", Document::new(), Some(doc! { "result.filepath": 1 }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            project_path(&found, "result.filepath"),
            Some(&Bson::String("/mnt/shared/x.txt".into()))
        );
    }
}
