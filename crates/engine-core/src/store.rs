//! The `DocumentStore` trait: the engine's view of the shared document
//! database. Concrete implementations
//! (`MongoStore`, `MemoryStore`) live in `engine-store` so this crate stays
//! free of a live database dependency; `bson` types are the wire shape both
//! sides agree on, matching the `mongodb` driver's own document type.

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::StoreError;

/// Well-known collection names touched by the engine.
pub mod collections {
    pub const STEPS: &str = "steps";
    pub const TEMP: &str = "temp";
    pub const FILES: &str = "files";
}

/// The document-store contract the engine depends on. Mirrors the subset of
/// MongoDB's API the engine actually calls: `find_one`, `find`, `insert_one`,
/// `upsert_one`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError>;

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson, StoreError>;

    /// Insert or update a document matching `filter` with `update`. Returns
    /// the `_id` of the affected document (existing or newly created).
    async fn upsert_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<Bson, StoreError>;
}

/// Descend a dotted path (e.g. `"result.filepath"`) through a BSON document.
/// Returns `None` if any intermediate component is absent or not a document
/// — "unresolvable", not an error.
pub fn project_path<'a>(doc: &'a Document, dotted_path: &str) -> Option<&'a Bson> {
    let mut segments = dotted_path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn project_path_descends_nested_document() {
        let d = doc! { "result": { "filepath": "/mnt/shared/wordlist.txt" } };
        assert_eq!(
            project_path(&d, "result.filepath"),
            Some(&Bson::String("/mnt/shared/wordlist.txt".to_string()))
        );
    }

    #[test]
    fn project_path_missing_intermediate_is_none() {
        let d = doc! { "result": { "filepath": "x" } };
        assert_eq!(project_path(&d, "result.missing"), None);
        assert_eq!(project_path(&d, "other.path"), None);
    }

    #[test]
    fn project_path_single_segment() {
        let d = doc! { "IP": { "ipv4": "10.0.0.1" } };
        assert_eq!(
            project_path(&d, "IP.ipv4"),
            Some(&Bson::String("10.0.0.1".to_string()))
        );
    }
}
