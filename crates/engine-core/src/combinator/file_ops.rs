//! UploadFile / ShareFile: move bytes between host filesystem, database, and
//! shared directory. Grounded on
//! `skelet0wn/limbs/joints/files/node.py`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bson::{doc, Binary, Bson, Document};

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::metadata::{store_metadata, OutputPointer};
use crate::node::Node;
use crate::store::{collections, project_path, DocumentStore};

/// Reads a host file and inserts it into the `files` collection.
pub struct UploadFile {
    host_path: PathBuf,
    logical_name: String,
    ctx: Option<NodeContext>,
}

impl UploadFile {
    pub fn new(host_path: impl Into<PathBuf>, logical_name: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            logical_name: logical_name.into(),
            ctx: None,
        }
    }
}

#[async_trait]
impl Node for UploadFile {
    fn prepare_environment(&mut self, output_root: &Path, shared_dir: &Path, name: &str) {
        self.ctx = Some(
            NodeContext::prepare("upload_file", output_root, shared_dir, name)
                .expect("failed to prepare upload_file directories"),
        );
    }

    async fn run(&mut self, db: &dyn DocumentStore, run_id: &str) -> Result<(), NodeError> {
        let ctx = self.ctx.clone().expect("prepare_environment must run first");
        let _span = ctx.span().entered();

        let bytes = tokio::fs::read(&self.host_path)
            .await
            .map_err(|e| NodeError::Other(format!("reading {}: {e}", self.host_path.display())))?;

        let mut record = doc! {
            "filename": &self.logical_name,
            "content": Binary { subtype: bson::spec::BinarySubtype::Generic, bytes: bytes.clone() },
        };
        if let Ok(text) = String::from_utf8(bytes) {
            record.insert("content_decoded", text);
        }

        let inserted_id = db
            .insert_one(collections::FILES, record)
            .await
            .map_err(NodeError::Store)?;

        store_metadata(
            db,
            &ctx,
            run_id,
            OutputPointer::new(collections::FILES, inserted_id),
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

/// Materializes a previously-uploaded `files` record into `shared_dir`,
/// making it visible to the next Tool Node's container at
/// `/mnt/shared/<logical_name>`.
pub struct ShareFile {
    logical_name: String,
    ctx: Option<NodeContext>,
    target_path: Option<PathBuf>,
}

impl ShareFile {
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            ctx: None,
            target_path: None,
        }
    }
}

#[async_trait]
impl Node for ShareFile {
    fn prepare_environment(&mut self, output_root: &Path, shared_dir: &Path, name: &str) {
        let ctx = NodeContext::prepare("share_file", output_root, shared_dir, name)
            .expect("failed to prepare share_file directories");
        self.target_path = Some(ctx.shared_dir.join(&self.logical_name));
        self.ctx = Some(ctx);
    }

    async fn run(&mut self, db: &dyn DocumentStore, run_id: &str) -> Result<(), NodeError> {
        let ctx = self.ctx.clone().expect("prepare_environment must run first");
        let _span = ctx.span().entered();
        let target_path = self
            .target_path
            .clone()
            .expect("prepare_environment must run first");

        let record = db
            .find_one(collections::FILES, doc! { "filename": &self.logical_name }, None)
            .await
            .map_err(NodeError::Store)?
            .ok_or_else(|| NodeError::Other(format!("no uploaded file named {}", self.logical_name)))?;

        let bytes = match project_path(&record, "content") {
            Some(Bson::Binary(b)) => b.bytes.clone(),
            _ => return Err(NodeError::Other(format!("{} has no content field", self.logical_name))),
        };

        tokio::fs::write(&target_path, &bytes)
            .await
            .map_err(|e| NodeError::Other(format!("writing {}: {e}", target_path.display())))?;

        let filepath = format!("/mnt/shared/{}", self.logical_name);
        let inserted_id = db
            .insert_one(collections::TEMP, doc! { "result": { "filepath": filepath } })
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
    use crate::combinator::sequence::Sequence;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FilesStore {
        files: Mutex<Vec<Document>>,
        temp: Mutex<Vec<Document>>,
    }

    #[async_trait]
    impl DocumentStore for FilesStore {
        async fn find_one(
            &self,
            collection: &str,
            filter: Document,
            _projection: Option<Document>,
        ) -> Result<Option<Document>, crate::error::StoreError> {
            let store = if collection == collections::FILES {
                self.files.lock().unwrap().clone()
            } else {
                self.temp.lock().unwrap().clone()
            };
            let name = filter.get_str("filename").unwrap_or_default();
            Ok(store.into_iter().find(|d| d.get_str("filename").unwrap_or_default() == name))
        }

        async fn find(
            &self,
            _c: &str,
            _f: Document,
            _p: Option<Document>,
        ) -> Result<Vec<Document>, crate::error::StoreError> {
            Ok(vec![])
        }

        async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson, crate::error::StoreError> {
            if collection == collections::FILES {
                self.files.lock().unwrap().push(doc);
            } else {
                self.temp.lock().unwrap().push(doc);
            }
            Ok(Bson::String("id-1".into()))
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
    async fn upload_then_share_round_trips_bytes() {
        let output_root = tempdir().unwrap();
        let shared = tempdir().unwrap();
        let host_dir = tempdir().unwrap();
        let host_path = host_dir.path().join("wordlist.txt");
        std::fs::write(&host_path, b"admin\npassword\n").unwrap();

        let db = FilesStore { files: Mutex::new(vec![]), temp: Mutex::new(vec![]) };

        let mut seq = Sequence::new(vec![
            Box::new(UploadFile::new(host_path.clone(), "wordlist.txt")),
            Box::new(ShareFile::new("wordlist.txt")),
        ]);
        seq.prepare_environment(output_root.path(), shared.path(), "n0");
        seq.run(&db, "run1").await.unwrap();

        let shared_contents = std::fs::read(shared.path().join("wordlist.txt")).unwrap();
        let original = std::fs::read(&host_path).unwrap();
        assert_eq!(shared_contents, original);

        let temp = db.temp.lock().unwrap();
        assert_eq!(temp.len(), 1);
        assert_eq!(
            project_path(&temp[0], "result.filepath"),
            Some(&Bson::String("/mnt/shared/wordlist.txt".into()))
        );
    }
}
