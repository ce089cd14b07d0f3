//! The scaffold a new tool wrapper starts from, ported from
//! `limbs/bones/generic_bone_template/node.py`: reads `output.txt` from the
//! node's private output directory and stores it verbatim as a `files`
//! record. New tool wrappers replace `store_results` with their own
//! tool-specific parsing; this one does none.

use std::path::Path;

use async_trait::async_trait;
use bson::{doc, Binary};

use engine_core::metadata::OutputPointer;
use engine_core::store::DocumentStore;

use crate::tool_node::ToolResultParser;

pub struct GenericTemplateParser {
    /// Filename given to the stored record; the original hardcodes
    /// `reverted_file.txt` for its one demonstration tool.
    pub output_filename: String,
}

impl GenericTemplateParser {
    pub fn new(output_filename: impl Into<String>) -> Self {
        Self { output_filename: output_filename.into() }
    }
}

#[async_trait]
impl ToolResultParser for GenericTemplateParser {
    async fn store_results(
        &self,
        db: &dyn DocumentStore,
        _run_id: &str,
        output_dir: &Path,
    ) -> Result<OutputPointer, String> {
        let raw = tokio::fs::read(output_dir.join("output.txt"))
            .await
            .map_err(|e| format!("reading output.txt: {e}"))?;
        let decoded = String::from_utf8(raw.clone()).ok();

        let mut record = doc! {
            "filename": &self.output_filename,
            "content": Binary { subtype: bson::spec::BinarySubtype::Generic, bytes: raw },
        };
        if let Some(text) = decoded {
            record.insert("content_decoded", text);
        }

        let id = db
            .insert_one("files", record)
            .await
            .map_err(|e| e.to_string())?;
        Ok(OutputPointer::new("files", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_store::MemoryStore;

    #[tokio::test]
    async fn stores_output_txt_as_a_files_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("output.txt"), b"hello from the container").unwrap();

        let db = MemoryStore::new();
        let parser = GenericTemplateParser::new("reverted_file.txt");
        let pointer = parser.store_results(&db, "run1", dir.path()).await.unwrap();

        assert_eq!(pointer.collection.as_deref(), Some("files"));
        let files = db.snapshot("files");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].get_str("filename").unwrap(), "reverted_file.txt");
        assert_eq!(files[0].get_str("content_decoded").unwrap(), "hello from the container");
    }
}
