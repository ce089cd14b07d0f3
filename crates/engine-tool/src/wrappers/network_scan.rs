//! An Nmap-shaped network scan wrapper, ported from
//! `limbs/bones/nmap/node.py::Nmap.store_results`. The original parses raw
//! Nmap XML; that per-tool parsing detail is deliberately out of scope here,
//! so this wrapper instead reads a minimal line-oriented scan report —
//! just enough shape to exercise the `machines` upsert pattern the
//! Transformer-chaining scenario depends on.
//!
//! Report line format, one host per line:
//! `<ipv4>|<status>|<port>=<state>[,<port>=<state>...]|<hostname>[,<hostname>...]`
//! The port list and hostname list may be empty.

use std::path::Path;

use async_trait::async_trait;
use bson::{doc, Binary};

use engine_core::metadata::OutputPointer;
use engine_core::store::DocumentStore;

use crate::tool_node::ToolResultParser;

pub struct NetworkScanParser {
    pub raw_filename: String,
}

impl NetworkScanParser {
    pub fn new(raw_filename: impl Into<String>) -> Self {
        Self { raw_filename: raw_filename.into() }
    }
}

fn parse_line(line: &str) -> Option<(String, String, Vec<(String, String)>, Vec<String>)> {
    let mut fields = line.splitn(4, '|');
    let ip = fields.next()?.trim();
    if ip.is_empty() {
        return None;
    }
    let status = fields.next().unwrap_or("unknown").trim();
    let ports = fields
        .next()
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|p| p.split_once('=').map(|(port, state)| (port.to_string(), state.to_string())))
        .collect();
    let hostnames = fields
        .next()
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Some((ip.to_string(), status.to_string(), ports, hostnames))
}

#[async_trait]
impl ToolResultParser for NetworkScanParser {
    async fn store_results(
        &self,
        db: &dyn DocumentStore,
        _run_id: &str,
        output_dir: &Path,
    ) -> Result<OutputPointer, String> {
        let report_path = output_dir.join("output.txt");
        let raw = tokio::fs::read(&report_path)
            .await
            .map_err(|e| format!("reading {report_path:?}: {e}"))?;
        let text = String::from_utf8_lossy(&raw);

        for line in text.lines() {
            let Some((ip, status, ports, hostnames)) = parse_line(line) else { continue };

            let mut update = doc! { "IP.ipv4": &ip, "status": &status };
            for (port, state) in &ports {
                update.insert(format!("ports.{port}.status"), state);
            }
            if !hostnames.is_empty() {
                update.insert("hostnames", hostnames);
            }
            db.upsert_one("machines", doc! { "IP.ipv4": &ip }, update)
                .await
                .map_err(|e| e.to_string())?;
        }

        let id = db
            .insert_one(
                "files",
                doc! {
                    "filename": &self.raw_filename,
                    "content": Binary { subtype: bson::spec::BinarySubtype::Generic, bytes: raw },
                    "content_decoded": text.into_owned(),
                },
            )
            .await
            .map_err(|e| e.to_string())?;
        Ok(OutputPointer::new("files", id))
    }
}
