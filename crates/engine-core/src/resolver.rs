//! The Parameter Resolver. Generalizes
//! `skelet0wn/limbs/bones/bone.py::Bone.fetch_arguments`'s `bool` return into
//! `Option<ResolvedValues>`, so the resolved map itself carries the
//! "did it work" signal rather than a separate flag.

use std::collections::BTreeMap;

use bson::{doc, Bson, Document};
use tracing::debug;

use crate::descriptor::{InterfaceDescriptor, MappingDescriptor, Provider};
use crate::error::MappingError;
use crate::naming::previous;
use crate::store::{collections, project_path, DocumentStore};

/// Input name -> resolved JSON scalar, ready for command-template rendering.
pub type ResolvedValues = BTreeMap<String, serde_json::Value>;

/// Resolve every input of `interface` against `mapping`.
///
/// Returns `Ok(None)` when an input's dynamic provider is well-formed but its
/// query comes back empty or its projection path is absent — an
/// "unresolvable-but-not-erroneous" signal. Any structurally
/// invalid provider (missing mandatory input, bad query shape, no previous
/// sibling, incoherent collection) is a hard [`MappingError`].
pub async fn resolve(
    interface: &InterfaceDescriptor,
    mapping: &MappingDescriptor,
    db: &dyn DocumentStore,
    node_name: &str,
    run_id: &str,
) -> Result<Option<ResolvedValues>, MappingError> {
    let mut values = ResolvedValues::new();

    for input in &interface.inputs {
        let provider = match mapping.get(&input.name) {
            Some(p) => p,
            None => {
                if input.mandatory {
                    return Err(MappingError::new(
                        &input.name,
                        "mandatory input absent from mapping",
                    ));
                }
                continue;
            }
        };

        match provider {
            Provider::Static { value } => {
                if value.is_null() {
                    return Err(MappingError::new(&input.name, "static provider value missing"));
                }
                values.insert(input.name.clone(), value.clone());
            }
            Provider::Dynamic { query } => {
                if query.collection.is_empty() {
                    return Err(MappingError::new(&input.name, "dynamic query missing collection"));
                }
                if query.projection.len() != 1 {
                    return Err(MappingError::new(
                        &input.name,
                        "dynamic query projection must have exactly one field",
                    ));
                }
                let (projection_key, _) = query
                    .projection
                    .iter()
                    .next()
                    .expect("checked len == 1 above");

                let mut filter: Document = match &query.filter {
                    Some(f) => bson::to_document(f)
                        .map_err(|e| MappingError::new(&input.name, format!("invalid filter: {e}")))?,
                    None => Document::new(),
                };

                if let Some(root) = &query.root {
                    let resolved_name = if root == "previous" {
                        previous(node_name).ok_or_else(|| {
                            MappingError::new(&input.name, format!("node {node_name} has no previous sibling"))
                        })?
                    } else {
                        root.clone()
                    };

                    let step = find_latest_step(db, &resolved_name, run_id)
                        .await
                        .map_err(|e| MappingError::new(&input.name, e.to_string()))?
                        .ok_or_else(|| {
                            MappingError::new(
                                &input.name,
                                format!("no step record with output for {resolved_name}"),
                            )
                        })?;

                    let step_collection = step.get_str("outputCollection").map_err(|_| {
                        MappingError::new(&input.name, "resolved step has no outputCollection")
                    })?;
                    if step_collection != query.collection {
                        return Err(MappingError::new(
                            &input.name,
                            format!(
                                "resolved step's outputCollection {step_collection} does not match mapping's collection {}",
                                query.collection
                            ),
                        ));
                    }

                    let output_id = step.get("outputID").cloned().unwrap_or(Bson::Null);
                    filter.insert("_id", output_id);
                }

                let projection_doc = bson::to_document(&query.projection)
                    .map_err(|e| MappingError::new(&input.name, format!("invalid projection: {e}")))?;

                let found = db
                    .find_one(&query.collection, filter, Some(projection_doc))
                    .await
                    .map_err(|e| MappingError::new(&input.name, e.to_string()))?;

                let doc = match found {
                    Some(d) => d,
                    None => {
                        debug!(input = %input.name, "dynamic query returned no document");
                        return Ok(None);
                    }
                };

                let resolved = match project_path(&doc, projection_key) {
                    Some(b) => b,
                    None => {
                        debug!(input = %input.name, path = %projection_key, "projection path absent");
                        return Ok(None);
                    }
                };

                values.insert(input.name.clone(), bson_to_json(resolved));
            }
        }
    }

    Ok(Some(values))
}

/// Look up the most recent `steps` record for `name`/`run_id` with a
/// non-null output pointer.
async fn find_latest_step(
    db: &dyn DocumentStore,
    name: &str,
    run_id: &str,
) -> Result<Option<Document>, crate::error::StoreError> {
    let filter = doc! {
        "name": name,
        "run_id": run_id,
        "outputCollection": { "$ne": Bson::Null },
        "outputID": { "$ne": Bson::Null },
    };
    let mut matches = db.find(collections::STEPS, filter, None).await?;
    matches.sort_by(|a, b| {
        let at = a.get("time").and_then(Bson::as_datetime);
        let bt = b.get("time").and_then(Bson::as_datetime);
        at.cmp(&bt)
    });
    Ok(matches.pop())
}

fn bson_to_json(value: &Bson) -> serde_json::Value {
    serde_json::to_value(value.clone()).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DynamicQuery, ImageSpec, InputSpec};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeStore {
        steps: Mutex<Vec<Document>>,
        docs: Mutex<BTreeMap<String, Vec<Document>>>,
    }

    #[async_trait]
    impl DocumentStore for FakeStore {
        async fn find_one(
            &self,
            collection: &str,
            filter: Document,
            _projection: Option<Document>,
        ) -> Result<Option<Document>, crate::error::StoreError> {
            let store = if collection == collections::STEPS {
                self.steps.lock().unwrap().clone()
            } else {
                self.docs
                    .lock()
                    .unwrap()
                    .get(collection)
                    .cloned()
                    .unwrap_or_default()
            };
            Ok(store.into_iter().find(|d| matches_filter(d, &filter)))
        }

        async fn find(
            &self,
            collection: &str,
            filter: Document,
            _projection: Option<Document>,
        ) -> Result<Vec<Document>, crate::error::StoreError> {
            let store = if collection == collections::STEPS {
                self.steps.lock().unwrap().clone()
            } else {
                self.docs
                    .lock()
                    .unwrap()
                    .get(collection)
                    .cloned()
                    .unwrap_or_default()
            };
            Ok(store.into_iter().filter(|d| matches_filter(d, &filter)).collect())
        }

        async fn insert_one(&self, _collection: &str, _doc: Document) -> Result<Bson, crate::error::StoreError> {
            unimplemented!()
        }

        async fn upsert_one(
            &self,
            _collection: &str,
            _filter: Document,
            _update: Document,
        ) -> Result<Bson, crate::error::StoreError> {
            unimplemented!()
        }
    }

    fn matches_filter(d: &Document, filter: &Document) -> bool {
        filter.iter().all(|(k, v)| match v {
            Bson::Document(op) if op.contains_key("$ne") => d.get(k) != op.get("$ne"),
            _ => d.get(k) == Some(v),
        })
    }

    fn interface_with_dynamic(mandatory: bool) -> InterfaceDescriptor {
        InterfaceDescriptor {
            inputs: vec![InputSpec { name: "target".into(), mandatory }],
            command: vec!["nmap {{target}}".into()],
            image: ImageSpec { context: ".".into(), tag: "x".into() },
        }
    }

    #[tokio::test]
    async fn static_value_binds_verbatim() {
        let iface = InterfaceDescriptor {
            inputs: vec![InputSpec { name: "target".into(), mandatory: true }],
            command: vec![],
            image: ImageSpec { context: ".".into(), tag: "x".into() },
        };
        let mut mapping = MappingDescriptor::new();
        mapping.insert(
            "target".into(),
            Provider::Static { value: serde_json::json!("10.0.0.1") },
        );
        let db = FakeStore { steps: Mutex::new(vec![]), docs: Mutex::new(BTreeMap::new()) };
        let resolved = resolve(&iface, &mapping, &db, "n0.1", "run1").await.unwrap().unwrap();
        assert_eq!(resolved.get("target").unwrap(), "10.0.0.1");
    }

    #[tokio::test]
    async fn mandatory_missing_is_mapping_error() {
        let iface = interface_with_dynamic(true);
        let mapping = MappingDescriptor::new();
        let db = FakeStore { steps: Mutex::new(vec![]), docs: Mutex::new(BTreeMap::new()) };
        let err = resolve(&iface, &mapping, &db, "n0.1", "run1").await.unwrap_err();
        assert_eq!(err.argument, "target");
    }

    #[tokio::test]
    async fn optional_missing_is_skipped() {
        let iface = interface_with_dynamic(false);
        let mapping = MappingDescriptor::new();
        let db = FakeStore { steps: Mutex::new(vec![]), docs: Mutex::new(BTreeMap::new()) };
        let resolved = resolve(&iface, &mapping, &db, "n0.1", "run1").await.unwrap().unwrap();
        assert!(resolved.get("target").is_none());
    }

    #[tokio::test]
    async fn previous_on_slot_zero_is_mapping_error() {
        let iface = interface_with_dynamic(true);
        let mut mapping = MappingDescriptor::new();
        mapping.insert(
            "target".into(),
            Provider::Dynamic {
                query: DynamicQuery {
                    root: Some("previous".into()),
                    collection: "temp".into(),
                    filter: None,
                    projection: serde_json::json!({"result": 1}).as_object().unwrap().clone(),
                },
            },
        );
        let db = FakeStore { steps: Mutex::new(vec![]), docs: Mutex::new(BTreeMap::new()) };
        let err = resolve(&iface, &mapping, &db, "n0.0", "run1").await.unwrap_err();
        assert_eq!(err.argument, "target");
    }

    #[tokio::test]
    async fn dynamic_query_empty_result_is_unresolvable() {
        let iface = interface_with_dynamic(false);
        let mut mapping = MappingDescriptor::new();
        mapping.insert(
            "target".into(),
            Provider::Dynamic {
                query: DynamicQuery {
                    root: None,
                    collection: "machines".into(),
                    filter: None,
                    projection: serde_json::json!({"IP.ipv4": 1}).as_object().unwrap().clone(),
                },
            },
        );
        let db = FakeStore { steps: Mutex::new(vec![]), docs: Mutex::new(BTreeMap::new()) };
        let resolved = resolve(&iface, &mapping, &db, "n0.1", "run1").await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn two_field_projection_is_mapping_error() {
        let iface = interface_with_dynamic(true);
        let mut mapping = MappingDescriptor::new();
        mapping.insert(
            "target".into(),
            Provider::Dynamic {
                query: DynamicQuery {
                    root: None,
                    collection: "machines".into(),
                    filter: None,
                    projection: serde_json::json!({"IP.ipv4": 1, "_id": 0}).as_object().unwrap().clone(),
                },
            },
        );
        let db = FakeStore { steps: Mutex::new(vec![]), docs: Mutex::new(BTreeMap::new()) };
        let err = resolve(&iface, &mapping, &db, "n0.1", "run1").await.unwrap_err();
        assert_eq!(err.argument, "target");
    }
}
