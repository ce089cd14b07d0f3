//! Scenario 6: a root-level `Sequence` wrapping a single Tool
//! Node whose mandatory dynamic input has `root: "previous"` but no
//! previous sibling exists. The Node must raise a `MappingError`, record
//! exactly one `steps` document with a null `outputCollection`, and the
//! default stop-on-failure `Sequence` must propagate the failure without
//! writing its own metadata.

use std::sync::Arc;

use engine_core::combinator::Sequence;
use engine_core::descriptor::{DynamicQuery, ImageSpec, InputSpec, InterfaceDescriptor, MappingDescriptor, Provider};
use engine_core::error::NodeError;
use engine_core::node::Node;
use engine_store::MemoryStore;
use engine_tool::wrappers::GenericTemplateParser;
use engine_tool::ToolNode;

use demos::ScriptedRuntime;

fn interface_with_mandatory_previous_input() -> InterfaceDescriptor {
    InterfaceDescriptor {
        inputs: vec![InputSpec { name: "target".into(), mandatory: true }],
        command: vec!["nxc".into(), "smb".into(), "{{target}}".into()],
        image: ImageSpec { context: ".".into(), tag: "skelet0wn/nxcsmb".into() },
    }
}

fn mapping_requiring_previous() -> MappingDescriptor {
    let mut m = MappingDescriptor::new();
    m.insert(
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
    m
}

#[tokio::main]
async fn main() {
    engine_core::observability::init_observability();

    let output_root = tempfile::tempdir().unwrap();
    let shared = tempfile::tempdir().unwrap();

    // No scripts registered: the container runner is never reached because
    // resolution fails before phase 3 (build image).
    let runtime = Arc::new(ScriptedRuntime::new());

    let tool = ToolNode::new(
        interface_with_mandatory_previous_input(),
        mapping_requiring_previous(),
        GenericTemplateParser::new("never_written.txt"),
        runtime,
    );

    let mut sequence = Sequence::new(vec![Box::new(tool)]);
    sequence.prepare_environment(output_root.path(), shared.path(), "n0");

    let db = MemoryStore::new();
    let err = sequence.run(&db, "run-scenario-6").await.expect_err("root sibling has no previous, must fail");
    assert!(matches!(err, NodeError::Wrapped { .. }), "sequence wraps the child's failure with context");
    println!("sequence.run() failed as expected: {err}");

    let steps = db.snapshot("steps");
    assert_eq!(steps.len(), 1, "exactly one steps document, for the failing child");
    assert_eq!(steps[0].get_str("name").unwrap(), "n0.0");
    assert_eq!(steps[0].get("outputCollection").unwrap(), &bson::Bson::Null);
    assert!(
        !steps.iter().any(|s| s.get_str("name") == Ok("n0")),
        "the outer sequence's own metadata must not be written when it propagates"
    );
    println!("scenario 6 ok: MappingError surfaced with exactly one null-output step record");
}
