//! Scenario 2: a permissive outer `Sequence` wrapping a
//! stop-on-failure inner `Sequence`, a lone child, and a stop-on-success
//! inner `Sequence`. Exercises short-circuiting in both directions without
//! ever failing the outer run.

use std::sync::Arc;

use engine_core::combinator::Sequence;
use engine_core::descriptor::{ImageSpec, InputSpec, InterfaceDescriptor, MappingDescriptor, Provider};
use engine_core::node::Node;
use engine_store::MemoryStore;
use engine_tool::wrappers::NetworkScanParser;
use engine_tool::ToolNode;

use demos::{Script, ScriptedRuntime};

fn nmap_interface() -> InterfaceDescriptor {
    InterfaceDescriptor {
        inputs: vec![InputSpec { name: "target".into(), mandatory: true }],
        command: vec!["nmap".into(), "{{target}}".into()],
        image: ImageSpec { context: ".".into(), tag: "skelet0wn/nmap".into() },
    }
}

fn mapping() -> MappingDescriptor {
    let mut m = MappingDescriptor::new();
    m.insert("target".into(), Provider::Static { value: serde_json::json!("10.0.0.1") });
    m
}

fn nmap(runtime: &Arc<ScriptedRuntime>, output_filename: &'static str) -> ToolNode<NetworkScanParser> {
    ToolNode::new(nmap_interface(), mapping(), NetworkScanParser::new(output_filename), runtime.clone())
}

#[tokio::main]
async fn main() {
    engine_core::observability::init_observability();

    let output_root = tempfile::tempdir().unwrap();
    let shared = tempfile::tempdir().unwrap();

    // Node names are derived by Sequence::prepare_environment from tree
    // position: n0.0.0, n0.0.1, n0.1, n0.2.0, n0.2.1.
    let runtime = Arc::new(
        ScriptedRuntime::new()
            .script("n0.0.0", Script::failing())
            .script("n0.0.1", Script::ok_with_output("output.txt", "10.0.0.1|up||\n"))
            .script("n0.1", Script::ok_with_output("output.txt", "10.0.0.1|up||\n"))
            .script("n0.2.0", Script::ok_with_output("output.txt", "10.0.0.1|up||\n"))
            .script("n0.2.1", Script::failing()),
    );

    let inner_stop_on_failure = Sequence::new(vec![
        Box::new(nmap(&runtime, "n0_0_0.txt")),
        Box::new(nmap(&runtime, "n0_0_1.txt")),
    ]);
    let lone_child = nmap(&runtime, "n0_1.txt");
    let inner_stop_on_success =
        Sequence::new(vec![Box::new(nmap(&runtime, "n0_2_0.txt")), Box::new(nmap(&runtime, "n0_2_1.txt"))])
            .stop_on_success(true);

    let mut outer = Sequence::new(vec![
        Box::new(inner_stop_on_failure),
        Box::new(lone_child),
        Box::new(inner_stop_on_success),
    ])
    .stop_on_failure(false);
    outer.prepare_environment(output_root.path(), shared.path(), "n0");

    let db = MemoryStore::new();
    outer.run(&db, "run-scenario-2").await.expect("permissive outer sequence must not fail");

    let recorded: Vec<String> = db
        .snapshot("steps")
        .iter()
        .map(|s| s.get_str("name").unwrap_or("?").to_string())
        .collect();
    println!("steps recorded: {recorded:?}");

    assert!(recorded.contains(&"n0.0.0".to_string()), "failing child n0.0.0 must record a step");
    assert!(!recorded.contains(&"n0.0.1".to_string()), "n0.0.1 must never run after n0.0.0 fails");
    assert!(recorded.contains(&"n0.1".to_string()));
    assert!(recorded.contains(&"n0.2.0".to_string()));
    assert!(!recorded.contains(&"n0.2.1".to_string()), "n0.2.1 must never run after n0.2.0 succeeds");
    assert!(recorded.contains(&"n0".to_string()), "outer sequence itself records success");
    println!("scenario 2 ok: nested short-circuiting behaved as expected");
}
