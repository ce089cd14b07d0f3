//! Scenario 1: `Sequence[ Nmap("m22.yml"), Nmap("m80.yml") ]`.
//! Two Tool Nodes scanning the same host on different ports; both should
//! record a `files`-pointing step and leave `machines` populated with the
//! scanned ports.

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
        inputs: vec![
            InputSpec { name: "target".into(), mandatory: true },
            InputSpec { name: "port".into(), mandatory: true },
        ],
        command: vec!["nmap".into(), "-p".into(), "{{port}}".into(), "{{target}}".into()],
        image: ImageSpec { context: ".".into(), tag: "skelet0wn/nmap".into() },
    }
}

fn mapping(target: &str, port: &str) -> MappingDescriptor {
    let mut m = MappingDescriptor::new();
    m.insert("target".into(), Provider::Static { value: serde_json::json!(target) });
    m.insert("port".into(), Provider::Static { value: serde_json::json!(port) });
    m
}

#[tokio::main]
async fn main() {
    engine_core::observability::init_observability();

    let output_root = tempfile::tempdir().unwrap();
    let shared = tempfile::tempdir().unwrap();

    let runtime = Arc::new(
        ScriptedRuntime::new()
            .script("n0.0", Script::ok_with_output("output.txt", "10.0.0.1|up|22=open|db01.local\n"))
            .script("n0.1", Script::ok_with_output("output.txt", "10.0.0.1|up|80=open|db01.local\n")),
    );

    let scan_22 = ToolNode::new(
        nmap_interface(),
        mapping("10.0.0.1", "22"),
        NetworkScanParser::new("m22_scan.txt"),
        runtime.clone(),
    );
    let scan_80 = ToolNode::new(
        nmap_interface(),
        mapping("10.0.0.1", "80"),
        NetworkScanParser::new("m80_scan.txt"),
        runtime,
    );

    let mut sequence = Sequence::new(vec![Box::new(scan_22), Box::new(scan_80)]);
    sequence.prepare_environment(output_root.path(), shared.path(), "n0");

    let db = MemoryStore::new();
    sequence.run(&db, "run-scenario-1").await.expect("sequence should succeed");

    let steps = db.snapshot("steps");
    println!("steps recorded: {}", steps.len());
    for step in &steps {
        println!(
            "  {} outputCollection={:?} outputID={:?}",
            step.get_str("name").unwrap_or("?"),
            step.get("outputCollection"),
            step.get("outputID"),
        );
    }

    let machines = db.snapshot("machines");
    println!("machines recorded: {}", machines.len());
    for machine in &machines {
        println!("  {machine:?}");
    }

    let host = machines
        .iter()
        .find(|m| m.get_document("IP").ok().and_then(|ip| ip.get_str("ipv4").ok()) == Some("10.0.0.1"))
        .expect("scanned host must be present");
    assert!(host.get_document("ports").unwrap().contains_key("22"));
    assert!(host.get_document("ports").unwrap().contains_key("80"));
    println!("scenario 1 ok: 10.0.0.1 has both ports 22 and 80 recorded");
}
