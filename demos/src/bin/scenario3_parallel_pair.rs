//! Scenario 3: `Parallel(front=NmapFast, back=NmapSlow)`. Front
//! finishes immediately; back is still "running" (its scripted container
//! never reports on its own) and must be interrupted, surfacing exit code
//! 137 once `front` completes.

use std::sync::Arc;

use engine_core::combinator::Parallel;
use engine_core::descriptor::{ImageSpec, InputSpec, InterfaceDescriptor, MappingDescriptor, Provider};
use engine_core::node::Node;
use engine_store::MemoryStore;
use engine_tool::wrappers::NetworkScanParser;
use engine_tool::ToolNode;

use demos::{describe_exit, Script, ScriptedRuntime};

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

#[tokio::main]
async fn main() {
    engine_core::observability::init_observability();

    let output_root = tempfile::tempdir().unwrap();
    let shared = tempfile::tempdir().unwrap();

    // Parallel names its front/back children `<name>.f` / `<name>.b`.
    let runtime = Arc::new(
        ScriptedRuntime::new()
            .script("n0.f", Script::ok_with_output("output.txt", "10.0.0.1|up||\n"))
            .script("n0.b", Script::blocks_forever("output.txt", "10.0.0.1|up||\n")),
    );

    let front = ToolNode::new(nmap_interface(), mapping(), NetworkScanParser::new("fast.txt"), runtime.clone());
    let back = ToolNode::new(nmap_interface(), mapping(), NetworkScanParser::new("slow.txt"), runtime);

    let mut parallel = Parallel::new(Box::new(front), Box::new(back));
    parallel.prepare_environment(output_root.path(), shared.path(), "n0");

    let db = MemoryStore::new();
    parallel.run(&db, "run-scenario-3").await.expect("parallel must succeed even though back is killed");

    let steps = db.snapshot("steps");
    let front_step = steps.iter().find(|s| s.get_str("name") == Ok("n0.f")).expect("front step recorded");
    let back_step = steps.iter().find(|s| s.get_str("name") == Ok("n0.b")).expect("back step recorded");

    let front_code =
        front_step.get_document("docker").unwrap().get_document("runStatus").unwrap().get_i64("StatusCode").unwrap();
    let back_code =
        back_step.get_document("docker").unwrap().get_document("runStatus").unwrap().get_i64("StatusCode").unwrap();
    println!("front: {}", describe_exit("n0.f", front_code));
    println!("back: {}", describe_exit("n0.b", back_code));

    assert_eq!(front_code, 0);
    assert_eq!(back_code, engine_container::EARLY_STOP_EXIT_CODE);
    println!("scenario 3 ok: back was killed at 137 once front completed");
}
