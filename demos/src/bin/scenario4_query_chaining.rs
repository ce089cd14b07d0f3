//! Scenario 4: `Sequence[ Nmap, Transformer(...), NxcSmb(...) ]`.
//! The Transformer joins the IPv4 addresses of every host with port 445
//! open; NxcSmb's mapping pulls that joined string back out of `temp` via
//! a `root: "previous"` dynamic input.

use std::sync::Arc;

use engine_core::combinator::{join_with_space, Sequence, Transformer};
use engine_core::descriptor::{DynamicQuery, ImageSpec, InputSpec, InterfaceDescriptor, MappingDescriptor, Provider};
use engine_core::node::Node;
use engine_store::MemoryStore;
use engine_tool::wrappers::{GenericTemplateParser, NetworkScanParser};
use engine_tool::ToolNode;

use demos::{Script, ScriptedRuntime};

fn nmap_interface() -> InterfaceDescriptor {
    InterfaceDescriptor {
        inputs: vec![InputSpec { name: "target".into(), mandatory: true }],
        command: vec!["nmap".into(), "{{target}}".into()],
        image: ImageSpec { context: ".".into(), tag: "skelet0wn/nmap".into() },
    }
}

fn nxcsmb_interface() -> InterfaceDescriptor {
    InterfaceDescriptor {
        inputs: vec![InputSpec { name: "target".into(), mandatory: true }],
        command: vec!["nxc".into(), "smb".into(), "{{target}}".into()],
        image: ImageSpec { context: ".".into(), tag: "skelet0wn/nxcsmb".into() },
    }
}

fn static_mapping() -> MappingDescriptor {
    let mut m = MappingDescriptor::new();
    m.insert("target".into(), Provider::Static { value: serde_json::json!("10.0.0.5") });
    m
}

fn dynamic_target_from_previous() -> MappingDescriptor {
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

    let runtime = Arc::new(ScriptedRuntime::new().script(
        "n0.0",
        Script::ok_with_output("output.txt", "10.0.0.5|up|445=open|smb01\n10.0.0.6|up|22=open|other\n"),
    ).script("n0.2", Script::ok_with_output("output.txt", "nxc ran\n")));

    let scan = ToolNode::new(nmap_interface(), static_mapping(), NetworkScanParser::new("scan.txt"), runtime.clone());
    let join_open_445 = Transformer::new(
        "machines",
        bson::doc! { "ports.445.status": "open" },
        Some(bson::doc! { "IP.ipv4": 1, "_id": 0 }),
        join_with_space("IP.ipv4"),
    );
    let nxcsmb = ToolNode::new(
        nxcsmb_interface(),
        dynamic_target_from_previous(),
        GenericTemplateParser::new("nxcsmb_output.txt"),
        runtime,
    );

    let mut sequence =
        Sequence::new(vec![Box::new(scan), Box::new(join_open_445), Box::new(nxcsmb)]);
    sequence.prepare_environment(output_root.path(), shared.path(), "n0");

    let db = MemoryStore::new();
    sequence.run(&db, "run-scenario-4").await.expect("sequence should succeed");

    let steps = db.snapshot("steps");
    assert_eq!(steps.len(), 3, "one step per child: nmap, transformer, nxcsmb");

    let nxcsmb_step = steps.iter().find(|s| s.get_str("name") == Ok("n0.2")).expect("nxcsmb step recorded");
    let argv = nxcsmb_step.get_array("command").expect("nxcsmb step records its rendered command");
    println!("nxcsmb argv: {argv:?}");
    let rendered = argv.iter().filter_map(|b| b.as_str()).collect::<Vec<_>>().join(" ");
    assert!(rendered.contains("10.0.0.5"), "rendered argv must contain the open-445 host");
    assert!(!rendered.contains("10.0.0.6"), "10.0.0.6 has no open 445 and must be excluded");
    println!("scenario 4 ok: query-driven chaining produced argv {rendered:?}");
}
