//! Scenario 5: `Sequence[ UploadFile, ShareFile, Hashcat(...) ]`.
//! A host file is uploaded into `files`, materialized into the shared
//! directory by `ShareFile`, and Hashcat's mapping resolves its wordlist
//! input to that shared path via `root: "previous"`.

use std::sync::Arc;

use engine_core::combinator::{Sequence, ShareFile, UploadFile};
use engine_core::descriptor::{DynamicQuery, ImageSpec, InputSpec, InterfaceDescriptor, MappingDescriptor, Provider};
use engine_core::node::Node;
use engine_store::MemoryStore;
use engine_tool::wrappers::GenericTemplateParser;
use engine_tool::ToolNode;

use demos::{Script, ScriptedRuntime};

fn hashcat_interface() -> InterfaceDescriptor {
    InterfaceDescriptor {
        inputs: vec![InputSpec { name: "wordlist".into(), mandatory: true }],
        command: vec![
            "hashcat".into(),
            "-a".into(),
            "0".into(),
            "-m".into(),
            "0".into(),
            "hash.txt".into(),
            "{{wordlist}}".into(),
        ],
        image: ImageSpec { context: ".".into(), tag: "skelet0wn/hashcat".into() },
    }
}

fn wordlist_from_previous() -> MappingDescriptor {
    let mut m = MappingDescriptor::new();
    m.insert(
        "wordlist".into(),
        Provider::Dynamic {
            query: DynamicQuery {
                root: Some("previous".into()),
                collection: "temp".into(),
                filter: None,
                projection: serde_json::json!({"result.filepath": 1}).as_object().unwrap().clone(),
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
    let host_dir = tempfile::tempdir().unwrap();
    let host_path = host_dir.path().join("wordlist.txt");
    std::fs::write(&host_path, b"admin\npassword\nletmein\n").unwrap();

    let runtime =
        Arc::new(ScriptedRuntime::new().script("n0.2", Script::ok_with_output("output.txt", "cracked: admin\n")));

    let upload = UploadFile::new(host_path.clone(), "wordlist.txt");
    let share = ShareFile::new("wordlist.txt");
    let hashcat = ToolNode::new(
        hashcat_interface(),
        wordlist_from_previous(),
        GenericTemplateParser::new("hashcat_output.txt"),
        runtime,
    );

    let mut sequence = Sequence::new(vec![Box::new(upload), Box::new(share), Box::new(hashcat)]);
    sequence.prepare_environment(output_root.path(), shared.path(), "n0");

    let db = MemoryStore::new();
    sequence.run(&db, "run-scenario-5").await.expect("sequence should succeed");

    let shared_contents = std::fs::read(shared.path().join("wordlist.txt")).unwrap();
    let original = std::fs::read(&host_path).unwrap();
    assert_eq!(shared_contents, original, "shared copy must match the uploaded file byte for byte");

    let steps = db.snapshot("steps");
    let hashcat_step = steps.iter().find(|s| s.get_str("name") == Ok("n0.2")).expect("hashcat step recorded");
    let argv = hashcat_step.get_array("command").expect("hashcat step records its rendered command");
    let rendered = argv.iter().filter_map(|b| b.as_str()).collect::<Vec<_>>().join(" ");
    assert!(rendered.contains("/mnt/shared/wordlist.txt"), "hashcat argv must reference the shared path");
    println!("scenario 5 ok: hashcat argv {rendered:?}");
}
