//! `ToolNode`: a container-wrapped tool instance driving the six-phase
//! lifecycle. Grounded on `bone.py::Bone.run`, but with the
//! state threaded explicitly through [`ToolState`] instead of inferred from
//! member nullability, and metadata written as a free function so every
//! failure branch can call it without fighting the borrow checker over
//! `&mut self`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bson::doc;
use tracing::{error, warn};

use engine_container::{ContainerRuntime, ContainerSpec};
use engine_core::context::NodeContext;
use engine_core::descriptor::{InterfaceDescriptor, MappingDescriptor};
use engine_core::error::{NodeError, StateError};
use engine_core::metadata::{store_metadata, store_metadata_best_effort, OutputPointer};
use engine_core::node::Node;
use engine_core::resolver::resolve;
use engine_core::store::DocumentStore;

use crate::command::render_command;
use crate::state::ToolState;

/// Tool-specific output parsing (`bone.py::Bone.store_results`). Reads the
/// node's private `output_dir` and/or consults `db`, and must write its
/// principal output into an appropriate collection, returning a pointer to
/// it for the engine to fold into the `steps` record.
#[async_trait]
pub trait ToolResultParser: Send + Sync {
    async fn store_results(
        &self,
        db: &dyn DocumentStore,
        run_id: &str,
        output_dir: &Path,
    ) -> Result<OutputPointer, String>;
}

pub struct ToolNode<P: ToolResultParser> {
    interface: InterfaceDescriptor,
    mapping: MappingDescriptor,
    parser: P,
    runtime: Arc<dyn ContainerRuntime>,
    state: ToolState,
    ctx: Option<NodeContext>,
}

impl<P: ToolResultParser> ToolNode<P> {
    pub fn new(
        interface: InterfaceDescriptor,
        mapping: MappingDescriptor,
        parser: P,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            interface,
            mapping,
            parser,
            runtime,
            state: ToolState::Init,
            ctx: None,
        }
    }

    pub fn state(&self) -> &ToolState {
        &self.state
    }
}

#[async_trait]
impl<P: ToolResultParser + Send + Sync> Node for ToolNode<P> {
    fn prepare_environment(&mut self, output_root: &Path, shared_dir: &Path, name: &str) {
        self.ctx = Some(
            NodeContext::prepare("tool", output_root, shared_dir, name)
                .expect("failed to prepare tool node directories"),
        );
        self.state = ToolState::Prepared;
    }

    async fn run(&mut self, db: &dyn DocumentStore, run_id: &str) -> Result<(), NodeError> {
        let ctx = self.ctx.clone().expect("prepare_environment must run first");
        let _span = ctx.span().entered();

        if !matches!(self.state, ToolState::Prepared) {
            return Err(NodeError::State(StateError {
                name: ctx.name.clone(),
                class: ctx.class,
                state: self.state.name(),
                operation: "run",
            }));
        }

        // Phase 1: resolve inputs.
        let resolved = match resolve(&self.interface, &self.mapping, db, &ctx.name, run_id).await {
            Ok(Some(values)) => values,
            Ok(None) => {
                warn!(node = %ctx.name, "inputs unresolvable, refusing to execute");
                store_metadata_best_effort(db, &ctx, run_id, OutputPointer::none(), None).await;
                return Err(NodeError::State(StateError {
                    name: ctx.name.clone(),
                    class: ctx.class,
                    state: "PREPARED",
                    operation: "run with unresolved inputs",
                }));
            }
            Err(e) => {
                store_metadata_best_effort(db, &ctx, run_id, OutputPointer::none(), None).await;
                return Err(NodeError::Mapping(e));
            }
        };
        self.state = ToolState::ArgsFetched { values: resolved.clone() };

        // Phase 2: build command.
        let argv = match render_command(&self.interface.command, &resolved) {
            Ok(argv) => argv,
            Err(message) => {
                error!(node = %ctx.name, error = %message, "failed to build command");
                store_metadata_best_effort(db, &ctx, run_id, OutputPointer::none(), None).await;
                return Err(NodeError::Other(format!("building command: {message}")));
            }
        };
        self.state = ToolState::CommandBuilt { values: resolved, argv: argv.clone() };

        // Phase 3: build image.
        let context_dir = Path::new(&self.interface.image.context);
        let build_log = match self.runtime.build_image(context_dir, &self.interface.image.tag).await {
            Ok(log) => log,
            Err(e) => {
                store_metadata_best_effort(
                    db,
                    &ctx,
                    run_id,
                    OutputPointer::none(),
                    Some(doc! { "command": argv.clone() }),
                )
                .await;
                return Err(NodeError::ContainerBuild(e));
            }
        };

        // Phase 4: run container, racing our own cooperative cancellation.
        let spec = ContainerSpec {
            name: &ctx.name,
            image_tag: &self.interface.image.tag,
            argv: argv.clone(),
            output_dir: &ctx.output_dir,
            shared_dir: &ctx.shared_dir,
        };
        let (outcome, run_log) = self.run_and_wait(spec, &ctx, &build_log, &argv, db, run_id).await?;
        self.state = ToolState::ContainerRan {
            argv: argv.clone(),
            container_name: ctx.name.clone(),
            outcome: outcome.clone(),
            build_log: build_log.clone(),
        };

        // Phase 6: parse results.
        let extra = doc! {
            "command": argv.clone(),
            "docker": {
                "buildLog": build_log.join("\n"),
                "runLog": run_log,
                "runStatus": { "StatusCode": outcome.exit_code },
            },
        };
        match self.parser.store_results(db, run_id, &ctx.output_dir).await {
            Ok(pointer) => {
                store_metadata(db, &ctx, run_id, pointer, Some(extra))
                    .await
                    .map_err(NodeError::Store)?;
                self.state = ToolState::ResultsStored;
                Ok(())
            }
            Err(message) => {
                warn!(node = %ctx.name, error = %message, "failed to parse tool results");
                store_metadata_best_effort(db, &ctx, run_id, OutputPointer::none(), Some(extra)).await;
                Err(NodeError::Other(format!("parsing results: {message}")))
            }
        }
    }

    fn interrupt(&self) {
        if let Some(ctx) = &self.ctx {
            ctx.interrupt();
        }
    }

    fn context(&self) -> &NodeContext {
        self.ctx.as_ref().expect("prepare_environment must run before context() is queried")
    }
}

impl<P: ToolResultParser> ToolNode<P> {
    /// Create, start, and wait for the container, stopping it early if
    /// `ctx` is interrupted mid-run. Isolated from `run` only to keep the
    /// state machine's phase 4 readable; it owns no state of its own.
    async fn run_and_wait(
        &self,
        spec: ContainerSpec<'_>,
        ctx: &NodeContext,
        build_log: &[String],
        argv: &[String],
        db: &dyn DocumentStore,
        run_id: &str,
    ) -> Result<(engine_container::RunOutcome, String), NodeError> {
        let name = ctx.name.clone();
        let container_id = match self.runtime.create_and_start(spec).await {
            Ok(id) => id,
            Err(e) => {
                store_metadata_best_effort(
                    db,
                    ctx,
                    run_id,
                    OutputPointer::none(),
                    Some(doc! { "command": argv.to_vec(), "docker": { "buildLog": build_log.join("\n") } }),
                )
                .await;
                return Err(NodeError::ContainerRun(e));
            }
        };

        // If cancellation wins the race, `stream_logs_and_wait`'s future (and
        // whatever log text it had accumulated so far) is dropped; the run
        // log for an early-stopped container is whatever the runtime
        // chooses to report here, not the tool's actual output.
        let result = tokio::select! {
            result = self.runtime.stream_logs_and_wait(&container_id, &name) => result,
            _ = ctx.cancelled() => {
                self.runtime.stop(&container_id).await;
                self.runtime.wait(&container_id, &name).await.map(|code| (code, String::new()))
            }
        };
        self.runtime.remove(&container_id).await;

        let (exit_code, run_log) = match result {
            Ok(pair) => pair,
            Err(e) => {
                store_metadata_best_effort(
                    db,
                    ctx,
                    run_id,
                    OutputPointer::none(),
                    Some(doc! { "command": argv.to_vec(), "docker": { "buildLog": build_log.join("\n") } }),
                )
                .await;
                return Err(NodeError::ContainerRun(e));
            }
        };

        match engine_container::classify_exit(&name, exit_code) {
            Ok(outcome) => Ok((outcome, run_log)),
            Err(e) => {
                store_metadata_best_effort(
                    db,
                    ctx,
                    run_id,
                    OutputPointer::none(),
                    Some(doc! { "command": argv.to_vec(), "docker": { "buildLog": build_log.join("\n") } }),
                )
                .await;
                Err(NodeError::ContainerRun(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::descriptor::{ImageSpec, InputSpec, Provider};
    use engine_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct FixedRuntime {
        exit_code: i64,
        create_calls: AtomicUsize,
    }

    #[async_trait]
    impl ContainerRuntime for FixedRuntime {
        async fn build_image(&self, _: &Path, _: &str) -> Result<Vec<String>, engine_core::error::ContainerBuildError> {
            Ok(vec!["Step 1/1 : FROM scratch".to_string()])
        }
        async fn create_and_start(&self, _: ContainerSpec<'_>) -> Result<String, engine_core::error::ContainerRunError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok("fake-container-id".to_string())
        }
        async fn stream_logs_and_wait(
            &self,
            _: &str,
            _: &str,
        ) -> Result<(i64, String), engine_core::error::ContainerRunError> {
            Ok((self.exit_code, "fake container output\n".to_string()))
        }
        async fn wait(&self, _: &str, _: &str) -> Result<i64, engine_core::error::ContainerRunError> {
            Ok(self.exit_code)
        }
        async fn stop(&self, _: &str) {}
        async fn remove(&self, _: &str) {}
    }

    struct EchoParser;

    #[async_trait]
    impl ToolResultParser for EchoParser {
        async fn store_results(
            &self,
            db: &dyn DocumentStore,
            _run_id: &str,
            _output_dir: &Path,
        ) -> Result<OutputPointer, String> {
            let id = db
                .insert_one("files", doc! { "filename": "output.txt" })
                .await
                .map_err(|e| e.to_string())?;
            Ok(OutputPointer::new("files", id))
        }
    }

    fn interface() -> InterfaceDescriptor {
        InterfaceDescriptor {
            inputs: vec![InputSpec { name: "target".into(), mandatory: true }],
            command: vec!["run".into(), "{{target}}".into()],
            image: ImageSpec { context: ".".into(), tag: "skelet0wn/test".into() },
        }
    }

    fn mapping_with_static_target() -> MappingDescriptor {
        let mut mapping = MappingDescriptor::new();
        mapping.insert("target".into(), Provider::Static { value: serde_json::json!("10.0.0.1") });
        mapping
    }

    #[tokio::test]
    async fn successful_run_walks_every_phase_and_stores_metadata() {
        let runtime = Arc::new(FixedRuntime { exit_code: 0, create_calls: AtomicUsize::new(0) });
        let mut node = ToolNode::new(interface(), mapping_with_static_target(), EchoParser, runtime.clone());
        let output_root = tempdir().unwrap();
        let shared = tempdir().unwrap();
        node.prepare_environment(output_root.path(), shared.path(), "n0");

        let db = MemoryStore::new();
        node.run(&db, "run1").await.unwrap();

        assert!(matches!(node.state(), ToolState::ResultsStored));
        assert_eq!(runtime.create_calls.load(Ordering::SeqCst), 1);
        let steps = db.snapshot("steps");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].get_str("outputCollection").unwrap(), "files");

        let docker = steps[0].get_document("docker").unwrap();
        assert_eq!(docker.get_str("runLog").unwrap(), "fake container output\n");
        assert_eq!(docker.get_document("runStatus").unwrap().get_i64("StatusCode").unwrap(), 0);
    }

    #[tokio::test]
    async fn exit_137_is_treated_as_success() {
        let runtime = Arc::new(FixedRuntime { exit_code: 137, create_calls: AtomicUsize::new(0) });
        let mut node = ToolNode::new(interface(), mapping_with_static_target(), EchoParser, runtime);
        let output_root = tempdir().unwrap();
        let shared = tempdir().unwrap();
        node.prepare_environment(output_root.path(), shared.path(), "n0");

        let db = MemoryStore::new();
        node.run(&db, "run1").await.unwrap();
        assert!(matches!(node.state(), ToolState::ResultsStored));
    }

    #[tokio::test]
    async fn non_zero_non_137_exit_fails_and_still_stores_metadata() {
        let runtime = Arc::new(FixedRuntime { exit_code: 1, create_calls: AtomicUsize::new(0) });
        let mut node = ToolNode::new(interface(), mapping_with_static_target(), EchoParser, runtime);
        let output_root = tempdir().unwrap();
        let shared = tempdir().unwrap();
        node.prepare_environment(output_root.path(), shared.path(), "n0");

        let db = MemoryStore::new();
        let err = node.run(&db, "run1").await.unwrap_err();
        assert!(matches!(err, NodeError::ContainerRun(_)));
        let steps = db.snapshot("steps");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].get("outputCollection").unwrap(), &bson::Bson::Null);
    }

    #[tokio::test]
    async fn mandatory_missing_mapping_fails_before_any_container_call() {
        let runtime = Arc::new(FixedRuntime { exit_code: 0, create_calls: AtomicUsize::new(0) });
        let mut node = ToolNode::new(interface(), MappingDescriptor::new(), EchoParser, runtime.clone());
        let output_root = tempdir().unwrap();
        let shared = tempdir().unwrap();
        node.prepare_environment(output_root.path(), shared.path(), "n0");

        let db = MemoryStore::new();
        let err = node.run(&db, "run1").await.unwrap_err();
        assert!(matches!(err, NodeError::Mapping(_)));
        assert_eq!(runtime.create_calls.load(Ordering::SeqCst), 0);
        let steps = db.snapshot("steps");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].get("outputCollection").unwrap(), &bson::Bson::Null);
    }
}
