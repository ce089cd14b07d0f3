//! Support code shared by the scenario binaries under `src/bin/`: a scripted
//! [`ContainerRuntime`] that fakes Docker so every scenario runs end to end
//! without a live daemon or database.

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use engine_container::{classify_exit, ContainerRuntime, ContainerSpec};
use engine_core::error::{ContainerBuildError, ContainerRunError};
use futures_util::future::pending;

/// What a scripted container does when it "runs": optionally write a file
/// into its output directory, then report an exit code. A container whose
/// script is `blocks_until_stopped` never reports on its own; its exit code
/// is only observed once [`ContainerRuntime::stop`] has been called,
/// simulating a Tool Node still running when a sibling `Parallel` slot
/// finishes.
pub struct Script {
    pub output_file: Option<(&'static str, &'static str)>,
    pub exit_code: i64,
    pub blocks_until_stopped: bool,
}

impl Script {
    pub fn ok_with_output(filename: &'static str, contents: &'static str) -> Self {
        Self { output_file: Some((filename, contents)), exit_code: 0, blocks_until_stopped: false }
    }

    pub fn failing() -> Self {
        Self { output_file: None, exit_code: 1, blocks_until_stopped: false }
    }

    pub fn blocks_forever(filename: &'static str, contents: &'static str) -> Self {
        Self {
            output_file: Some((filename, contents)),
            exit_code: engine_container::EARLY_STOP_EXIT_CODE,
            blocks_until_stopped: true,
        }
    }
}

/// A `ContainerRuntime` driven by a table of [`Script`]s keyed by container
/// name, standing in for `bollard`/a real daemon in every demo binary.
#[derive(Default)]
pub struct ScriptedRuntime {
    scripts: DashMap<String, Script>,
    stopped: DashMap<String, ()>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, container_name: impl Into<String>, script: Script) -> Self {
        self.scripts.insert(container_name.into(), script);
        self
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn build_image(&self, _context_dir: &Path, _tag: &str) -> Result<Vec<String>, ContainerBuildError> {
        Ok(vec!["Step 1/1 : FROM scratch".to_string()])
    }

    async fn create_and_start(&self, spec: ContainerSpec<'_>) -> Result<String, ContainerRunError> {
        if let Some(entry) = self.scripts.get(spec.name) {
            if let Some((filename, contents)) = entry.output_file {
                std::fs::write(spec.output_dir.join(filename), contents)
                    .map_err(|e| ContainerRunError(format!("writing scripted output for {}: {e}", spec.name)))?;
            }
        }
        Ok(spec.name.to_string())
    }

    async fn stream_logs_and_wait(&self, container_id: &str, _label: &str) -> Result<(i64, String), ContainerRunError> {
        let blocks = self.scripts.get(container_id).map(|s| s.blocks_until_stopped).unwrap_or(false);
        if blocks {
            pending::<()>().await;
            unreachable!("a scripted container that blocks forever never resolves this branch");
        }
        let exit_code = self.scripts.get(container_id).map(|s| s.exit_code).unwrap_or(0);
        Ok((exit_code, format!("scripted output for {container_id}\n")))
    }

    async fn wait(&self, container_id: &str, _label: &str) -> Result<i64, ContainerRunError> {
        Ok(self.scripts.get(container_id).map(|s| s.exit_code).unwrap_or(0))
    }

    async fn stop(&self, container_id: &str) {
        self.stopped.insert(container_id.to_string(), ());
    }

    async fn remove(&self, _container_id: &str) {}
}

/// Helper a scenario binary calls after reading a container's raw exit code
/// back out of `steps`, mirroring how `ToolNode` itself classifies it.
pub fn describe_exit(label: &str, exit_code: i64) -> String {
    match classify_exit(label, exit_code) {
        Ok(outcome) => format!("exit {} ({})", outcome.exit_code, if outcome.early_stop { "early stop" } else { "success" }),
        Err(e) => format!("failure: {e}"),
    }
}
