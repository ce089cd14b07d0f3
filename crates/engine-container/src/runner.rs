//! `ContainerRunner`: builds an image from a build context directory and runs
//! it with the two bind mounts the engine's container contract requires.
//! Grounded on `bahdotsh-wrkflw`'s executor-over-a-container-runtime shape
//! (one client, one `run` entry point, logs streamed while the container is
//! live) and on the `bollard`-using manifests in the retrieval pack
//! (`arminhammer-jackdaw`, `yabloky-komodo`) for the driver crate itself.

use std::path::Path;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::service::HostConfig;
use bollard::Docker;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{trace, warn};

use engine_core::error::{ContainerBuildError, ContainerRunError};

/// Exit code Docker reports when a container is killed by `SIGKILL` (the
/// signal `stop_container` escalates to once its grace period elapses).
/// Treated as an early stop rather than a failure, per the container
/// contract: a ToolNode that interrupts its own container should not see
/// that interruption surface as an error.
pub const EARLY_STOP_EXIT_CODE: i64 = 137;

/// Cap on the run log text folded into a `steps` document, so a chatty tool
/// can't grow a single record past a BSON document's size limit. Keeps the
/// tail of the output, where a failing tool's last lines usually are.
const RUN_LOG_BYTE_CAP: usize = 64 * 1024;

/// A container run's outcome: the exit status Docker reported and whether
/// it should be treated as an ordinary failure or an early stop.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: i64,
    pub early_stop: bool,
}

/// What to run: a rendered argv, the two mounts the contract names, and the
/// container's name (the node's hierarchical name, so `docker ps` output
/// reads the same as the engine's own step records).
pub struct ContainerSpec<'a> {
    pub name: &'a str,
    pub image_tag: &'a str,
    pub argv: Vec<String>,
    pub output_dir: &'a Path,
    pub shared_dir: &'a Path,
}

pub struct ContainerRunner {
    docker: Docker,
}

impl ContainerRunner {
    pub fn connect() -> Result<Self, ContainerRunError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerRunError(format!("connecting to docker daemon: {e}")))?;
        Ok(Self { docker })
    }

    /// Connect to `host` (a `unix://` or `tcp://` Docker daemon address) if
    /// given, falling back to the local default socket/npipe otherwise.
    /// `EngineConfig::docker_host` feeds this.
    pub fn connect_with_host(host: Option<&str>) -> Result<Self, ContainerRunError> {
        let docker = match host {
            Some(host) => Docker::connect_with_socket(host, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ContainerRunError(format!("connecting to docker daemon at {host}: {e}")))?,
            None => return Self::connect(),
        };
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Build the image at `context_dir` (which must contain a `Dockerfile`)
    /// and tag it `tag`. Returns the build log lines, forwarded by the
    /// caller at trace level.
    pub async fn build_image(
        &self,
        context_dir: &Path,
        tag: &str,
    ) -> Result<Vec<String>, ContainerBuildError> {
        let tarball = tar_directory(context_dir)
            .map_err(|e| ContainerBuildError(format!("packing build context {context_dir:?}: {e}")))?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(Bytes::from(tarball)));
        let mut log = Vec::new();
        while let Some(event) = stream.next().await {
            let info = event.map_err(|e| ContainerBuildError(format!("building {tag}: {e}")))?;
            if let Some(error) = info.error {
                return Err(ContainerBuildError(format!("building {tag}: {error}")));
            }
            if let Some(line) = info.stream {
                trace!(tag, "{}", line.trim_end());
                log.push(line);
            }
        }
        Ok(log)
    }

    /// Create a container per `spec` and start it, returning its id. Split
    /// out from [`Self::run_container`] so a caller that needs to race the
    /// wait against its own cancellation signal (a ToolNode, via
    /// `NodeContext::cancelled`) can interleave a `stop` between create and
    /// the final wait, the way `bone.py::interrupt` reaches for
    /// `self.docker_container.stop()` mid-run.
    pub async fn create_and_start(&self, spec: ContainerSpec<'_>) -> Result<String, ContainerRunError> {
        let binds = vec![
            format!("{}:/mnt/skelet0wn/", spec.output_dir.display()),
            format!("{}:/mnt/shared", spec.shared_dir.display()),
        ];

        let config = Config {
            image: Some(spec.image_tag.to_string()),
            cmd: Some(spec.argv.clone()),
            env: Some(vec!["PYTHONUNBUFFERED=1".to_string()]),
            host_config: Some(HostConfig {
                binds: Some(binds),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: spec.name.to_string(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| ContainerRunError(format!("creating container {}: {e}", spec.name)))?;

        self.docker
            .start_container::<String>(&created.id, None)
            .await
            .map_err(|e| ContainerRunError(format!("starting container {}: {e}", spec.name)))?;

        Ok(created.id)
    }

    /// Stream stdout/stderr of a running container at trace level until it
    /// exits, then wait for and return its exit code alongside the
    /// accumulated log text.
    pub async fn stream_logs_and_wait(
        &self,
        container_id: &str,
        label: &str,
    ) -> Result<(i64, String), ContainerRunError> {
        let logs_options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut logs = self.docker.logs(container_id, Some(logs_options));
        let mut run_log = String::new();
        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(output) => {
                    let line = output.to_string();
                    trace!(container = label, "{}", line.trim_end());
                    run_log.push_str(&line);
                }
                Err(e) => {
                    warn!(container = label, error = %e, "log stream ended early");
                    break;
                }
            }
        }
        let exit_code = self.wait(container_id, label).await?;
        if run_log.len() > RUN_LOG_BYTE_CAP {
            let tail_start = run_log.len() - RUN_LOG_BYTE_CAP;
            let tail_start = run_log.char_indices().map(|(i, _)| i).find(|&i| i >= tail_start).unwrap_or(run_log.len());
            run_log = format!("...[truncated]...{}", &run_log[tail_start..]);
        }
        Ok((exit_code, run_log))
    }

    /// Block until `container_id` stops running and return its exit code,
    /// without touching its logs (used after a `stop()` has already been
    /// issued, when logs were already drained by the first wait attempt).
    pub async fn wait(&self, container_id: &str, label: &str) -> Result<i64, ContainerRunError> {
        let mut wait = self.docker.wait_container(
            container_id,
            Some(WaitContainerOptions { condition: "not-running" }),
        );
        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(e)) => Err(ContainerRunError(format!("waiting on {label}: {e}"))),
            None => Ok(0),
        }
    }

    /// Create, start, stream, and wait for a container in one call. Exit
    /// code 137 is reported as an early stop rather than surfaced as an
    /// error; any other non-zero exit is a [`ContainerRunError`]. Used by
    /// callers that don't need to interleave an external cancellation
    /// signal; `engine-tool`'s `ToolNode` instead drives
    /// `create_and_start`/`stream_logs_and_wait`/`stop` directly.
    pub async fn run_container(&self, spec: ContainerSpec<'_>) -> Result<RunOutcome, ContainerRunError> {
        let name = spec.name.to_string();
        let container_id = self.create_and_start(spec).await?;
        let (exit_code, _run_log) = self.stream_logs_and_wait(&container_id, &name).await?;
        self.remove(&container_id).await;
        classify_exit(&name, exit_code)
    }

    /// Send a termination signal to a still-running container. Used by a
    /// ToolNode's `interrupt()` to stop work in progress; failures are
    /// logged, not propagated, since interruption itself must not fail.
    pub async fn stop(&self, container_id: &str) {
        let options = StopContainerOptions { t: 5 };
        if let Err(e) = self.docker.stop_container(container_id, Some(options)).await {
            warn!(container_id, error = %e, "failed to stop container");
        }
    }

    pub async fn remove(&self, container_id: &str) {
        let options = RemoveContainerOptions { force: true, ..Default::default() };
        if let Err(e) = self.docker.remove_container(container_id, Some(options)).await {
            warn!(container_id, error = %e, "failed to remove container");
        }
    }
}

/// Object-safe view of [`ContainerRunner`]'s I/O surface, the seam a Tool
/// Node drives its state machine through. Lets `engine-tool`'s tests
/// exercise the state machine with a fake runtime instead of a live Docker
/// daemon.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<Vec<String>, ContainerBuildError>;
    async fn create_and_start(&self, spec: ContainerSpec<'_>) -> Result<String, ContainerRunError>;
    async fn stream_logs_and_wait(&self, container_id: &str, label: &str) -> Result<(i64, String), ContainerRunError>;
    async fn wait(&self, container_id: &str, label: &str) -> Result<i64, ContainerRunError>;
    async fn stop(&self, container_id: &str);
    async fn remove(&self, container_id: &str);
}

#[async_trait]
impl ContainerRuntime for ContainerRunner {
    async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<Vec<String>, ContainerBuildError> {
        ContainerRunner::build_image(self, context_dir, tag).await
    }

    async fn create_and_start(&self, spec: ContainerSpec<'_>) -> Result<String, ContainerRunError> {
        ContainerRunner::create_and_start(self, spec).await
    }

    async fn stream_logs_and_wait(&self, container_id: &str, label: &str) -> Result<(i64, String), ContainerRunError> {
        ContainerRunner::stream_logs_and_wait(self, container_id, label).await
    }

    async fn wait(&self, container_id: &str, label: &str) -> Result<i64, ContainerRunError> {
        ContainerRunner::wait(self, container_id, label).await
    }

    async fn stop(&self, container_id: &str) {
        ContainerRunner::stop(self, container_id).await
    }

    async fn remove(&self, container_id: &str) {
        ContainerRunner::remove(self, container_id).await
    }
}

/// Classify a raw exit code per the container contract: 0 succeeds, 137 is
/// an accepted early stop, anything else is a run error.
pub fn classify_exit(label: &str, exit_code: i64) -> Result<RunOutcome, ContainerRunError> {
    if exit_code == 0 {
        Ok(RunOutcome { exit_code, early_stop: false })
    } else if exit_code == EARLY_STOP_EXIT_CODE {
        warn!(container = label, "Early stop");
        Ok(RunOutcome { exit_code, early_stop: true })
    } else {
        Err(ContainerRunError(format!("{label} exited with status {exit_code}")))
    }
}

/// Pack a build-context directory into an in-memory tar archive, the format
/// `Docker::build_image` expects as its body.
fn tar_directory(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", dir)?;
    builder.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_a_directory_into_a_readable_tar() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), b"FROM scratch\n").unwrap();
        let bytes = tar_directory(dir.path()).unwrap();
        let mut archive = tar::Archive::new(bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("Dockerfile")));
    }

    #[tokio::test]
    #[ignore]
    async fn builds_and_runs_a_real_container() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Dockerfile"),
            b"FROM alpine:3\nCMD [\"echo\", \"hi\"]\n",
        )
        .unwrap();
        let runner = ContainerRunner::connect().unwrap();
        runner.build_image(dir.path(), "engine-container-test:latest").await.unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let shared_dir = tempfile::tempdir().unwrap();
        let outcome = runner
            .run_container(ContainerSpec {
                name: "engine-container-test-run",
                image_tag: "engine-container-test:latest",
                argv: vec![],
                output_dir: output_dir.path(),
                shared_dir: shared_dir.path(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 0);
    }
}
