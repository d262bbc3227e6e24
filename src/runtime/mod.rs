//! Container runtime client seam.
//!
//! Everything the harness needs from a container runtime sits behind the
//! [`ContainerRuntime`] trait: build an image from a context directory,
//! create/start/kill/wait/remove containers, copy files in and out, look up
//! a container's network address and stream back its logs. The production
//! implementation is [`DockerRuntime`] (bollard); [`MockRuntime`] backs the
//! unit tests.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{HarnessError, HarnessResult};

pub mod docker;
pub mod mock;

pub use docker::DockerRuntime;
pub use mock::MockRuntime;

/// Opaque identifier of a built container image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef(pub String);

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a created container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to create a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: ImageRef,
    pub command: Vec<String>,
    pub env: Vec<String>,
}

/// Captured output streams of a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerLogs {
    pub stdout: String,
    pub stderr: String,
}

/// Async client for the container runtime.
///
/// Implementations must be safe to share across the fixture, the scenario
/// runner and the cleanup registry (`Arc<dyn ContainerRuntime>`).
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build an image from `context` (a directory containing a Dockerfile)
    /// and tag it `tag`.
    async fn build_image(&self, context: &Path, tag: &str) -> HarnessResult<ImageRef>;

    /// Create (but do not start) a container.
    async fn create_container(&self, spec: &ContainerSpec) -> HarnessResult<ContainerId>;

    /// Start a previously created container.
    async fn start_container(&self, id: &ContainerId) -> HarnessResult<()>;

    /// Write `content` to `path` inside the container's filesystem.
    async fn write_file(&self, id: &ContainerId, path: &str, content: &[u8]) -> HarnessResult<()>;

    /// Read the file at `path` out of the container's filesystem.
    async fn read_file(&self, id: &ContainerId, path: &str) -> HarnessResult<Vec<u8>>;

    /// Block until the container exits; returns its exit status code.
    async fn wait_exit(&self, id: &ContainerId) -> HarnessResult<i64>;

    /// The container's assigned network address, if it has one yet.
    async fn container_ip(&self, id: &ContainerId) -> HarnessResult<Option<String>>;

    /// Captured stdout/stderr of the container so far.
    async fn logs(&self, id: &ContainerId) -> HarnessResult<ContainerLogs>;

    /// Kill the container. May fail if it already stopped; callers doing
    /// teardown are expected to tolerate that.
    async fn kill_container(&self, id: &ContainerId) -> HarnessResult<()>;

    /// Remove the container.
    async fn remove_container(&self, id: &ContainerId) -> HarnessResult<()>;
}

/// Pack a whole directory into an uncompressed tar archive (the format the
/// Docker build endpoint expects for its context).
pub(crate) fn tar_directory(dir: &Path) -> HarnessResult<Bytes> {
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_dir_all(".", dir)
        .map_err(|err| HarnessError::Build(format!("packing context {}: {err}", dir.display())))?;
    let archive = builder
        .into_inner()
        .map_err(|err| HarnessError::Build(format!("finalizing context archive: {err}")))?;
    Ok(Bytes::from(archive))
}

/// Pack a single file (at an absolute in-container path) into a tar archive
/// rooted at `/`, as the Docker upload endpoint expects.
pub(crate) fn tar_single_file(path: &str, content: &[u8]) -> HarnessResult<Bytes> {
    let relative = path.trim_start_matches('/');
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, relative, content)?;
    let archive = builder.into_inner()?;
    Ok(Bytes::from(archive))
}

/// Extract the first regular file from a tar archive (the Docker download
/// endpoint wraps the requested file in one).
pub(crate) fn untar_single_file(archive: &[u8], path: &str) -> HarnessResult<Vec<u8>> {
    use std::io::Read;

    let mut tar = tar::Archive::new(archive);
    for entry in tar.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_file() {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(content);
        }
    }
    Err(HarnessError::ArtifactMissing {
        path: path.to_string(),
    })
}
