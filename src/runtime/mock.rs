//! In-memory [`ContainerRuntime`] for unit tests.
//!
//! No sockets, no daemon: containers are bookkeeping entries with a small
//! in-memory filesystem. Knobs cover the failure modes the harness has to
//! handle (failing builds, non-zero exits, slow exits, pre-seeded output
//! artifacts). Shipping the mock in `src/` keeps it usable from both unit
//! and integration tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{ContainerId, ContainerLogs, ContainerRuntime, ContainerSpec, ImageRef};
use crate::errors::{HarnessError, HarnessResult};

#[derive(Debug)]
struct MockContainer {
    spec: ContainerSpec,
    started: bool,
    removed: bool,
    files: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct MockState {
    build_calls: usize,
    create_calls: usize,
    next_id: usize,
    fail_build: Option<String>,
    exit_code: i64,
    exit_delay: Option<Duration>,
    logs: ContainerLogs,
    seeded_files: HashMap<String, Vec<u8>>,
    containers: HashMap<String, MockContainer>,
}

/// Shared-handle mock runtime; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next (and every) build fail with the given message.
    pub fn fail_builds(&self, message: impl Into<String>) {
        self.state.lock().unwrap().fail_build = Some(message.into());
    }

    /// Exit status every container reports from `wait_exit`.
    pub fn set_exit_code(&self, code: i64) {
        self.state.lock().unwrap().exit_code = code;
    }

    /// Delay applied before `wait_exit` returns, to simulate a hung or
    /// slow scenario container.
    pub fn set_exit_delay(&self, delay: Duration) {
        self.state.lock().unwrap().exit_delay = Some(delay);
    }

    /// Output streams reported for every container.
    pub fn set_logs(&self, stdout: impl Into<String>, stderr: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.logs = ContainerLogs {
            stdout: stdout.into(),
            stderr: stderr.into(),
        };
    }

    /// Pre-seed a file into the filesystem of every container created from
    /// now on, as if the container's entrypoint had written it.
    pub fn seed_file(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .seeded_files
            .insert(path.into(), content.into());
    }

    /// Number of image builds issued.
    pub fn build_calls(&self) -> usize {
        self.state.lock().unwrap().build_calls
    }

    /// Number of containers ever created.
    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    /// Containers created but not yet removed.
    pub fn live_containers(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.containers.values().filter(|c| !c.removed).count()
    }

    /// Contents of a file previously written into a container.
    pub fn file_contents(&self, id: &ContainerId, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(&id.0)
            .and_then(|container| container.files.get(path))
            .cloned()
    }

    /// Environment the named container was created with.
    pub fn container_env(&self, id: &ContainerId) -> Option<Vec<String>> {
        let state = self.state.lock().unwrap();
        state.containers.get(&id.0).map(|c| c.spec.env.clone())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn build_image(&self, _context: &Path, tag: &str) -> HarnessResult<ImageRef> {
        let mut state = self.state.lock().unwrap();
        state.build_calls += 1;
        if let Some(message) = &state.fail_build {
            return Err(HarnessError::Build(message.clone()));
        }
        Ok(ImageRef(format!("sha256:mock-{tag}")))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> HarnessResult<ContainerId> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        state.next_id += 1;
        let id = format!("mock-container-{}", state.next_id);
        let files = state.seeded_files.clone();
        state.containers.insert(
            id.clone(),
            MockContainer {
                spec: spec.clone(),
                started: false,
                removed: false,
                files,
            },
        );
        Ok(ContainerId(id))
    }

    async fn start_container(&self, id: &ContainerId) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(&id.0) {
            Some(container) => {
                container.started = true;
                Ok(())
            }
            None => Err(HarnessError::Runtime(format!("unknown container {id}"))),
        }
    }

    async fn write_file(&self, id: &ContainerId, path: &str, content: &[u8]) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(&id.0) {
            Some(container) => {
                container.files.insert(path.to_string(), content.to_vec());
                Ok(())
            }
            None => Err(HarnessError::Runtime(format!("unknown container {id}"))),
        }
    }

    async fn read_file(&self, id: &ContainerId, path: &str) -> HarnessResult<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(&id.0)
            .and_then(|container| container.files.get(path))
            .cloned()
            .ok_or_else(|| HarnessError::ArtifactMissing {
                path: path.to_string(),
            })
    }

    async fn wait_exit(&self, id: &ContainerId) -> HarnessResult<i64> {
        let (delay, code) = {
            let state = self.state.lock().unwrap();
            if !state.containers.contains_key(&id.0) {
                return Err(HarnessError::Runtime(format!("unknown container {id}")));
            }
            (state.exit_delay, state.exit_code)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(code)
    }

    async fn container_ip(&self, id: &ContainerId) -> HarnessResult<Option<String>> {
        let state = self.state.lock().unwrap();
        match state.containers.get(&id.0) {
            Some(container) if container.started => Ok(Some("172.17.0.2".to_string())),
            Some(_) => Ok(None),
            None => Err(HarnessError::Runtime(format!("unknown container {id}"))),
        }
    }

    async fn logs(&self, id: &ContainerId) -> HarnessResult<ContainerLogs> {
        let state = self.state.lock().unwrap();
        if !state.containers.contains_key(&id.0) {
            return Err(HarnessError::Runtime(format!("unknown container {id}")));
        }
        Ok(state.logs.clone())
    }

    async fn kill_container(&self, id: &ContainerId) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(&id.0) {
            Some(container) if !container.removed => {
                container.started = false;
                Ok(())
            }
            _ => Err(HarnessError::Runtime(format!("unknown container {id}"))),
        }
    }

    async fn remove_container(&self, id: &ContainerId) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(&id.0) {
            Some(container) if !container.removed => {
                container.removed = true;
                Ok(())
            }
            _ => Err(HarnessError::Runtime(format!("unknown container {id}"))),
        }
    }
}
