//! Cleanup registry: the record of every container created during a run.
//!
//! Containers are registered before they are started, so a failure anywhere
//! between creation and assertion still leaves a registered handle to tear
//! down. The registry is append-only during the run and drained exactly
//! once; it uses interior mutability so a future parallelized harness can
//! extend it without redesign.
//!
//! Teardown is best-effort by construction: a container that was already
//! removed, or whose runtime connection was lost, must not prevent cleanup
//! of the remaining containers. Cleanup errors are logged, never raised.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::runtime::{ContainerId, ContainerRuntime};

/// Process-wide record of containers awaiting teardown.
pub struct CleanupRegistry {
    runtime: Arc<dyn ContainerRuntime>,
    containers: Mutex<Vec<ContainerId>>,
}

impl CleanupRegistry {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            containers: Mutex::new(Vec::new()),
        }
    }

    /// Append a container handle. Never removes; drain handles removal.
    pub fn register(&self, id: ContainerId) {
        debug!(container = %id, "registered for cleanup");
        self.containers.lock().unwrap().push(id);
    }

    /// Number of containers registered so far.
    pub fn len(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.lock().unwrap().is_empty()
    }

    /// Tear down every registered container: kill, wait, remove, in
    /// registration order, continuing past individual failures.
    pub async fn drain_all(&self) {
        let drained: Vec<ContainerId> = self.containers.lock().unwrap().drain(..).collect();
        if drained.is_empty() {
            return;
        }
        debug!(count = drained.len(), "draining cleanup registry");

        for id in drained {
            teardown_one(self.runtime.as_ref(), &id).await;
        }
    }
}

async fn teardown_one(runtime: &dyn ContainerRuntime, id: &ContainerId) {
    // Kill may legitimately fail on an already-exited container.
    if let Err(err) = runtime.kill_container(id).await {
        debug!(container = %id, "kill during cleanup: {err}");
    } else if let Err(err) = runtime.wait_exit(id).await {
        debug!(container = %id, "wait during cleanup: {err}");
    }
    if let Err(err) = runtime.remove_container(id).await {
        warn!(container = %id, "failed to remove container: {err}");
    }
}

impl Drop for CleanupRegistry {
    fn drop(&mut self) {
        let leftovers: Vec<ContainerId> = self.containers.lock().unwrap().drain(..).collect();
        if leftovers.is_empty() {
            return;
        }

        warn!(
            count = leftovers.len(),
            "cleanup registry dropped with live containers; drain_all was not awaited"
        );

        // Last-resort reap. Drop cannot block on async work, so this only
        // helps when a runtime is still alive; the explicit drain_all call
        // remains the guaranteed teardown path.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let runtime = self.runtime.clone();
            handle.spawn(async move {
                for id in leftovers {
                    teardown_one(runtime.as_ref(), &id).await;
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ContainerRuntime, ContainerSpec, ImageRef, MockRuntime};

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: ImageRef("sha256:mock".to_string()),
            command: vec!["true".to_string()],
            env: Vec::new(),
        }
    }

    #[tokio::test]
    async fn drain_removes_every_registered_container() {
        let mock = MockRuntime::new();
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());
        let registry = CleanupRegistry::new(runtime.clone());

        for i in 0..3 {
            let id = runtime.create_container(&spec(&format!("c{i}"))).await.unwrap();
            registry.register(id);
        }
        assert_eq!(registry.len(), 3);

        registry.drain_all().await;
        assert_eq!(mock.live_containers(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn drain_continues_past_unknown_containers() {
        let mock = MockRuntime::new();
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());
        let registry = CleanupRegistry::new(runtime.clone());

        let real = runtime.create_container(&spec("real")).await.unwrap();
        registry.register(ContainerId("vanished".to_string()));
        registry.register(real);

        registry.drain_all().await;
        assert_eq!(mock.live_containers(), 0);
    }

    #[tokio::test]
    async fn drain_twice_is_a_noop() {
        let mock = MockRuntime::new();
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());
        let registry = CleanupRegistry::new(runtime.clone());

        let id = runtime.create_container(&spec("only")).await.unwrap();
        registry.register(id);

        registry.drain_all().await;
        registry.drain_all().await;
        assert_eq!(mock.live_containers(), 0);
    }
}
