//! The service fixture: one long-lived backing-service container shared by
//! every scenario in a run.
//!
//! Lifecycle is `Idle → Running → Ready → Terminated`. The image is built
//! lazily and memoized, `start` is idempotent, and the connection URL is
//! only observable after readiness has been confirmed. The fixture's
//! container is registered with the cleanup registry before it is started,
//! so even a failure during the readiness wait leaves a handle to tear
//! down.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, HarnessResult};
use crate::probe::{http_probe, wait_until_ready};
use crate::registry::CleanupRegistry;
use crate::runtime::{ContainerId, ContainerRuntime, ContainerSpec, ImageRef};

/// Readiness probe invoked with the fixture's base URL.
///
/// Synchronous by design: the concrete probe is one short blocking HTTP GET
/// and runs on the blocking thread pool.
pub type ProbeFn = Arc<dyn Fn(&str) -> HarnessResult<bool> + Send + Sync>;

enum FixtureState {
    Idle,
    Running {
        id: ContainerId,
        url: Option<String>,
    },
    Terminated,
}

/// Owns the lifecycle of exactly one backing-service container.
pub struct ServiceFixture {
    runtime: Arc<dyn ContainerRuntime>,
    config: HarnessConfig,
    image: OnceCell<ImageRef>,
    state: Mutex<FixtureState>,
    probe: ProbeFn,
}

impl ServiceFixture {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: HarnessConfig) -> Self {
        let token = config.bootstrap_token.clone();
        let path = config.readiness_path();
        let probe: ProbeFn =
            Arc::new(move |base_url: &str| http_probe(&format!("{base_url}/{path}"), &token));

        Self {
            runtime,
            config,
            image: OnceCell::new(),
            state: Mutex::new(FixtureState::Idle),
            probe,
        }
    }

    /// Replace the readiness probe. Used by tests to avoid real HTTP.
    pub fn with_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn(&str) -> HarnessResult<bool> + Send + Sync + 'static,
    {
        self.probe = Arc::new(probe);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Build the fixture image from the configured context. Idempotent via
    /// memoization: only the first call issues a build.
    pub async fn image(&self) -> HarnessResult<ImageRef> {
        let image = self
            .image
            .get_or_try_init(|| async {
                self.runtime
                    .build_image(&self.config.build_context, &self.config.image_tag)
                    .await
            })
            .await?;
        Ok(image.clone())
    }

    /// Create and start the fixture container if none exists yet, then
    /// block until the service answers its readiness endpoint.
    ///
    /// Calling `start` again performs no new container creation; it
    /// re-confirms readiness and returns.
    pub async fn start(&self, registry: &CleanupRegistry) -> HarnessResult<()> {
        let mut state = self.state.lock().await;

        let id = match &*state {
            FixtureState::Terminated => {
                return Err(HarnessError::NotReady(
                    "fixture was already cleaned up".to_string(),
                ));
            }
            FixtureState::Running { id, .. } => id.clone(),
            FixtureState::Idle => {
                let image = self.image().await?;
                let spec = ContainerSpec {
                    name: format!("vault-fixture-{}", short_id()),
                    image,
                    command: self.config.fixture_command.clone(),
                    env: Vec::new(),
                };
                let id = self.runtime.create_container(&spec).await?;
                // Register before starting: a failure from here on must
                // still end in teardown.
                registry.register(id.clone());
                self.runtime.start_container(&id).await?;
                info!(container = %id, "service fixture started, waiting for readiness");
                *state = FixtureState::Running {
                    id: id.clone(),
                    url: None,
                };
                id
            }
        };

        let ready_url = self.await_readiness(&id).await?;
        *state = FixtureState::Running {
            id,
            url: Some(ready_url),
        };
        Ok(())
    }

    /// HTTP base URL of the running service.
    ///
    /// Only available once `start` has confirmed readiness.
    pub async fn url(&self) -> HarnessResult<String> {
        match &*self.state.lock().await {
            FixtureState::Running { url: Some(url), .. } => Ok(url.clone()),
            _ => Err(HarnessError::NotReady(
                "fixture URL requested before readiness was confirmed".to_string(),
            )),
        }
    }

    /// Tear down the fixture container. Idempotent: a fixture that never
    /// started, or was already cleaned up, is a no-op; teardown errors are
    /// logged and swallowed.
    pub async fn cleanup(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, FixtureState::Terminated);

        if let FixtureState::Running { id, .. } = previous {
            info!(container = %id, "cleaning up service fixture");
            if let Err(err) = self.runtime.kill_container(&id).await {
                debug!(container = %id, "kill during fixture cleanup: {err}");
            } else if let Err(err) = self.runtime.wait_exit(&id).await {
                debug!(container = %id, "wait during fixture cleanup: {err}");
            }
            if let Err(err) = self.runtime.remove_container(&id).await {
                debug!(container = %id, "remove during fixture cleanup: {err}");
            }
        }
    }

    /// Poll the readiness endpoint until it answers, resolving the
    /// container's address on every attempt (it may not be assigned yet).
    async fn await_readiness(&self, id: &ContainerId) -> HarnessResult<String> {
        let resolved: Arc<StdMutex<Option<String>>> = Arc::new(StdMutex::new(None));

        let runtime = self.runtime.clone();
        let probe = self.probe.clone();
        let port = self.config.service_port;
        let id = id.clone();
        let slot = resolved.clone();

        wait_until_ready(
            "service fixture readiness",
            self.config.probe_interval,
            self.config.probe_timeout,
            move || {
                let runtime = runtime.clone();
                let probe = probe.clone();
                let id = id.clone();
                let slot = slot.clone();
                async move {
                    let Some(ip) = runtime.container_ip(&id).await? else {
                        return Ok(false);
                    };
                    let base_url = format!("http://{ip}:{port}");
                    let probe_url = base_url.clone();
                    let ready = tokio::task::spawn_blocking(move || probe(&probe_url))
                        .await
                        .map_err(|err| {
                            HarnessError::Runtime(format!("readiness probe task failed: {err}"))
                        })??;
                    if ready {
                        *slot.lock().unwrap() = Some(base_url);
                    }
                    Ok(ready)
                }
            },
        )
        .await?;

        let url = resolved.lock().unwrap().take();
        url.ok_or_else(|| {
            HarnessError::Runtime("readiness confirmed but no address resolved".to_string())
        })
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
