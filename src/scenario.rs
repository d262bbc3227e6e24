//! Scenario containers: short-lived, disposable containers exercising one
//! test case against the service fixture.
//!
//! A [`Scenario`] describes the container (command, environment, extra
//! files, expected artifacts); the [`ScenarioRunner`] wires it to the
//! fixture, enforces a bounded exit wait and collects the artifacts. A
//! non-zero exit fails with the container's captured stdout/stderr attached,
//! since no stack trace crosses the container boundary.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ENVIRONMENT_FILE_PATH, TOKEN_FILE_PATH};
use crate::errors::{HarnessError, HarnessResult};
use crate::fixture::ServiceFixture;
use crate::registry::CleanupRegistry;
use crate::runtime::{ContainerRuntime, ContainerSpec};

/// Description of one scenario container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    /// Extra files injected before start (container path → content).
    pub files: Vec<(String, String)>,
    /// Files retrieved from the container after a successful exit.
    pub artifacts: Vec<String>,
}

impl Scenario {
    /// Build a scenario with the builder-style helpers below.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: Vec::new(),
            env: Vec::new(),
            files: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    /// The `cert` operation of the helper binary: request a certificate for
    /// `common_name` under `role`, writing `<prefix>.pem`,
    /// `<prefix>-key.pem` and `<prefix>-ca.pem`.
    pub fn cert(prefix: &str, common_name: &str, role: &str) -> Self {
        Self::new("cert")
            .arg("cert")
            .arg(prefix)
            .env("VAULT_CERT_CN", common_name)
            .env("VAULT_CERT_ROLE", role)
            .artifact(format!("{prefix}.pem"))
            .artifact(format!("{prefix}-key.pem"))
            .artifact(format!("{prefix}-ca.pem"))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(format!("{}={}", key.into(), value.into()));
        self
    }

    pub fn file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }

    pub fn artifact(mut self, path: impl Into<String>) -> Self {
        self.artifacts.push(path.into());
        self
    }
}

/// Result of a completed scenario: exit status plus retrieved artifacts.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: String,
    pub exit_code: i64,
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl ScenarioOutcome {
    /// Raw bytes of a retrieved artifact.
    pub fn artifact(&self, path: &str) -> HarnessResult<&[u8]> {
        self.artifacts
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| HarnessError::ArtifactMissing {
                path: path.to_string(),
            })
    }

    /// A retrieved artifact decoded as UTF-8 (PEM files are text).
    pub fn artifact_utf8(&self, path: &str) -> HarnessResult<String> {
        let bytes = self.artifact(path)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| HarnessError::ArtifactMissing {
            path: format!("{path} (not valid UTF-8)"),
        })
    }

    /// JSON index of the outcome, for debugging artifacts of failed runs.
    pub fn manifest(&self) -> serde_json::Value {
        serde_json::json!({
            "scenario": self.name,
            "exit_code": self.exit_code,
            "collected_at": chrono::Utc::now().to_rfc3339(),
            "artifacts": self.artifacts.iter()
                .map(|(path, bytes)| serde_json::json!({
                    "path": path,
                    "size_bytes": bytes.len(),
                }))
                .collect::<Vec<_>>(),
        })
    }
}

/// Runs scenarios against a started fixture, one at a time.
pub struct ScenarioRunner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ScenarioRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Execute one scenario end to end: create a fresh container from the
    /// fixture's image, register it, inject the environment and token
    /// files, start it, wait (bounded) for exit and collect artifacts.
    pub async fn run(
        &self,
        fixture: &ServiceFixture,
        registry: &CleanupRegistry,
        scenario: &Scenario,
    ) -> HarnessResult<ScenarioOutcome> {
        let url = fixture.url().await?;
        let image = fixture.image().await?;
        let config = fixture.config();

        let spec = ContainerSpec {
            name: format!("vault-scenario-{}-{}", scenario.name, short_id()),
            image,
            command: scenario.command.clone(),
            env: scenario.env.clone(),
        };

        let id = self.runtime.create_container(&spec).await?;
        // Register before start so a failure below still ends in teardown.
        registry.register(id.clone());

        self.runtime
            .write_file(&id, ENVIRONMENT_FILE_PATH, format!("VAULT_ADDR={url}\n").as_bytes())
            .await?;
        self.runtime
            .write_file(&id, TOKEN_FILE_PATH, config.bootstrap_token.as_bytes())
            .await?;
        for (path, content) in &scenario.files {
            self.runtime
                .write_file(&id, path, content.as_bytes())
                .await?;
        }

        info!(scenario = %scenario.name, container = %id, "starting scenario container");
        self.runtime.start_container(&id).await?;

        let exit_code = match tokio::time::timeout(
            config.scenario_timeout,
            self.runtime.wait_exit(&id),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(HarnessError::HungScenario {
                    name: scenario.name.clone(),
                    waited: config.scenario_timeout,
                });
            }
        };

        if exit_code != 0 {
            let logs = self.runtime.logs(&id).await.unwrap_or_default();
            return Err(HarnessError::ScenarioExecution {
                name: scenario.name.clone(),
                exit_code,
                stdout: logs.stdout,
                stderr: logs.stderr,
            });
        }

        let mut artifacts = BTreeMap::new();
        for path in &scenario.artifacts {
            let content = self.runtime.read_file(&id, path).await.map_err(|err| {
                debug!(scenario = %scenario.name, %path, "artifact retrieval failed: {err}");
                HarnessError::ArtifactMissing { path: path.clone() }
            })?;
            artifacts.insert(path.clone(), content);
        }

        debug!(scenario = %scenario.name, exit_code, artifacts = artifacts.len(), "scenario completed");
        Ok(ScenarioOutcome {
            name: scenario.name.clone(),
            exit_code,
            artifacts,
        })
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
