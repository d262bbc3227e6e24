//! Harness configuration.
//!
//! All knobs have defaults matching the disposable test environment this
//! harness is built for; each can be overridden through a
//! `VAULT_HARNESS_*` environment variable. Durations accept humantime
//! syntax (`30s`, `2m`).
//!
//! The bootstrap token and readiness role are fixed, well-known test
//! credentials. They exist only so a freshly provisioned dev server can be
//! probed; never reuse this pattern where the credential is secret.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{HarnessError, HarnessResult};

/// Default service port of the backing secrets server.
pub const DEFAULT_SERVICE_PORT: u16 = 8200;

/// Well-known bootstrap token provisioned by the dev server.
pub const DEFAULT_BOOTSTRAP_TOKEN: &str = "root-token";

/// Token role whose existence signals that provisioning has finished.
pub const DEFAULT_READINESS_ROLE: &str = "cluster1-etcd";

/// Path inside scenario containers for the `VAULT_ADDR` environment file.
pub const ENVIRONMENT_FILE_PATH: &str = "/etc/vault/environment";

/// Path inside scenario containers for the bootstrap token file.
pub const TOKEN_FILE_PATH: &str = "/etc/vault/token";

/// Configuration for the test harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Directory used as the image build context (must contain a Dockerfile).
    pub build_context: PathBuf,
    /// Tag applied to the built fixture image.
    pub image_tag: String,
    /// Command the fixture container runs.
    pub fixture_command: Vec<String>,
    /// Port the backing service listens on inside the container.
    pub service_port: u16,
    /// Bootstrap token used by the readiness probe and injected into
    /// scenario containers.
    pub bootstrap_token: String,
    /// Token role queried by the readiness probe.
    pub readiness_role: String,
    /// Sleep between readiness probes.
    pub probe_interval: Duration,
    /// Upper bound on the whole readiness wait.
    pub probe_timeout: Duration,
    /// Upper bound on a scenario container's run time.
    pub scenario_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            build_context: PathBuf::from("."),
            image_tag: "vault-harness-fixture:latest".to_string(),
            fixture_command: vec!["dev-server".to_string()],
            service_port: DEFAULT_SERVICE_PORT,
            bootstrap_token: DEFAULT_BOOTSTRAP_TOKEN.to_string(),
            readiness_role: DEFAULT_READINESS_ROLE.to_string(),
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(120),
            scenario_timeout: Duration::from_secs(120),
        }
    }
}

impl HarnessConfig {
    /// Build a configuration from defaults plus `VAULT_HARNESS_*`
    /// environment overrides.
    pub fn from_env() -> HarnessResult<Self> {
        let mut config = Self::default();

        if let Some(value) = env_var("VAULT_HARNESS_BUILD_CONTEXT") {
            config.build_context = PathBuf::from(value);
        }
        if let Some(value) = env_var("VAULT_HARNESS_IMAGE_TAG") {
            config.image_tag = value;
        }
        if let Some(value) = env_var("VAULT_HARNESS_SERVICE_PORT") {
            config.service_port = value.parse().map_err(|_| {
                HarnessError::Runtime(format!("invalid VAULT_HARNESS_SERVICE_PORT: {value}"))
            })?;
        }
        if let Some(value) = env_var("VAULT_HARNESS_BOOTSTRAP_TOKEN") {
            config.bootstrap_token = value;
        }
        if let Some(value) = env_var("VAULT_HARNESS_READINESS_ROLE") {
            config.readiness_role = value;
        }
        if let Some(value) = env_var("VAULT_HARNESS_PROBE_INTERVAL") {
            config.probe_interval = parse_duration("VAULT_HARNESS_PROBE_INTERVAL", &value)?;
        }
        if let Some(value) = env_var("VAULT_HARNESS_PROBE_TIMEOUT") {
            config.probe_timeout = parse_duration("VAULT_HARNESS_PROBE_TIMEOUT", &value)?;
        }
        if let Some(value) = env_var("VAULT_HARNESS_SCENARIO_TIMEOUT") {
            config.scenario_timeout = parse_duration("VAULT_HARNESS_SCENARIO_TIMEOUT", &value)?;
        }

        Ok(config)
    }

    /// HTTP path of the readiness endpoint, relative to the fixture URL.
    pub fn readiness_path(&self) -> String {
        format!("v1/auth/token/roles/{}", self.readiness_role)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_duration(key: &str, value: &str) -> HarnessResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|err| HarnessError::Runtime(format!("invalid {key} '{value}': {err}")))
}
