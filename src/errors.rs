//! Error types for the container test harness.
//!
//! Error kinds map one-to-one onto the failure modes of a harness run:
//! fatal fixture errors (`Build`, `Timeout`), per-scenario errors
//! (`HungScenario`, `ScenarioExecution`, `ArtifactMissing`, `Verification`)
//! and transport-level sources (`Docker`, `Http`, `Io`).

use std::time::Duration;

/// Error type for harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Image build failed. Fatal: aborts the run.
    #[error("image build failed: {0}")]
    Build(String),

    /// Readiness was not achieved in time. Fatal for the fixture.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    /// A scenario container did not exit within the configured bound.
    #[error("scenario '{name}' did not exit within {waited:?}")]
    HungScenario { name: String, waited: Duration },

    /// A scenario container exited non-zero. Carries the captured output
    /// streams because no stack trace crosses the container boundary.
    #[error(
        "scenario '{name}' exited with status {exit_code}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}"
    )]
    ScenarioExecution {
        name: String,
        exit_code: i64,
        stdout: String,
        stderr: String,
    },

    /// An expected output file was absent or unreadable.
    #[error("expected artifact missing: {path}")]
    ArtifactMissing { path: String },

    /// A certificate/key/CA check failed; `check` names the specific check.
    #[error("certificate verification failed: {check}")]
    Verification { check: String },

    /// The fixture was used out of order (e.g. `url()` before readiness).
    #[error("fixture not ready: {0}")]
    NotReady(String),

    /// Harness-level runtime misuse or a mock/runtime bookkeeping failure.
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// Error surfaced by the Docker API.
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Transport failure from the readiness probe.
    #[error("readiness probe error: {0}")]
    Http(#[from] ureq::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

impl HarnessError {
    /// True for errors the readiness prober treats as "service still
    /// booting": the port is not listening yet, so connection failures are
    /// an expected transient state. Everything else (bad URL, protocol
    /// violations, runtime misuse) propagates so configuration bugs are not
    /// masked as slow boot.
    pub fn is_connection_class(&self) -> bool {
        match self {
            Self::Io(err) => is_connection_kind(err.kind()),
            Self::Http(err) => match err {
                ureq::Error::Io(io) => is_connection_kind(io.kind()),
                ureq::Error::ConnectionFailed | ureq::Error::Timeout(_) => true,
                _ => false,
            },
            _ => false,
        }
    }
}

fn is_connection_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        kind,
        ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected | TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn connection_refused_is_connection_class() {
        let err = HarnessError::Io(IoError::from(ErrorKind::ConnectionRefused));
        assert!(err.is_connection_class());
    }

    #[test]
    fn build_error_is_not_connection_class() {
        let err = HarnessError::Build("context missing".into());
        assert!(!err.is_connection_class());
    }

    #[test]
    fn scenario_execution_error_includes_captured_streams() {
        let err = HarnessError::ScenarioExecution {
            name: "cert".into(),
            exit_code: 2,
            stdout: "requesting certificate".into(),
            stderr: "permission denied".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("exited with status 2"));
        assert!(rendered.contains("requesting certificate"));
        assert!(rendered.contains("permission denied"));
    }
}
