//! Ephemeral container test harness for a secrets-service helper binary.
//!
//! Integration tests for a binary that talks to a backing secrets server
//! need a real server, a real network and real files. This crate provides
//! that environment as disposable Docker containers:
//!
//! - [`ServiceFixture`] builds the image once and runs one long-lived
//!   dev-mode server container, gating its URL behind a readiness probe.
//! - [`ScenarioRunner`] runs each test case in a fresh short-lived
//!   container wired to the fixture, with a bounded exit wait, and collects
//!   the files it produced.
//! - [`CleanupRegistry`] records every container before it is started and
//!   tears them all down at the end of the run, best-effort.
//! - [`CertificateBundle`] verifies the PEM material a cert scenario emits.
//!
//! The Docker dependency sits behind the [`ContainerRuntime`] trait;
//! [`MockRuntime`] implements it in memory so the harness logic itself is
//! testable without a daemon.

pub mod config;
pub mod errors;
pub mod fixture;
pub mod probe;
pub mod registry;
pub mod runtime;
pub mod scenario;
pub mod verify;

pub use config::HarnessConfig;
pub use errors::{HarnessError, HarnessResult};
pub use fixture::ServiceFixture;
pub use registry::CleanupRegistry;
pub use runtime::{
    ContainerId, ContainerLogs, ContainerRuntime, ContainerSpec, DockerRuntime, ImageRef,
    MockRuntime,
};
pub use scenario::{Scenario, ScenarioOutcome, ScenarioRunner};
pub use verify::CertificateBundle;
