//! End-to-end run against a real Docker daemon.
//!
//! Ignored by default: requires a local daemon and a build context with a
//! Dockerfile producing the helper image (set VAULT_HARNESS_BUILD_CONTEXT).
//! Run with: cargo test --test docker_e2e -- --ignored

mod common;

use std::sync::Arc;

use vault_harness::{
    CertificateBundle, CleanupRegistry, ContainerRuntime, DockerRuntime, HarnessConfig, Scenario,
    ScenarioRunner, ServiceFixture,
};

#[tokio::test]
#[ignore = "requires a local Docker daemon and a fixture build context"]
async fn cert_scenario_produces_verifiable_material() {
    common::init_test_logging();

    let config = HarnessConfig::from_env().unwrap();
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect().unwrap());
    let fixture = ServiceFixture::new(runtime.clone(), config);
    let registry = CleanupRegistry::new(runtime.clone());
    let runner = ScenarioRunner::new(runtime);

    fixture.start(&registry).await.unwrap();

    let scenario = Scenario::cert(
        "/tmp/test",
        "kube-apiserver",
        "cluster1/pki/k8s/sign/kube-apiserver",
    );
    let result = runner.run(&fixture, &registry, &scenario).await;

    // Tear down before asserting so a failure does not leak containers.
    fixture.cleanup().await;
    registry.drain_all().await;

    let outcome = result.unwrap();
    let bundle = CertificateBundle::from_outcome(&outcome, "/tmp/test").unwrap();
    bundle.verify("kube-apiserver").unwrap();
}
