//! Fixture lifecycle behavior against the in-memory runtime: lazy memoized
//! image builds, idempotent start, readiness-gated URL access and
//! idempotent cleanup.

mod common;

use std::sync::Arc;
use std::time::Duration;

use vault_harness::{
    CleanupRegistry, ContainerRuntime, HarnessConfig, HarnessError, MockRuntime, ServiceFixture,
};

fn test_config() -> HarnessConfig {
    HarnessConfig {
        probe_interval: Duration::from_millis(1),
        probe_timeout: Duration::from_millis(250),
        ..HarnessConfig::default()
    }
}

fn ready_fixture(runtime: Arc<dyn ContainerRuntime>) -> ServiceFixture {
    ServiceFixture::new(runtime, test_config()).with_probe(|_url| Ok(true))
}

#[tokio::test]
async fn image_is_built_exactly_once() {
    common::init_test_logging();
    let mock = MockRuntime::new();
    let fixture = ready_fixture(Arc::new(mock.clone()));

    let first = fixture.image().await.unwrap();
    let second = fixture.image().await.unwrap();
    let third = fixture.image().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(mock.build_calls(), 1);
}

#[tokio::test]
async fn build_failure_surfaces_as_build_error() {
    common::init_test_logging();
    let mock = MockRuntime::new();
    mock.fail_builds("COPY failed: no such file");
    let fixture = ready_fixture(Arc::new(mock.clone()));

    let err = fixture.image().await.unwrap_err();
    assert!(matches!(err, HarnessError::Build(message) if message.contains("COPY failed")));
}

#[tokio::test]
async fn start_twice_creates_one_container() {
    common::init_test_logging();
    let mock = MockRuntime::new();
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());
    let fixture = ready_fixture(runtime.clone());
    let registry = CleanupRegistry::new(runtime);

    fixture.start(&registry).await.unwrap();
    fixture.start(&registry).await.unwrap();

    assert_eq!(mock.create_calls(), 1);
    assert_eq!(registry.len(), 1);
    registry.drain_all().await;
}

#[tokio::test]
async fn url_is_gated_on_readiness() {
    common::init_test_logging();
    let mock = MockRuntime::new();
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());
    let fixture = ready_fixture(runtime.clone());
    let registry = CleanupRegistry::new(runtime);

    let err = fixture.url().await.unwrap_err();
    assert!(matches!(err, HarnessError::NotReady(_)));

    fixture.start(&registry).await.unwrap();
    let url = fixture.url().await.unwrap();
    assert_eq!(url, "http://172.17.0.2:8200");
    registry.drain_all().await;
}

#[tokio::test]
async fn readiness_timeout_fails_the_start() {
    common::init_test_logging();
    let mock = MockRuntime::new();
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());
    let fixture =
        ServiceFixture::new(runtime.clone(), test_config()).with_probe(|_url| Ok(false));
    let registry = CleanupRegistry::new(runtime);

    let err = fixture.start(&registry).await.unwrap_err();
    assert!(matches!(err, HarnessError::Timeout { .. }));

    // The container was registered before starting, so the failed start
    // still leaves a handle to tear down.
    assert_eq!(registry.len(), 1);
    registry.drain_all().await;
    assert_eq!(mock.live_containers(), 0);
}

#[tokio::test]
async fn probe_connection_failures_are_retried_until_ready() {
    common::init_test_logging();
    let mock = MockRuntime::new();
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());

    let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = attempts.clone();
    let fixture = ServiceFixture::new(runtime.clone(), test_config()).with_probe(move |_url| {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if n < 3 {
            Err(HarnessError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )))
        } else {
            Ok(true)
        }
    });
    let registry = CleanupRegistry::new(runtime);

    fixture.start(&registry).await.unwrap();
    assert!(attempts.load(std::sync::atomic::Ordering::SeqCst) >= 4);
    registry.drain_all().await;
}

#[tokio::test]
async fn cleanup_is_idempotent_and_blocks_restart() {
    common::init_test_logging();
    let mock = MockRuntime::new();
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());
    let fixture = ready_fixture(runtime.clone());
    let registry = CleanupRegistry::new(runtime);

    fixture.start(&registry).await.unwrap();
    fixture.cleanup().await;
    fixture.cleanup().await;
    assert_eq!(mock.live_containers(), 0);

    let err = fixture.start(&registry).await.unwrap_err();
    assert!(matches!(err, HarnessError::NotReady(_)));

    // Registry drain tolerates the container the fixture already removed.
    registry.drain_all().await;
}

#[tokio::test]
async fn cleanup_before_start_is_a_noop() {
    common::init_test_logging();
    let mock = MockRuntime::new();
    let fixture = ready_fixture(Arc::new(mock.clone()));

    fixture.cleanup().await;
    assert_eq!(mock.create_calls(), 0);
}
