//! Readiness probing for just-started services.
//!
//! Container boot completion has no push notification, so this is a polling
//! design: invoke a probe, sleep a fixed interval, repeat until the probe
//! reports ready or the deadline passes. Connection-class failures are an
//! expected transient state while the service's port is not listening yet;
//! only those are swallowed and retried. Any other error propagates so a
//! genuine configuration bug is not mistaken for slow boot.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};
use ureq::Agent;

use crate::errors::{HarnessError, HarnessResult};

/// Poll `probe` every `interval` until it returns `Ok(true)` or `timeout`
/// elapses.
///
/// `Ok(false)` and connection-class errors both mean "not ready yet";
/// non-connection errors abort the wait immediately.
pub async fn wait_until_ready<F, Fut>(
    what: &str,
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> HarnessResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<bool>>,
{
    debug!("waiting for {what} (timeout: {timeout:?})");
    let start = Instant::now();

    loop {
        match probe().await {
            Ok(true) => {
                debug!("{what} ready after {:?}", start.elapsed());
                return Ok(());
            }
            Ok(false) => {
                trace!("{what} not ready yet");
            }
            Err(err) if err.is_connection_class() => {
                trace!("{what} not accepting connections yet: {err}");
            }
            Err(err) => return Err(err),
        }

        if start.elapsed() + interval > timeout {
            return Err(HarnessError::Timeout {
                what: what.to_string(),
                waited: start.elapsed(),
            });
        }
        tokio::time::sleep(interval).await;
    }
}

/// One readiness GET against the service.
///
/// Ready iff the endpoint answers HTTP 200 with the bootstrap token
/// presented. Any other status means the service is up but not fully
/// provisioned, which is still "not ready" rather than an error.
pub fn http_probe(url: &str, token: &str) -> HarnessResult<bool> {
    let agent: Agent = Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(url).header("X-Vault-Token", token).call() {
        Ok(response) => Ok(response.status() == 200),
        Err(ureq::Error::StatusCode(_)) => Ok(false),
        Err(err) => Err(err.into()),
    }
}
