//! Bounded retry for outbound HTTP calls.
//!
//! Only transport-class failures are retried; an upstream that answered
//! with a 4xx/5xx or a body we cannot use gets surfaced immediately.

use std::future::Future;
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Transport-class failures worth another attempt. Anything the upstream
/// actually answered is not.
pub fn transport_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

pub async fn with_backoff<T, E, Op, Fut>(
    label: &str,
    op: Op,
    is_transient: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_backoff_config(label, DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY, op, is_transient).await
}

pub async fn with_backoff_config<T, E, Op, Fut>(
    label: &str,
    attempts: u32,
    base_delay: Duration,
    mut op: Op,
    is_transient: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = base_delay;
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && is_transient(&err) => {
                tracing::warn!(attempt, error = %err, "{} call failed, retrying", label);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
