//! Bounded polling for things the page renders asynchronously.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

use crate::{
    error::{PageError, TldwError},
    page::{ElementRef, Page},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl WaitOptions {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
            ..Self::default()
        }
    }
}

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("timed out after {}ms", elapsed.as_millis())]
    TimedOut { elapsed: Duration },

    #[error(transparent)]
    Page(#[from] PageError),
}

/// Poll `predicate` every `options.interval` until it yields a value.
///
/// The first poll happens immediately. The whole wait, predicate calls
/// included, is bounded by `options.timeout`; the ticker lives inside the
/// returned future, so it stops on success, on timeout and when the caller
/// drops the wait. Page errors end the wait at once.
pub async fn wait_for<T, F, Fut>(mut predicate: F, options: WaitOptions) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, PageError>>,
{
    let start = Instant::now();
    let poll = async {
        let mut ticker = tokio::time::interval(options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(value) = predicate().await? {
                return Ok(value);
            }
        }
    };

    match tokio::time::timeout(options.timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(WaitError::TimedOut {
            elapsed: start.elapsed(),
        }),
    }
}

/// Wait for the first element matching `selector`, with the default polling
/// interval and `timeout` (or the default timeout).
pub async fn wait_for_element(
    page: &dyn Page,
    selector: &str,
    timeout: Option<Duration>,
) -> Result<ElementRef, TldwError> {
    wait_for_element_with(page, selector, WaitOptions::with_timeout(timeout)).await
}

pub async fn wait_for_element_with(
    page: &dyn Page,
    selector: &str,
    options: WaitOptions,
) -> Result<ElementRef, TldwError> {
    trace!(selector, timeout_ms = options.timeout.as_millis() as u64, "waiting for element");
    wait_for(|| page.query_selector(selector), options)
        .await
        .map_err(|e| match e {
            WaitError::TimedOut { elapsed } => TldwError::Timeout {
                selector: selector.to_string(),
                elapsed,
            },
            WaitError::Page(e) => TldwError::Page(e),
        })
}
