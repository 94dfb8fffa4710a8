//! Rate-limited content fetch gateway.
//!
//! Every read from the content store goes through a [`FetchGateway`]. It keeps
//! at most N operations in flight (waiters are admitted in FIFO order), retries
//! rate-limit and server failures with exponential backoff, and reports each
//! retry to the log and to an optional [`RetryObserver`].

mod retry;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, instrument, warn};

use pagegen_shared::{GatewayConfig, PagegenError, Result};

pub use retry::{RetryPolicy, UpstreamError};

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// A retry the gateway is about to sleep for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEvent {
    /// Logical operation name passed to [`FetchGateway::fetch`].
    pub operation: String,
    /// Attempt number that just failed (1-based).
    pub attempt: u32,
    pub status: u16,
    pub delay: Duration,
}

/// Receives every scheduled retry.
pub trait RetryObserver: Send + Sync {
    fn retry_scheduled(&self, event: &RetryEvent);
}

/// No-op observer for headless usage.
pub struct NoopObserver;

impl RetryObserver for NoopObserver {
    fn retry_scheduled(&self, _event: &RetryEvent) {}
}

/// Snapshot of the gateway's instrumentation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    /// Operations executing right now.
    pub in_flight: usize,
    /// Highest `in_flight` ever observed.
    pub peak_in_flight: usize,
    /// Underlying operation invocations, retries included.
    pub calls: u64,
    pub retries: u64,
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: AtomicU64,
    retries: AtomicU64,
}

// ---------------------------------------------------------------------------
// FetchGateway
// ---------------------------------------------------------------------------

struct Inner {
    semaphore: Semaphore,
    concurrency: usize,
    policy: RetryPolicy,
    counters: Counters,
    observer: Arc<dyn RetryObserver>,
}

/// Bounded-concurrency, retrying front for content-store calls.
///
/// Cloning is cheap and clones share the same concurrency ceiling.
#[derive(Clone)]
pub struct FetchGateway {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FetchGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchGateway")
            .field("concurrency", &self.inner.concurrency)
            .field("policy", &self.inner.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

impl FetchGateway {
    /// Create a gateway with the given limits.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        Self::with_observer(config, Arc::new(NoopObserver))
    }

    /// Create a gateway that reports retries to `observer`.
    pub fn with_observer(config: &GatewayConfig, observer: Arc<dyn RetryObserver>) -> Result<Self> {
        if config.concurrency == 0 {
            return Err(PagegenError::config("gateway concurrency must be at least 1"));
        }
        if config.max_attempts == 0 {
            return Err(PagegenError::config("gateway max_attempts must be at least 1"));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                semaphore: Semaphore::new(config.concurrency),
                concurrency: config.concurrency,
                policy: RetryPolicy::from(config),
                counters: Counters::default(),
                observer,
            }),
        })
    }

    /// Concurrency ceiling for this gateway.
    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    /// Current instrumentation counters.
    pub fn stats(&self) -> GatewayStats {
        let c = &self.inner.counters;
        GatewayStats {
            in_flight: c.in_flight.load(Ordering::SeqCst),
            peak_in_flight: c.peak_in_flight.load(Ordering::SeqCst),
            calls: c.calls.load(Ordering::SeqCst),
            retries: c.retries.load(Ordering::SeqCst),
        }
    }

    /// Run `operation` under the concurrency ceiling, retrying transient failures.
    ///
    /// `operation` is invoked once per attempt. A slot is held only while an
    /// attempt runs; backoff sleeps happen outside the ceiling.
    ///
    /// Fails with [`PagegenError::FetchRejected`] on a non-retryable failure and
    /// [`PagegenError::FetchExhausted`] once `max_attempts` attempts have failed.
    pub async fn fetch<T, F, Fut>(&self, name: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, UpstreamError>>,
    {
        self.run(name, None, operation).await
    }

    /// [`fetch`](Self::fetch) with each attempt bounded by `limit`.
    ///
    /// The clock starts once the attempt holds a slot, so time spent queued
    /// behind the ceiling or sleeping between retries is not counted. An
    /// overrun fails with [`PagegenError::FetchTimedOut`] and is not retried.
    pub async fn fetch_within<T, F, Fut>(&self, name: &str, limit: Duration, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, UpstreamError>>,
    {
        self.run(name, Some(limit), operation).await
    }

    #[instrument(skip_all, fields(operation = %name))]
    async fn run<T, F, Fut>(&self, name: &str, limit: Option<Duration>, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, UpstreamError>>,
    {
        let policy = self.inner.policy;
        let mut attempt: u32 = 1;

        loop {
            let outcome = {
                let _slot = self.acquire().await?;
                match limit {
                    Some(limit) => match tokio::time::timeout(limit, operation()).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(attempt, limit_ms = limit.as_millis() as u64, "attempt timed out");
                            return Err(PagegenError::FetchTimedOut {
                                operation: name.to_string(),
                                after: limit,
                            });
                        }
                    },
                    None => operation().await,
                }
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(attempt, error = %err, "non-retryable failure");
                return Err(PagegenError::FetchRejected {
                    operation: name.to_string(),
                    status: err.http_status(),
                    message: err.to_string(),
                });
            }

            let status = err.http_status().unwrap_or_default();
            if attempt >= policy.max_attempts {
                warn!(attempt, status, "retries exhausted");
                return Err(PagegenError::FetchExhausted {
                    operation: name.to_string(),
                    attempts: attempt,
                    last_status: status,
                });
            }

            if let Some(requested) = err.retry_after().filter(|wait| *wait > policy.max_retry_after) {
                warn!(
                    attempt,
                    requested_ms = requested.as_millis() as u64,
                    ceiling_ms = policy.max_retry_after.as_millis() as u64,
                    "Retry-After above ceiling, clamping"
                );
            }
            let delay = policy.delay_for(attempt, err.retry_after());
            warn!(
                attempt,
                status,
                delay_ms = delay.as_millis() as u64,
                "transient upstream failure, retrying"
            );
            self.inner.counters.retries.fetch_add(1, Ordering::SeqCst);
            self.inner.observer.retry_scheduled(&RetryEvent {
                operation: name.to_string(),
                attempt,
                status,
                delay,
            });

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn acquire(&self) -> Result<Slot<'_>> {
        let permit = self
            .inner
            .semaphore
            .acquire()
            .await
            .map_err(|_| PagegenError::Network("fetch gateway closed".into()))?;

        let counters = &self.inner.counters;
        counters.calls.fetch_add(1, Ordering::SeqCst);
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(Slot {
            _permit: permit,
            counters,
        })
    }
}

/// An occupied concurrency slot; releases the permit and counter on drop.
struct Slot<'a> {
    _permit: SemaphorePermit<'a>,
    counters: &'a Counters,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
