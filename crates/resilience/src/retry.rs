//! Bounded retry with per-classification handling.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::classify::{DomainFault, FailureKind};

/// Where retries report failures of the active endpoint.
///
/// Implemented by `caravan-resource`'s endpoint set; the policy itself
/// never knows what an endpoint is.
pub trait FailureSink: Send + Sync {
    /// Record one failure against the active endpoint. The sink may
    /// rotate internally once the endpoint's own threshold is reached.
    fn record_failure(&self);

    /// Force an immediate advance to the next endpoint.
    fn rotate(&self);
}

/// A sink that ignores everything, for operations with no endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl FailureSink for NoopSink {
    fn record_failure(&self) {}
    fn rotate(&self) {}
}

/// Per-attempt context handed to the wrapped operation.
///
/// `last_fault` carries the domain fault that triggered the previous
/// retry, so the operation can adjust — scale its fee after
/// [`DomainFault::FeeTooLow`], refresh its nonce after
/// [`DomainFault::NonceConflict`] — without the policy knowing how.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext {
    /// 1-based attempt number.
    pub attempt: u32,
    /// The retryable fault classified on the previous attempt, if any.
    pub last_fault: Option<DomainFault>,
}

/// Error returned when a retried operation does not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt was consumed without success. Carries the last
    /// classified failure when the final attempt raised one (a final soft
    /// failure leaves it empty).
    #[error("retries exhausted after {attempts} attempts")]
    Exhausted {
        /// Attempts performed.
        attempts: u32,
        /// The failure observed on the final attempt, if any.
        source: Option<E>,
    },

    /// The classification demanded an immediate re-raise.
    #[error("{0}")]
    Aborted(E),
}

impl<E> RetryError<E> {
    /// Returns `true` for the exhaustion case.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// The underlying failure, if one was captured.
    #[must_use]
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } => source,
            Self::Aborted(err) => Some(err),
        }
    }
}

/// Bounded retry policy.
///
/// The wrapped operation returns `Ok(Some(value))` on success,
/// `Ok(None)` on a soft failure (completed without raising but reported
/// failure), or `Err(e)` — which the classification function maps into a
/// [`FailureKind`] deciding the policy's next move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Sleep between attempts for soft and generic transient failures.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt bound and inter-attempt delay.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` under this policy.
    ///
    /// Per classification:
    /// - soft failure (`Ok(None)`): count against the endpoint, sleep, retry
    /// - [`FailureKind::Proxy`]: count, re-raise ([`RetryError::Aborted`])
    /// - [`FailureKind::Endpoint`]: rotate, retry immediately
    /// - retryable [`FailureKind::Fault`]: retry immediately, exposing the
    ///   fault through [`RetryContext::last_fault`]
    /// - non-retryable fault or [`FailureKind::Terminal`]: re-raise
    /// - [`FailureKind::Transient`]: log, count, sleep, retry
    ///
    /// Exhausting `max_attempts` returns [`RetryError::Exhausted`] carrying
    /// the last failure.
    pub async fn run<T, E, F, Fut, C>(
        &self,
        sink: &dyn FailureSink,
        classify: C,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(RetryContext) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        C: Fn(&E) -> FailureKind,
        E: std::fmt::Display,
    {
        let mut last_fault = None;

        for attempt in 1..=self.max_attempts {
            let ctx = RetryContext {
                attempt,
                last_fault,
            };

            match op(ctx).await {
                Ok(Some(value)) => return Ok(value),

                Ok(None) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        "attempt reported soft failure"
                    );
                    sink.record_failure();
                    if attempt < self.max_attempts {
                        sleep(self.delay).await;
                    }
                }

                Err(err) => match classify(&err) {
                    FailureKind::Proxy => {
                        sink.record_failure();
                        return Err(RetryError::Aborted(err));
                    }

                    FailureKind::Endpoint => {
                        warn!(attempt, error = %err, "endpoint failure, rotating");
                        sink.rotate();
                    }

                    FailureKind::Fault(fault) if fault.is_retryable() => {
                        warn!(attempt, %fault, "recoverable fault, retrying with adjustment");
                        last_fault = Some(fault);
                    }

                    FailureKind::Fault(fault) => {
                        debug!(%fault, "fatal domain fault");
                        return Err(RetryError::Aborted(err));
                    }

                    FailureKind::Transient => {
                        warn!(
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %err,
                            "transient failure"
                        );
                        sink.record_failure();
                        if attempt == self.max_attempts {
                            return Err(RetryError::Exhausted {
                                attempts: attempt,
                                source: Some(err),
                            });
                        }
                        sleep(self.delay).await;
                    }

                    FailureKind::Terminal => return Err(RetryError::Aborted(err)),
                },
            }
        }

        Err(RetryError::Exhausted {
            attempts: self.max_attempts,
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("connection reset")]
        Transient,
        #[error("bad upstream response")]
        Endpoint,
        #[error("proxy refused")]
        Proxy,
        #[error("{0}")]
        Fault(DomainFault),
        #[error("unknown action")]
        Terminal,
    }

    fn classify(err: &TestError) -> FailureKind {
        match err {
            TestError::Transient => FailureKind::Transient,
            TestError::Endpoint => FailureKind::Endpoint,
            TestError::Proxy => FailureKind::Proxy,
            TestError::Fault(f) => FailureKind::Fault(*f),
            TestError::Terminal => FailureKind::Terminal,
        }
    }

    #[derive(Default)]
    struct CountingSink {
        failures: AtomicU32,
        rotations: AtomicU32,
    }

    impl FailureSink for CountingSink {
        fn record_failure(&self) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        fn rotate(&self) {
            self.rotations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt() {
        let sink = CountingSink::default();
        let result: Result<u32, RetryError<TestError>> = policy()
            .run(&sink, classify, |_ctx| async { Ok(Some(42)) })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(sink.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_then_success() {
        let sink = CountingSink::default();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = Arc::clone(&calls);

        let result: Result<u32, RetryError<TestError>> = policy()
            .run(&sink, classify, move |_ctx| {
                let calls = Arc::clone(&calls_ref);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError::Transient)
                    } else {
                        Ok(Some(7))
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Exactly m = 2 failures recorded for m transient failures.
        assert_eq!(sink.failures.load(Ordering::SeqCst), 2);
        assert_eq!(sink.rotations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_carries_last_failure() {
        let sink = CountingSink::default();
        let result: Result<u32, RetryError<TestError>> = policy()
            .run(&sink, classify, |_ctx| async { Err(TestError::Transient) })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert!(matches!(err.into_source(), Some(TestError::Transient)));
        assert_eq!(sink.failures.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn soft_failures_count_toward_attempts() {
        let sink = CountingSink::default();
        let result: Result<u32, RetryError<TestError>> = policy()
            .run(&sink, classify, |_ctx| async { Ok(None) })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        // A final soft failure leaves no source to carry.
        assert!(err.into_source().is_none());
        assert_eq!(sink.failures.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn endpoint_failure_rotates_and_retries() {
        let sink = CountingSink::default();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = Arc::clone(&calls);

        let result: Result<u32, RetryError<TestError>> = policy()
            .run(&sink, classify, move |_ctx| {
                let calls = Arc::clone(&calls_ref);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(TestError::Endpoint)
                    } else {
                        Ok(Some(1))
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(sink.rotations.load(Ordering::SeqCst), 1);
        assert_eq!(sink.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn proxy_failure_counts_and_reraises() {
        let sink = CountingSink::default();
        let result: Result<u32, RetryError<TestError>> = policy()
            .run(&sink, classify, |_ctx| async { Err(TestError::Proxy) })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            RetryError::Aborted(TestError::Proxy)
        ));
        assert_eq!(sink.failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_fault_reraises_immediately() {
        let sink = CountingSink::default();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = Arc::clone(&calls);

        let result: Result<u32, RetryError<TestError>> = policy()
            .run(&sink, classify, move |_ctx| {
                let calls = Arc::clone(&calls_ref);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Option<u32>, _>(TestError::Fault(DomainFault::InsufficientFunds))
                }
            })
            .await;

        assert!(matches!(result.unwrap_err(), RetryError::Aborted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recoverable_fault_exposed_to_next_attempt() {
        let sink = CountingSink::default();
        let result: Result<&str, RetryError<TestError>> = policy()
            .run(&sink, classify, |ctx| async move {
                if ctx.attempt == 1 {
                    Err(TestError::Fault(DomainFault::FeeTooLow))
                } else {
                    // The operation sees the fault and adjusts.
                    assert_eq!(ctx.last_fault, Some(DomainFault::FeeTooLow));
                    Ok(Some("sent with scaled fee"))
                }
            })
            .await;

        assert_eq!(result.unwrap(), "sent with scaled fee");
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_never_retried() {
        let sink = CountingSink::default();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = Arc::clone(&calls);

        let result: Result<u32, RetryError<TestError>> = policy()
            .run(&sink, classify, move |_ctx| {
                let calls = Arc::clone(&calls_ref);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Option<u32>, _>(TestError::Terminal)
                }
            })
            .await;

        assert!(matches!(result.unwrap_err(), RetryError::Aborted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn max_attempts_floor_is_one() {
        let p = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(p.max_attempts, 1);
    }
}
