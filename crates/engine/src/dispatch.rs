//! Action dispatch: handler lookup, retry wrapping, proxy rotation.

use std::sync::Arc;

use tracing::{debug, warn};

use caravan_action::{ActionContext, ActionError, ActionOutcome, ActionRegistry};
use caravan_core::NetworkKey;
use caravan_resilience::{FailureKind, FailureSink, NoopSink, RetryError, RetryPolicy};
use caravan_resource::{EndpointDirectory, EndpointSet, ProxyRotator};
use caravan_route::RouteAction;

/// Executes one action: resolves the handler, wraps it in the retry
/// policy, rotates the egress proxy on proxy faults, and maps fatal
/// domain faults to a failed outcome.
///
/// Failure accounting flows into the endpoint set named by the action's
/// `network` parameter; actions without one use a no-op sink.
pub struct ActionDispatcher {
    registry: ActionRegistry,
    retry: RetryPolicy,
    endpoints: Arc<EndpointDirectory>,
    proxies: Option<ProxyRotator>,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ActionDispatcher {
    /// Create a dispatcher without a proxy pool: proxy faults are not
    /// recoverable and propagate.
    #[must_use]
    pub fn new(
        registry: ActionRegistry,
        retry: RetryPolicy,
        endpoints: Arc<EndpointDirectory>,
    ) -> Self {
        Self {
            registry,
            retry,
            endpoints,
            proxies: None,
        }
    }

    /// Attach a proxy pool used to swap the egress proxy on proxy faults.
    #[must_use]
    pub fn with_proxies(mut self, proxies: ProxyRotator) -> Self {
        self.proxies = Some(proxies);
        self
    }

    /// The handler registry.
    #[must_use]
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// The endpoint set an action's failures count against, if its
    /// parameter blob names a configured network.
    fn endpoint_set(&self, action: &RouteAction) -> Option<Arc<EndpointSet>> {
        let raw = action.params.get("network")?.as_str()?;
        let key = NetworkKey::new(raw).ok()?;
        self.endpoints.get(&key).ok()
    }

    /// Execute one action to a final outcome.
    ///
    /// Returns `Ok(ActionOutcome::Failed)` when retries are exhausted or a
    /// fatal domain fault surfaces — those fail the action, not the
    /// account task. Errors that escape here (unknown kind, cancellation,
    /// invariant violations) are for the state machine to interpret.
    pub async fn execute(
        &self,
        action: &RouteAction,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, ActionError> {
        let handler = self.registry.get(&action.kind)?;

        let endpoint_set = self.endpoint_set(action);
        let noop = NoopSink;
        let sink: &dyn FailureSink = endpoint_set
            .as_deref()
            .map_or(&noop as &dyn FailureSink, |set| set as &dyn FailureSink);

        let mut ctx = ctx.clone();
        let mut leased: Option<String> = None;
        let mut proxy_swaps = 0u32;

        let result = loop {
            let attempt_ctx = ctx.clone();
            let attempt_handler = Arc::clone(&handler);
            let attempt_params = Arc::clone(&action.params);

            let run = self
                .retry
                .run(sink, ActionError::failure_kind, move |_retry_ctx| {
                    let handler = Arc::clone(&attempt_handler);
                    let params = Arc::clone(&attempt_params);
                    let ctx = attempt_ctx.clone();
                    async move {
                        match handler.execute(params.as_ref(), &ctx).await {
                            Ok(outcome) if outcome.succeeded() => Ok(Some(outcome)),
                            Ok(_) => Ok(None),
                            Err(err) => Err(err),
                        }
                    }
                })
                .await;

            match run {
                Ok(outcome) => break Ok(outcome),

                Err(RetryError::Exhausted { attempts, .. }) => {
                    warn!(
                        action = %action.name,
                        attempts,
                        "retries exhausted, marking action failed"
                    );
                    break Ok(ActionOutcome::Failed);
                }

                Err(RetryError::Aborted(err)) => match err.failure_kind() {
                    FailureKind::Proxy => {
                        proxy_swaps += 1;
                        let Some(proxies) = &self.proxies else {
                            break Err(err);
                        };
                        if proxy_swaps >= self.retry.max_attempts {
                            break Err(err);
                        }
                        match proxies.acquire().await {
                            Ok(fresh) => {
                                debug!(
                                    action = %action.name,
                                    proxy = %fresh,
                                    "swapped egress proxy after proxy fault"
                                );
                                if let Some(old) = leased.replace(fresh.clone()) {
                                    let _ = proxies.release(&old).await;
                                }
                                ctx.proxy = Some(fresh);
                            }
                            Err(resource_err) => break Err(resource_err.into()),
                        }
                    }

                    FailureKind::Fault(fault) if !fault.is_retryable() => {
                        warn!(action = %action.name, %fault, "fatal domain fault, marking action failed");
                        break Ok(ActionOutcome::Failed);
                    }

                    _ => break Err(err),
                },
            }
        };

        if let (Some(proxies), Some(proxy)) = (&self.proxies, &leased) {
            let _ = proxies.release(proxy).await;
        }

        result
    }
}
