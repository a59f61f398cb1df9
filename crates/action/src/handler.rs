//! The action handler contract.

use async_trait::async_trait;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::outcome::ActionOutcome;

/// One action kind's implementation.
///
/// Handlers are invoked by the engine's dispatcher, which owns retries,
/// proxy rotation and failure classification — a handler performs the
/// domain operation once and reports what happened. Handlers must be
/// idempotency-aware: the engine guarantees at-least-once invocation,
/// nothing stronger.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// The action kind this handler serves, matched against
    /// `RouteAction::kind`.
    fn kind(&self) -> &str;

    /// Perform the operation.
    ///
    /// `params` is the route's shared parameter blob; handlers pick out
    /// their own section by convention (usually keyed by kind).
    async fn execute(
        &self,
        params: &serde_json::Value,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, ActionError>;
}
