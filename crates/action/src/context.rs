//! Per-account execution context handed to action handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use caravan_core::AccountId;
use caravan_resource::EndpointDirectory;

use crate::error::ActionError;

/// The slice of an account a handler is allowed to see.
#[derive(Debug, Clone)]
pub struct AccountProfile {
    /// Account identifier.
    pub id: AccountId,
    /// Human-readable label.
    pub name: String,
    /// On-chain address.
    pub address: String,
    /// Signing secret, if the account has one.
    pub private_key: Option<String>,
}

/// Execution context for one handler invocation.
///
/// Carried explicitly through every call — there is no ambient
/// per-task state. The endpoint directory is shared and interior-mutable
/// (rotation); everything else is immutable for the invocation.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// The account the action runs as.
    pub account: AccountProfile,
    /// Egress proxy for this invocation, if one is assigned.
    pub proxy: Option<String>,
    /// Endpoint sets for every configured network.
    pub endpoints: Arc<EndpointDirectory>,
    /// Token for cooperative cancellation.
    pub cancellation: CancellationToken,
}

impl ActionContext {
    /// Create a context with no proxy and a fresh cancellation token.
    #[must_use]
    pub fn new(account: AccountProfile, endpoints: Arc<EndpointDirectory>) -> Self {
        Self {
            account,
            proxy: None,
            endpoints,
            cancellation: CancellationToken::new(),
        }
    }

    /// Attach an egress proxy.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Replace the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Check if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), ActionError> {
        if self.cancellation.is_cancelled() {
            Err(ActionError::Cancelled)
        } else {
            Ok(())
        }
    }
}
