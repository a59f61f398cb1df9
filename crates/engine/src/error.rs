//! Engine error types.

use thiserror::Error;

use caravan_action::ActionError;
use caravan_resource::ResourceError;
use caravan_route::RouteError;
use caravan_storage::StoreError;

/// Errors from the route execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A runtime invariant was violated. The only class of error allowed
    /// to abort a flow; everything else is absorbed at the account
    /// boundary as a failed route.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// An action-layer error escaped the account boundary.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// A persistence operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A status transition was rejected.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// A proxy or endpoint operation failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl EngineError {
    /// Create an invariant violation.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Returns `true` if this error must abort the owning flow instead of
    /// only failing the account it came from.
    #[must_use]
    pub fn aborts_flow(&self) -> bool {
        match self {
            Self::Invariant(_) => true,
            Self::Action(err) => err.aborts_flow(),
            Self::Store(_) | Self::Route(_) | Self::Resource(_) => false,
        }
    }
}
