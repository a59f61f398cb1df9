//! Action error types and their retry classification.

use caravan_resilience::{DomainFault, FailureKind};
use caravan_resource::ResourceError;
use thiserror::Error;

/// Errors raised by action handlers and the dispatch around them.
///
/// Every variant maps onto exactly one [`FailureKind`], so the retry
/// policy never needs to inspect messages.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The egress proxy refused or dropped the connection.
    #[error("proxy: {0}")]
    Proxy(String),

    /// The active upstream endpoint misbehaved (bad status, malformed
    /// response).
    #[error("endpoint: {0}")]
    Endpoint(String),

    /// A classified domain fault.
    #[error("{0}")]
    Fault(DomainFault),

    /// A generic transient failure worth retrying.
    #[error("transient: {0}")]
    Transient(String),

    /// No handler is registered for the action kind. Fatal, never retried.
    #[error("unknown action kind: {0}")]
    UnknownKind(String),

    /// A runtime invariant was violated. The only class of error allowed
    /// to abort the owning flow.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// The run was cancelled while the action was in flight.
    #[error("cancelled")]
    Cancelled,

    /// A proxy or endpoint resource operation failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl ActionError {
    /// Create a proxy failure.
    pub fn proxy(msg: impl Into<String>) -> Self {
        Self::Proxy(msg.into())
    }

    /// Create an endpoint failure.
    pub fn endpoint(msg: impl Into<String>) -> Self {
        Self::Endpoint(msg.into())
    }

    /// Create a generic transient failure.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create an invariant violation.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Classify an upstream error message into a typed error.
    ///
    /// Upstreams rarely return structured fault codes; the phrases below
    /// are the ones they actually emit. Anything unmatched is a generic
    /// transient failure.
    pub fn from_upstream(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let contains_any =
            |phrases: &[&str]| phrases.iter().any(|phrase| lower.contains(phrase));

        if contains_any(&["proxy", "service unavailable", "503"]) {
            Self::Proxy(message)
        } else if contains_any(&["insufficient", "not enough"]) {
            Self::Fault(DomainFault::InsufficientFunds)
        } else if contains_any(&["exceeds balance", "transfer amount exceeds balance"]) {
            Self::Fault(DomainFault::AmountExceedsBalance)
        } else if contains_any(&["nonce too low", "replacement transaction underpriced"]) {
            Self::Fault(DomainFault::NonceConflict)
        } else if contains_any(&[
            "fee cap less than block",
            "less than block base fee",
            "intrinsic gas too low",
        ]) {
            Self::Fault(DomainFault::FeeTooLow)
        } else if contains_any(&["failed to send tx", "'code': -32603"]) {
            Self::Fault(DomainFault::SendFailure)
        } else {
            Self::Transient(message)
        }
    }

    /// The retry classification of this error.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Proxy(_) => FailureKind::Proxy,
            Self::Endpoint(_) => FailureKind::Endpoint,
            Self::Fault(fault) => FailureKind::Fault(*fault),
            Self::Transient(_) => FailureKind::Transient,
            Self::UnknownKind(_) | Self::Invariant(_) | Self::Cancelled | Self::Resource(_) => {
                FailureKind::Terminal
            }
        }
    }

    /// Returns `true` if this error must abort the owning flow rather
    /// than just the account.
    #[must_use]
    pub fn aborts_flow(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_proxy_phrases() {
        assert!(matches!(
            ActionError::from_upstream("HTTP 503 Service Unavailable"),
            ActionError::Proxy(_)
        ));
        assert!(matches!(
            ActionError::from_upstream("proxy connection refused"),
            ActionError::Proxy(_)
        ));
    }

    #[test]
    fn upstream_fund_phrases() {
        assert!(matches!(
            ActionError::from_upstream("insufficient funds for gas * price + value"),
            ActionError::Fault(DomainFault::InsufficientFunds)
        ));
        assert!(matches!(
            ActionError::from_upstream("ERC20: transfer amount exceeds balance"),
            ActionError::Fault(DomainFault::AmountExceedsBalance)
        ));
    }

    #[test]
    fn upstream_nonce_and_fee_phrases() {
        assert!(matches!(
            ActionError::from_upstream("nonce too low: next nonce 5"),
            ActionError::Fault(DomainFault::NonceConflict)
        ));
        assert!(matches!(
            ActionError::from_upstream("max fee per gas less than block base fee"),
            ActionError::Fault(DomainFault::FeeTooLow)
        ));
        assert!(matches!(
            ActionError::from_upstream("intrinsic gas too low"),
            ActionError::Fault(DomainFault::FeeTooLow)
        ));
    }

    #[test]
    fn upstream_send_failure_phrases() {
        assert!(matches!(
            ActionError::from_upstream("failed to send tx: timeout"),
            ActionError::Fault(DomainFault::SendFailure)
        ));
    }

    #[test]
    fn unmatched_message_is_transient() {
        assert!(matches!(
            ActionError::from_upstream("connection reset by peer"),
            ActionError::Transient(_)
        ));
    }

    #[test]
    fn classification_mapping() {
        assert_eq!(
            ActionError::proxy("x").failure_kind(),
            FailureKind::Proxy
        );
        assert_eq!(
            ActionError::endpoint("x").failure_kind(),
            FailureKind::Endpoint
        );
        assert_eq!(
            ActionError::transient("x").failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            ActionError::Fault(DomainFault::FeeTooLow).failure_kind(),
            FailureKind::Fault(DomainFault::FeeTooLow)
        );
        assert_eq!(
            ActionError::UnknownKind("swap".into()).failure_kind(),
            FailureKind::Terminal
        );
        assert_eq!(
            ActionError::invariant("x").failure_kind(),
            FailureKind::Terminal
        );
    }

    #[test]
    fn only_invariant_aborts_flow() {
        assert!(ActionError::invariant("x").aborts_flow());
        assert!(!ActionError::UnknownKind("swap".into()).aborts_flow());
        assert!(!ActionError::transient("x").aborts_flow());
        assert!(!ActionError::Cancelled.aborts_flow());
    }
}
