//! Failure classification.
//!
//! Every error raised by a wrapped operation is mapped into one
//! [`FailureKind`] by a caller-supplied classification function. The
//! retry policy decides what to do purely from the kind — it never
//! inspects the error itself.

use serde::{Deserialize, Serialize};

/// The fixed set of domain error kinds an upstream call can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainFault {
    /// The account cannot cover value plus fees. Not retryable.
    InsufficientFunds,
    /// The transfer amount exceeds the available balance. Not retryable.
    AmountExceedsBalance,
    /// A concurrent submission consumed the nonce. Retry after refreshing it.
    NonceConflict,
    /// The offered fee is below the current acceptance floor. Retry with a
    /// scaled fee.
    FeeTooLow,
    /// The upstream accepted the call but failed to propagate it. Retry
    /// with rebuilt parameters.
    SendFailure,
}

impl DomainFault {
    /// Returns `true` if the fault can be retried with adjusted parameters.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NonceConflict | Self::FeeTooLow | Self::SendFailure
        )
    }
}

impl std::fmt::Display for DomainFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientFunds => write!(f, "insufficient funds"),
            Self::AmountExceedsBalance => write!(f, "amount exceeds balance"),
            Self::NonceConflict => write!(f, "nonce conflict"),
            Self::FeeTooLow => write!(f, "fee too low"),
            Self::SendFailure => write!(f, "send failure"),
        }
    }
}

/// How the retry policy should treat a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The egress proxy is bad. Counted against the active endpoint and
    /// re-raised — proxy rotation is the caller's responsibility, since
    /// the proxy is shared above the endpoint level.
    Proxy,
    /// The active upstream endpoint is bad (e.g. malformed response).
    /// Rotate to the next endpoint and retry immediately.
    Endpoint,
    /// A domain fault; retried with adjustment or re-raised depending on
    /// [`DomainFault::is_retryable`].
    Fault(DomainFault),
    /// A generic transient failure: log, count, sleep, retry.
    Transient,
    /// A programmer error or misconfiguration. Re-raised immediately.
    Terminal,
}

impl FailureKind {
    /// Returns `true` if the retry policy will attempt the operation again.
    #[must_use]
    pub fn is_retried(&self) -> bool {
        match self {
            Self::Endpoint | Self::Transient => true,
            Self::Fault(fault) => fault.is_retryable(),
            Self::Proxy | Self::Terminal => false,
        }
    }
}
