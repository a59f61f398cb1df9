//! Action outcomes.

use serde::{Deserialize, Serialize};

/// What a handler reports when it finishes without raising.
///
/// `Failed` is the soft-failure case: the operation ran to completion but
/// reported failure. The retry policy sleeps and retries it; only after
/// exhaustion does the action itself get marked failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The action succeeded.
    Done,
    /// The action succeeded and produced structured data.
    DoneWith(serde_json::Value),
    /// The action completed but reported failure.
    Failed,
}

impl ActionOutcome {
    /// Returns `true` for either success variant.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Done | Self::DoneWith(_))
    }

    /// The structured result, if any.
    #[must_use]
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::DoneWith(value) => Some(value),
            Self::Done | Self::Failed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_variants() {
        assert!(ActionOutcome::Done.succeeded());
        assert!(ActionOutcome::DoneWith(serde_json::json!({"tx": "0xabc"})).succeeded());
        assert!(!ActionOutcome::Failed.succeeded());
    }

    #[test]
    fn data_accessor() {
        let outcome = ActionOutcome::DoneWith(serde_json::json!({"tx": "0xabc"}));
        assert_eq!(outcome.data().unwrap()["tx"], "0xabc");
        assert!(ActionOutcome::Done.data().is_none());
        assert!(ActionOutcome::Failed.data().is_none());
    }
}
