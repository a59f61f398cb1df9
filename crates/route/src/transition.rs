//! State machine transition validation for routes and actions.
//!
//! Routes and actions share one status set and one transition table.
//! `InProgress → InProgress` is permitted so a run resumed after an
//! interruption can re-enter without special-casing, and
//! `Failed → InProgress` is permitted for rerun-failed mode only.

use crate::error::RouteError;
use crate::status::RouteStatus;

/// Returns `true` if the transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition(from: RouteStatus, to: RouteStatus) -> bool {
    matches!(
        (from, to),
        (RouteStatus::Pending, RouteStatus::InProgress)
            | (RouteStatus::Failed, RouteStatus::InProgress)
            | (RouteStatus::InProgress, RouteStatus::InProgress)
            | (RouteStatus::InProgress, RouteStatus::Completed)
            | (RouteStatus::InProgress, RouteStatus::Failed)
    )
}

/// Validate a status transition, returning an error if invalid.
pub fn validate_transition(from: RouteStatus, to: RouteStatus) -> Result<(), RouteError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(RouteError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(can_transition(
            RouteStatus::Pending,
            RouteStatus::InProgress
        ));
        assert!(can_transition(
            RouteStatus::InProgress,
            RouteStatus::Completed
        ));
        assert!(can_transition(
            RouteStatus::InProgress,
            RouteStatus::Failed
        ));
        assert!(can_transition(RouteStatus::Failed, RouteStatus::InProgress));
        assert!(can_transition(
            RouteStatus::InProgress,
            RouteStatus::InProgress
        ));
    }

    #[test]
    fn invalid_transitions() {
        assert!(!can_transition(
            RouteStatus::Pending,
            RouteStatus::Completed
        ));
        assert!(!can_transition(
            RouteStatus::Completed,
            RouteStatus::InProgress
        ));
        assert!(!can_transition(
            RouteStatus::Completed,
            RouteStatus::Failed
        ));
        assert!(!can_transition(RouteStatus::Pending, RouteStatus::Failed));
        assert!(!can_transition(RouteStatus::Failed, RouteStatus::Completed));
    }

    #[test]
    fn validate_transition_ok() {
        assert!(validate_transition(RouteStatus::Pending, RouteStatus::InProgress).is_ok());
    }

    #[test]
    fn validate_transition_err() {
        let err =
            validate_transition(RouteStatus::Completed, RouteStatus::InProgress).unwrap_err();
        assert!(err.to_string().contains("invalid transition"));
    }
}
