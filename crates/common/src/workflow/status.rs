//! Document status state machine
//!
//! ```text
//!            submit               decide(approved|rejected)
//!  Pending ─────────▶ OnReview ─────────────────────────────▶ Approved | Rejected
//!                      ▲   │ submit (no-op rewrite)                   │
//!                      │   └───────┘                                  │
//!                      └─────── submit / decide(on_review) ───────────┘
//!                                (only while reopening is allowed)
//! ```

use crate::db::models::DocumentStatus;
use crate::errors::{AppError, Result};

/// What is asking for the status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A reviewer or submitter uploaded a new cycle record
    Submission,
    /// An explicit approve/reject/reopen call
    Decision,
}

/// Pure validator for document status transitions.
///
/// Holds no state beyond its configuration; every check is a function of
/// `(current, requested, trigger)`.
#[derive(Debug, Clone, Copy)]
pub struct StatusController {
    allow_reopen: bool,
}

impl Default for StatusController {
    fn default() -> Self {
        Self { allow_reopen: true }
    }
}

impl StatusController {
    pub fn new(allow_reopen: bool) -> Self {
        Self { allow_reopen }
    }

    /// Whether `current -> requested` is permitted for `trigger`
    pub fn validate(
        &self,
        current: DocumentStatus,
        requested: DocumentStatus,
        trigger: Trigger,
    ) -> bool {
        use DocumentStatus::*;

        match trigger {
            Trigger::Submission => match (current, requested) {
                (Pending, OnReview) | (OnReview, OnReview) => true,
                (Approved, OnReview) | (Rejected, OnReview) => self.allow_reopen,
                _ => false,
            },
            Trigger::Decision => match (current, requested) {
                (OnReview, Approved) | (OnReview, Rejected) => true,
                (Approved, OnReview) | (Rejected, OnReview) => self.allow_reopen,
                _ => false,
            },
        }
    }

    /// Like [`validate`](Self::validate) but produces the error the
    /// coordinator surfaces to callers.
    pub fn ensure(
        &self,
        current: DocumentStatus,
        requested: DocumentStatus,
        trigger: Trigger,
    ) -> Result<()> {
        if self.validate(current, requested, trigger) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: current.to_string(),
                to: requested.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DocumentStatus::*;

    #[test]
    fn test_submission_moves_everything_to_on_review() {
        let controller = StatusController::default();
        for current in [Pending, OnReview, Approved, Rejected] {
            assert!(controller.validate(current, OnReview, Trigger::Submission));
        }
    }

    #[test]
    fn test_submission_never_decides() {
        let controller = StatusController::default();
        for requested in [Pending, Approved, Rejected] {
            assert!(!controller.validate(OnReview, requested, Trigger::Submission));
        }
    }

    #[test]
    fn test_decision_from_on_review() {
        let controller = StatusController::default();
        assert!(controller.validate(OnReview, Approved, Trigger::Decision));
        assert!(controller.validate(OnReview, Rejected, Trigger::Decision));
        assert!(!controller.validate(OnReview, OnReview, Trigger::Decision));
        assert!(!controller.validate(OnReview, Pending, Trigger::Decision));
    }

    #[test]
    fn test_decision_requires_a_review_first() {
        let controller = StatusController::default();
        assert!(!controller.validate(Pending, Approved, Trigger::Decision));
        assert!(!controller.validate(Pending, Rejected, Trigger::Decision));
        assert!(!controller.validate(Pending, OnReview, Trigger::Decision));
    }

    #[test]
    fn test_decision_cannot_flip_a_verdict() {
        let controller = StatusController::default();
        assert!(!controller.validate(Approved, Rejected, Trigger::Decision));
        assert!(!controller.validate(Rejected, Approved, Trigger::Decision));
    }

    #[test]
    fn test_reopen_switch() {
        let open = StatusController::new(true);
        let closed = StatusController::new(false);

        for current in [Approved, Rejected] {
            assert!(open.validate(current, OnReview, Trigger::Decision));
            assert!(open.validate(current, OnReview, Trigger::Submission));
            assert!(!closed.validate(current, OnReview, Trigger::Decision));
            assert!(!closed.validate(current, OnReview, Trigger::Submission));
        }
        // The first review is never blocked by the switch
        assert!(closed.validate(Pending, OnReview, Trigger::Submission));
    }

    #[test]
    fn test_ensure_reports_both_ends() {
        let err = StatusController::default()
            .ensure(Pending, Approved, Trigger::Decision)
            .unwrap_err();
        match err {
            AppError::InvalidTransition { from, to } => {
                assert_eq!(from, "pending");
                assert_eq!(to, "approved");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
