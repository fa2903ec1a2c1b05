//! Reconciliation plans and their best-effort execution.
//!
//! A [`ReconciliationPlan`] is computed purely from observed state. Executing
//! it with [`apply_plan`] issues one remote call per entry; every call is
//! attempted regardless of earlier failures, and failures are collected into
//! the returned [`ReconcileOutcome`].

use tracing::{error, info};

use crate::ports::IssueTracker;
use crate::{LabelSet, Operation, OperationFailure, OperationFailures, Subject};

/// The operations needed to close the gap between desired and observed state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub to_add: LabelSet,
    pub to_remove: LabelSet,
    pub to_comment: Option<String>,

    /// Labels that were wanted but are not defined on the repository.
    pub skipped: LabelSet,
}

impl ReconciliationPlan {
    /// Returns `true` when executing the plan would make no remote calls.
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_comment.is_none()
    }
}

/// What actually happened when a plan was executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Labels successfully added.
    pub added: LabelSet,
    /// Labels successfully removed.
    pub removed: LabelSet,
    /// Whether the comment was posted.
    pub commented: bool,
    /// Labels skipped because the repository does not define them.
    pub skipped: LabelSet,
    /// Every call that failed.
    pub failures: OperationFailures,
}

impl ReconcileOutcome {
    /// `Ok(self)` when every call succeeded, otherwise the aggregated failures.
    pub fn into_result(self) -> Result<Self, OperationFailures> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(self.failures)
        }
    }
}

/// Executes `plan` against `tracker`: removals, then additions, then the
/// comment.
///
/// The calls are independent. A failure is logged with its context and
/// recorded; it does not stop the remaining calls.
pub async fn apply_plan(
    tracker: &dyn IssueTracker,
    subject: &Subject,
    plan: ReconciliationPlan,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome {
        skipped: plan.skipped,
        ..ReconcileOutcome::default()
    };

    for label in plan.to_remove {
        match tracker.remove_label(subject, &label).await {
            Ok(()) => {
                outcome.removed.insert(label);
            }
            Err(e) => {
                error!(
                    org = %subject.repo.owner,
                    repo = %subject.repo.name,
                    number = %subject.number,
                    label = %label,
                    error = %e,
                    "GitHub failed to remove label"
                );
                outcome.failures.push(OperationFailure {
                    operation: Operation::RemoveLabel,
                    subject: subject.clone(),
                    label: Some(label),
                    error: e,
                });
            }
        }
    }

    for label in plan.to_add {
        match tracker.add_label(subject, &label).await {
            Ok(()) => {
                outcome.added.insert(label);
            }
            Err(e) => {
                error!(
                    org = %subject.repo.owner,
                    repo = %subject.repo.name,
                    number = %subject.number,
                    label = %label,
                    error = %e,
                    "GitHub failed to add label"
                );
                outcome.failures.push(OperationFailure {
                    operation: Operation::AddLabel,
                    subject: subject.clone(),
                    label: Some(label),
                    error: e,
                });
            }
        }
    }

    if let Some(body) = plan.to_comment {
        match tracker.create_comment(subject, &body).await {
            Ok(()) => outcome.commented = true,
            Err(e) => {
                error!(
                    org = %subject.repo.owner,
                    repo = %subject.repo.name,
                    number = %subject.number,
                    error = %e,
                    "GitHub failed to create comment"
                );
                outcome.failures.push(OperationFailure {
                    operation: Operation::CreateComment,
                    subject: subject.clone(),
                    label: None,
                    error: e,
                });
            }
        }
    }

    info!(
        subject = %subject,
        added = ?outcome.added.names(),
        removed = ?outcome.removed.names(),
        commented = outcome.commented,
        failures = outcome.failures.len(),
        "Applied reconciliation plan"
    );

    outcome
}
