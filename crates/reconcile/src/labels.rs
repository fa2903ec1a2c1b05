//! Label reconciliation: make a subject carry every desired label that its
//! repository defines.
//!
//! Planning is pure set algebra over three sets:
//!
//! - `D`: the labels the subject should carry,
//! - `R`: the repository's label vocabulary,
//! - `C`: the labels the subject currently carries.
//!
//! `to_add = (D − C) ∩ R` and `skipped = (D − C) − R`. Labels are only ever
//! added here, never removed.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::events::{DecodedEvent, PullRequestAction};
use crate::plan::{apply_plan, ReconcileOutcome, ReconciliationPlan};
use crate::ports::IssueTracker;
use crate::router::{EventHandler, HandlerContext};
use crate::{HandlerError, LabelSet, Subject, TrackerError};

/// Computes which desired labels to add and which to skip.
pub fn plan_labels(
    desired: &LabelSet,
    vocabulary: &LabelSet,
    current: &LabelSet,
) -> ReconciliationPlan {
    let missing = desired.difference(current);
    ReconciliationPlan {
        to_add: missing.intersection(vocabulary),
        to_remove: LabelSet::new(),
        to_comment: None,
        skipped: missing.difference(vocabulary),
    }
}

/// Brings `subject` up to the `desired` label set.
///
/// The repository vocabulary and the subject's current labels are fetched
/// first; if either lookup fails nothing is changed and the error is returned.
/// Desired labels the repository does not define are logged once as a warning
/// batch. Add failures are logged and collected in the outcome.
pub async fn reconcile_labels(
    tracker: &dyn IssueTracker,
    subject: &Subject,
    desired: &LabelSet,
) -> Result<ReconcileOutcome, TrackerError> {
    if desired.is_empty() {
        return Ok(ReconcileOutcome::default());
    }

    let vocabulary = tracker.repo_labels(&subject.repo).await?;
    let current = tracker.issue_labels(subject).await?;
    let plan = plan_labels(desired, &vocabulary, &current);

    if !plan.skipped.is_empty() {
        warn!(
            org = %subject.repo.owner,
            repo = %subject.repo.name,
            number = %subject.number,
            labels = ?plan.skipped.names(),
            "Skipping labels the repository does not define"
        );
    }

    Ok(apply_plan(tracker, subject, plan).await)
}

/// Applies the configured default labels to newly opened or reopened pull
/// requests.
#[derive(Debug, Default)]
pub struct DefaultLabelsHandler;

impl DefaultLabelsHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for DefaultLabelsHandler {
    fn name(&self) -> &'static str {
        "default-labels"
    }

    async fn handle(&self, event: &DecodedEvent, ctx: &HandlerContext) -> Result<(), HandlerError> {
        let DecodedEvent::PullRequest(pr) = event else {
            return Ok(());
        };
        if !matches!(
            pr.action,
            PullRequestAction::Opened | PullRequestAction::Reopened
        ) {
            return Ok(());
        }

        let desired = ctx.settings.default_labels_for(&pr.subject.repo);
        if desired.is_empty() {
            debug!(subject = %pr.subject, "No default labels configured");
            return Ok(());
        }

        let outcome = reconcile_labels(ctx.github.as_ref(), &pr.subject, &desired).await?;
        outcome.into_result()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PullRequestEvent;
    use crate::settings::Settings;
    use crate::testing::{FakeTracker, TrackerCall};
    use crate::LabelName;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tracing::Span;

    fn set(names: &[&str]) -> LabelSet {
        LabelSet::from_names(names.iter().copied())
    }

    fn label(name: &str) -> LabelName {
        LabelName::new(name).unwrap()
    }

    // -----------------------------------------------------------------------
    // plan_labels
    // -----------------------------------------------------------------------

    #[test]
    fn adds_only_missing_labels_the_repo_defines() {
        let plan = plan_labels(&set(&["a", "b", "c"]), &set(&["a", "b", "z"]), &set(&["a"]));
        assert_eq!(plan.to_add, set(&["b"]));
        assert_eq!(plan.skipped, set(&["c"]));
        assert!(plan.to_remove.is_empty());
        assert!(plan.to_comment.is_none());
    }

    #[test]
    fn already_satisfied_is_noop() {
        let plan = plan_labels(&set(&["a"]), &set(&["a"]), &set(&["a", "extra"]));
        assert!(plan.is_noop());
        assert!(plan.skipped.is_empty());
    }

    fn names() -> impl Strategy<Value = LabelSet> {
        prop::collection::btree_set("[a-e]", 0..5).prop_map(|s| LabelSet::from_names(s))
    }

    proptest! {
        #[test]
        fn to_add_is_missing_within_vocabulary(d in names(), r in names(), c in names()) {
            let plan = plan_labels(&d, &r, &c);
            prop_assert_eq!(plan.to_add.clone(), d.difference(&c).intersection(&r));
            prop_assert_eq!(plan.skipped, d.difference(&c).difference(&r));
            prop_assert!(plan.to_add.iter().all(|l| !c.contains(l)));
        }

        #[test]
        fn planning_is_idempotent(d in names(), r in names(), c in names()) {
            let first = plan_labels(&d, &r, &c);
            let after = c.union(&first.to_add);
            let second = plan_labels(&d, &r, &after);
            prop_assert!(second.to_add.is_empty());
        }
    }

    // -----------------------------------------------------------------------
    // reconcile_labels
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn adds_missing_defined_label() {
        let tracker = FakeTracker::new();
        let subject = tracker.subject("org/repo", 1);
        tracker.set_repo_labels(&subject.repo, ["lgtm", "bug"]);

        let outcome = reconcile_labels(&tracker, &subject, &set(&["lgtm"]))
            .await
            .unwrap();

        assert_eq!(outcome.added, set(&["lgtm"]));
        assert_eq!(tracker.labels_on(&subject), set(&["lgtm"]));
    }

    #[tokio::test]
    async fn undefined_label_is_skipped_without_add_call() {
        let tracker = FakeTracker::new();
        let subject = tracker.subject("org/repo", 1);
        tracker.set_repo_labels(&subject.repo, ["bug"]);

        let outcome = reconcile_labels(&tracker, &subject, &set(&["lgtm"]))
            .await
            .unwrap();

        assert_eq!(outcome.skipped, set(&["lgtm"]));
        assert_eq!(tracker.add_calls(), 0);
    }

    #[tokio::test]
    async fn present_label_makes_no_calls() {
        let tracker = FakeTracker::new();
        let subject = tracker.subject("org/repo", 1);
        tracker.set_repo_labels(&subject.repo, ["lgtm"]);
        tracker.set_issue_labels(&subject, ["lgtm"]);

        let outcome = reconcile_labels(&tracker, &subject, &set(&["lgtm"]))
            .await
            .unwrap();

        assert!(outcome.added.is_empty());
        assert_eq!(tracker.add_calls(), 0);
        assert_eq!(tracker.remove_calls(), 0);
    }

    #[tokio::test]
    async fn lookup_failure_aborts_before_any_change() {
        let tracker = FakeTracker::new();
        let subject = tracker.subject("org/repo", 1);
        tracker.set_repo_labels(&subject.repo, ["lgtm"]);
        tracker.fail_lookups();

        let err = reconcile_labels(&tracker, &subject, &set(&["lgtm"])).await;

        assert!(err.is_err());
        assert_eq!(tracker.add_calls(), 0);
    }

    #[tokio::test]
    async fn add_failure_does_not_stop_other_adds() {
        let tracker = FakeTracker::new();
        let subject = tracker.subject("org/repo", 1);
        tracker.set_repo_labels(&subject.repo, ["a", "b"]);
        tracker.fail_add(&label("a"));

        let outcome = reconcile_labels(&tracker, &subject, &set(&["a", "b"]))
            .await
            .unwrap();

        assert_eq!(outcome.added, set(&["b"]));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(tracker.add_calls(), 2);
    }

    // -----------------------------------------------------------------------
    // DefaultLabelsHandler
    // -----------------------------------------------------------------------

    fn pr_event(tracker: &FakeTracker, action: PullRequestAction) -> DecodedEvent {
        DecodedEvent::PullRequest(PullRequestEvent {
            action,
            subject: tracker.subject("org/repo", 4),
            author: None,
            sender: None,
        })
    }

    fn context(tracker: Arc<FakeTracker>, labels: &[&str]) -> HandlerContext {
        let mut settings = Settings::default();
        settings.default_labels.insert(
            "org/repo".into(),
            labels.iter().map(|l| l.to_string()).collect(),
        );
        HandlerContext::new(tracker, Arc::new(settings), Span::none())
    }

    #[tokio::test]
    async fn handler_labels_opened_pull_requests() {
        let tracker = Arc::new(FakeTracker::new());
        let event = pr_event(&tracker, PullRequestAction::Opened);
        tracker.set_repo_labels(&event.subject().repo, ["lgtm"]);
        let ctx = context(tracker.clone(), &["lgtm"]);

        DefaultLabelsHandler::new().handle(&event, &ctx).await.unwrap();

        assert_eq!(
            tracker.calls().last(),
            Some(&TrackerCall::AddLabel(event.subject().clone(), label("lgtm")))
        );
    }

    #[tokio::test]
    async fn handler_ignores_other_actions() {
        let tracker = Arc::new(FakeTracker::new());
        let event = pr_event(&tracker, PullRequestAction::Closed);
        let ctx = context(tracker.clone(), &["lgtm"]);

        DefaultLabelsHandler::new().handle(&event, &ctx).await.unwrap();

        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn handler_reports_add_failures() {
        let tracker = Arc::new(FakeTracker::new());
        let event = pr_event(&tracker, PullRequestAction::Reopened);
        tracker.set_repo_labels(&event.subject().repo, ["lgtm"]);
        tracker.fail_add(&label("lgtm"));
        let ctx = context(tracker.clone(), &["lgtm"]);

        let err = DefaultLabelsHandler::new().handle(&event, &ctx).await;

        assert!(matches!(err, Err(HandlerError::Operations(f)) if f.len() == 1));
    }
}
