//! Contributor agreement status: mirror the external authority's verdict onto
//! a pull request as labels, and ask unsigned authors to sign.
//!
//! The two branches are mutually exclusive and chosen only by the verdict:
//!
//! - signed: remove the unsigned and blocked labels, add the signed label;
//! - unsigned: remove the signed label, add the unsigned and blocked labels,
//!   post one comment.
//!
//! Removals only target labels that are present and additions only target
//! labels that are absent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::capability::Memoized;
use crate::events::{CommentAction, DecodedEvent, PullRequestAction};
use crate::plan::{apply_plan, ReconcileOutcome, ReconciliationPlan};
use crate::ports::{AgreementAuthority, AuthorityConnector, IssueTracker};
use crate::router::{EventHandler, HandlerContext};
use crate::settings::{
    AgreementSettings, DEFAULT_BLOCKED_LABEL, DEFAULT_SIGNED_LABEL, DEFAULT_UNSIGNED_COMMENT,
    DEFAULT_UNSIGNED_LABEL,
};
use crate::{AuthorityError, HandlerError, LabelSet, OperationFailures, Subject, UserLogin, Verdict};

/// Comment command that asks for the status to be re-checked.
pub const CHECK_COMMAND: &str = "/check-cla";

/// Label names and comment text the status reconciler works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPolicy {
    pub signed_label: String,
    pub unsigned_label: String,
    pub blocked_label: String,
    pub comment: String,
}

impl StatusPolicy {
    /// Builds a policy from settings, falling back to the defaults for any
    /// blank value.
    pub fn from_settings(settings: &AgreementSettings) -> Self {
        Self {
            signed_label: or_default(&settings.signed_label, DEFAULT_SIGNED_LABEL),
            unsigned_label: or_default(&settings.unsigned_label, DEFAULT_UNSIGNED_LABEL),
            blocked_label: or_default(&settings.blocked_label, DEFAULT_BLOCKED_LABEL),
            comment: or_default(&settings.comment, DEFAULT_UNSIGNED_COMMENT),
        }
    }

    fn signed(&self) -> LabelSet {
        LabelSet::from_names([self.signed_label.as_str()])
    }

    fn unsigned(&self) -> LabelSet {
        LabelSet::from_names([self.unsigned_label.as_str(), self.blocked_label.as_str()])
    }
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self::from_settings(&AgreementSettings::default())
    }
}

fn or_default(value: &str, default: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        default.to_owned()
    } else {
        value.to_owned()
    }
}

/// Computes the label changes and comment for `verdict` given the labels
/// currently on the subject.
pub fn plan_status(
    verdict: Verdict,
    current: &LabelSet,
    policy: &StatusPolicy,
) -> ReconciliationPlan {
    let (stale, wanted, comment) = match verdict {
        Verdict::Signed => (policy.unsigned(), policy.signed(), None),
        Verdict::Unsigned => (
            policy.signed(),
            policy.unsigned(),
            Some(policy.comment.clone()),
        ),
    };
    ReconciliationPlan {
        to_remove: stale.intersection(current),
        to_add: wanted.difference(current),
        to_comment: comment,
        skipped: LabelSet::new(),
    }
}

/// Applies agreement verdicts to subjects.
#[derive(Debug, Clone, Default)]
pub struct StatusReconciler {
    policy: StatusPolicy,
}

impl StatusReconciler {
    pub fn new(policy: StatusPolicy) -> Self {
        Self { policy }
    }

    pub fn plan(&self, verdict: Verdict, current: &LabelSet) -> ReconciliationPlan {
        plan_status(verdict, current, &self.policy)
    }

    /// Plans and executes the status change. Every call is attempted; if any
    /// failed, all failures are returned together once the rest have run.
    pub async fn apply(
        &self,
        tracker: &dyn IssueTracker,
        subject: &Subject,
        verdict: Verdict,
        current: &LabelSet,
    ) -> Result<ReconcileOutcome, OperationFailures> {
        let plan = self.plan(verdict, current);
        if plan.is_noop() {
            debug!(subject = %subject, verdict = %verdict, "Agreement status already up to date");
        }
        apply_plan(tracker, subject, plan).await.into_result()
    }
}

/// Returns `true` if `body` contains [`CHECK_COMMAND`] as a standalone word.
pub fn has_check_command(body: &str) -> bool {
    body.split_whitespace().any(|word| word == CHECK_COMMAND)
}

/// Checks pull request authors against the agreement authority.
///
/// Runs when a pull request is opened, and when a review comment or pull
/// request conversation comment containing [`CHECK_COMMAND`] is created or
/// edited. The authority client is resolved through the connector on first
/// use and kept for the handler's lifetime.
pub struct AgreementStatusHandler {
    connector: Arc<dyn AuthorityConnector>,
    authority: Memoized<Arc<dyn AgreementAuthority>>,
}

impl AgreementStatusHandler {
    pub fn new(connector: Arc<dyn AuthorityConnector>) -> Self {
        Self {
            connector,
            authority: Memoized::new(),
        }
    }

    async fn authority(&self) -> Result<&Arc<dyn AgreementAuthority>, AuthorityError> {
        self.authority
            .get_or_try_init(|| async {
                let authority = self.connector.connect().await?;
                info!("Connected to agreement authority");
                Ok::<_, AuthorityError>(authority)
            })
            .await
    }

    /// Picks the subject and author to check, or `None` if the event is not a
    /// trigger.
    fn trigger<'a>(event: &'a DecodedEvent) -> Option<(&'a Subject, Option<&'a UserLogin>)> {
        match event {
            DecodedEvent::PullRequest(pr) if pr.action == PullRequestAction::Opened => {
                Some((&pr.subject, pr.author.as_ref()))
            }
            DecodedEvent::ReviewComment(c) | DecodedEvent::IssueComment(c)
                if matches!(c.action, CommentAction::Created | CommentAction::Edited)
                    && has_check_command(&c.body) =>
            {
                Some((&c.subject, c.author.as_ref()))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for AgreementStatusHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementStatusHandler")
            .field("connected", &self.authority.get().is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventHandler for AgreementStatusHandler {
    fn name(&self) -> &'static str {
        "agreement-status"
    }

    async fn handle(&self, event: &DecodedEvent, ctx: &HandlerContext) -> Result<(), HandlerError> {
        let Some((subject, author)) = Self::trigger(event) else {
            return Ok(());
        };
        let Some(author) = author else {
            warn!(subject = %subject, "Pull request has no author; skipping agreement check");
            return Ok(());
        };

        let verdict = self.authority().await?.signed_status(author).await?;
        info!(subject = %subject, author = %author, verdict = %verdict, "Agreement status resolved");

        let current = ctx.github.issue_labels(subject).await?;
        let policy = StatusPolicy::from_settings(&ctx.settings.agreement);
        StatusReconciler::new(policy)
            .apply(ctx.github.as_ref(), subject, verdict, &current)
            .await?;
        Ok(())
    }
}
