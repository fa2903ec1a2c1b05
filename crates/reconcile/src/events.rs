//! Typed webhook events.
//!
//! Only the event kinds some handler reacts to are modelled. Every variant
//! carries a validated [`Subject`]; events whose repository or number is
//! missing never get this far (see [`crate::decoder`]).
//!
//! | Kind (`X-GitHub-Event`) | Variant |
//! |-------------------------|---------|
//! | `pull_request` | [`DecodedEvent::PullRequest`] |
//! | `pull_request_review_comment` | [`DecodedEvent::ReviewComment`] |
//! | `issue_comment` (on a pull request) | [`DecodedEvent::IssueComment`] |

use serde::{Deserialize, Serialize};

use crate::{Subject, UserLogin};

/// The routing key of an event: its `X-GitHub-Event` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PullRequest,
    #[serde(rename = "pull_request_review_comment")]
    ReviewComment,
    IssueComment,
}

impl EventKind {
    /// Parses an `X-GitHub-Event` header value. Unknown kinds return `None`.
    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "pull_request" => Some(EventKind::PullRequest),
            "pull_request_review_comment" => Some(EventKind::ReviewComment),
            "issue_comment" => Some(EventKind::IssueComment),
            _ => None,
        }
    }

    /// Returns the header spelling of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PullRequest => "pull_request",
            EventKind::ReviewComment => "pull_request_review_comment",
            EventKind::IssueComment => "issue_comment",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action performed on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PullRequestAction {
    Opened,
    Reopened,
    Closed,
    Edited,
    Synchronize,
    Labeled,
    Unlabeled,
    /// Any action this crate does not name. Handlers ignore it.
    Other(String),
}

impl PullRequestAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "opened" => Self::Opened,
            "reopened" => Self::Reopened,
            "closed" => Self::Closed,
            "edited" => Self::Edited,
            "synchronize" => Self::Synchronize,
            "labeled" => Self::Labeled,
            "unlabeled" => Self::Unlabeled,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Opened => "opened",
            Self::Reopened => "reopened",
            Self::Closed => "closed",
            Self::Edited => "edited",
            Self::Synchronize => "synchronize",
            Self::Labeled => "labeled",
            Self::Unlabeled => "unlabeled",
            Self::Other(other) => other,
        }
    }
}

/// Action performed on a comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommentAction {
    Created,
    Edited,
    Deleted,
    /// Any action this crate does not name. Handlers ignore it.
    Other(String),
}

impl CommentAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "created" => Self::Created,
            "edited" => Self::Edited,
            "deleted" => Self::Deleted,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Edited => "edited",
            Self::Deleted => "deleted",
            Self::Other(other) => other,
        }
    }
}

/// A pull request was opened, reopened, closed, etc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,

    /// The pull request.
    pub subject: Subject,

    /// Login of the pull request's author, when the payload names one.
    pub author: Option<UserLogin>,

    /// Login of whoever triggered the delivery.
    pub sender: Option<UserLogin>,
}

/// A comment was posted on a pull request, either inline on the diff
/// (`pull_request_review_comment`) or on the conversation tab
/// (`issue_comment`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEvent {
    pub action: CommentAction,

    /// The pull request the comment belongs to.
    pub subject: Subject,

    /// Login of the pull request's author, when the payload names one.
    pub author: Option<UserLogin>,

    /// Login of the comment's author.
    pub commenter: Option<UserLogin>,

    /// Comment text. Empty when the payload carried none.
    pub body: String,
}

/// A decoded webhook event, ready for routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodedEvent {
    PullRequest(PullRequestEvent),
    ReviewComment(CommentEvent),
    IssueComment(CommentEvent),
}

impl DecodedEvent {
    /// Returns the routing key of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            DecodedEvent::PullRequest(_) => EventKind::PullRequest,
            DecodedEvent::ReviewComment(_) => EventKind::ReviewComment,
            DecodedEvent::IssueComment(_) => EventKind::IssueComment,
        }
    }

    /// Returns the pull request this event concerns.
    pub fn subject(&self) -> &Subject {
        match self {
            DecodedEvent::PullRequest(e) => &e.subject,
            DecodedEvent::ReviewComment(e) | DecodedEvent::IssueComment(e) => &e.subject,
        }
    }

    /// Returns the action as it appeared in the payload.
    pub fn action(&self) -> &str {
        match self {
            DecodedEvent::PullRequest(e) => e.action.as_str(),
            DecodedEvent::ReviewComment(e) | DecodedEvent::IssueComment(e) => e.action.as_str(),
        }
    }

    /// Returns the pull request author, when known.
    pub fn author(&self) -> Option<&UserLogin> {
        match self {
            DecodedEvent::PullRequest(e) => e.author.as_ref(),
            DecodedEvent::ReviewComment(e) | DecodedEvent::IssueComment(e) => e.author.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_round_trips_header_spelling() {
        for kind in [
            EventKind::PullRequest,
            EventKind::ReviewComment,
            EventKind::IssueComment,
        ] {
            assert_eq!(EventKind::from_header(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_header("push"), None);
    }

    #[test]
    fn unknown_actions_are_preserved() {
        let action = PullRequestAction::parse("ready_for_review");
        assert_eq!(action, PullRequestAction::Other("ready_for_review".into()));
        assert_eq!(action.as_str(), "ready_for_review");
        assert_eq!(CommentAction::parse("edited"), CommentAction::Edited);
    }
}
