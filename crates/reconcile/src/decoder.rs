//! Webhook payload decoder.
//!
//! Turns a verified payload plus its declared kind into a [`DecodedEvent`].
//!
//! # Decoding Strategy
//!
//! 1. The kind comes from the `X-GitHub-Event` header.
//! 2. Unknown kinds return `Ok(None)` (ignored, not an error).
//! 3. Optional fields (`body`, `user`, `sender`) default when missing.
//! 4. Identifying fields (repository owner/name and a positive subject
//!    number) are required. Missing, empty, or non-positive values return
//!    `Err`, so a malformed event can never reach a handler and trigger a
//!    label change on the wrong subject.
//!
//! [`decode_archive_subject`] is a separate, kind-agnostic extraction used to
//! decide whether a delivery is archived at all.

use serde::Deserialize;
use thiserror::Error;

use crate::events::{
    CommentAction, CommentEvent, DecodedEvent, EventKind, PullRequestAction, PullRequestEvent,
};
use crate::{OwnerLogin, RepoName, RepoRef, Subject, SubjectNumber, UserLogin};

/// Why a payload was rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not JSON, or a field has the wrong JSON type.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Neither `repository.owner.login`/`repository.name` nor a well-formed
    /// `repository.full_name` is present.
    #[error("payload has no usable repository")]
    MissingRepository,

    /// The subject number is missing, zero, or negative.
    #[error("payload has no positive subject number (found {found:?})")]
    InvalidNumber {
        /// The raw value, if any was present.
        found: Option<i64>,
    },

    /// The payload has no `action` field.
    #[error("payload has no action")]
    MissingAction,
}

/// Decodes a payload into a typed event.
///
/// # Returns
///
/// * `Ok(Some(event))` - a known kind with all identifying fields present
/// * `Ok(None)` - a kind no handler is interested in, or a conversation
///   comment on a plain issue rather than a pull request
/// * `Err(e)` - malformed payload
pub fn decode(kind: &str, payload: &[u8]) -> Result<Option<DecodedEvent>, DecodeError> {
    let Some(kind) = EventKind::from_header(kind) else {
        return Ok(None);
    };
    match kind {
        EventKind::PullRequest => {
            decode_pull_request(payload).map(|e| Some(DecodedEvent::PullRequest(e)))
        }
        EventKind::ReviewComment => {
            decode_review_comment(payload).map(|e| Some(DecodedEvent::ReviewComment(e)))
        }
        EventKind::IssueComment => {
            decode_issue_comment(payload).map(|opt| opt.map(DecodedEvent::IssueComment))
        }
    }
}

/// Extracts the pull request an arbitrary delivery is about.
///
/// Works for any event kind that carries `repository` and `pull_request`
/// objects. Deliveries without both are not archived.
pub fn decode_archive_subject(payload: &[u8]) -> Result<Subject, DecodeError> {
    #[derive(Debug, Deserialize)]
    struct Raw {
        repository: Option<RawRepository>,
        pull_request: Option<RawNumbered>,
    }

    let raw: Raw = serde_json::from_slice(payload)?;
    let repo = resolve_repository(raw.repository)?;
    let number = positive_number(raw.pull_request.and_then(|pr| pr.number))?;
    Ok(Subject::new(repo, number))
}

// ============================================================================
// Raw payload structures
//
// Everything is optional; required fields are checked explicitly afterwards so
// the error says which identifying field was missing.
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawRepository {
    full_name: Option<String>,
    name: Option<String>,
    owner: Option<RawUser>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUser {
    login: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNumbered {
    number: Option<i64>,
    user: Option<RawUser>,
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawComment {
    body: Option<String>,
    user: Option<RawUser>,
}

fn resolve_repository(raw: Option<RawRepository>) -> Result<RepoRef, DecodeError> {
    let raw = raw.ok_or(DecodeError::MissingRepository)?;

    let owner = raw.owner.and_then(|o| o.login).and_then(OwnerLogin::new);
    let name = raw.name.and_then(RepoName::new);
    if let (Some(owner), Some(name)) = (owner, name) {
        return Ok(RepoRef::new(owner, name));
    }

    raw.full_name
        .as_deref()
        .and_then(RepoRef::from_full_name)
        .ok_or(DecodeError::MissingRepository)
}

fn positive_number(raw: Option<i64>) -> Result<SubjectNumber, DecodeError> {
    raw.and_then(|n| u64::try_from(n).ok())
        .and_then(SubjectNumber::new)
        .ok_or(DecodeError::InvalidNumber { found: raw })
}

fn login(user: Option<RawUser>) -> Option<UserLogin> {
    user.and_then(|u| u.login).and_then(UserLogin::new)
}

// ============================================================================
// pull_request
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: Option<String>,
    number: Option<i64>,
    pull_request: Option<RawNumbered>,
    repository: Option<RawRepository>,
    sender: Option<RawUser>,
}

fn decode_pull_request(payload: &[u8]) -> Result<PullRequestEvent, DecodeError> {
    let raw: RawPullRequestPayload = serde_json::from_slice(payload)?;
    let action = raw.action.ok_or(DecodeError::MissingAction)?;
    let repo = resolve_repository(raw.repository)?;

    let pull_request = raw.pull_request.unwrap_or_default();
    let number = positive_number(pull_request.number.or(raw.number))?;

    Ok(PullRequestEvent {
        action: PullRequestAction::parse(&action),
        subject: Subject::new(repo, number),
        author: login(pull_request.user),
        sender: login(raw.sender),
    })
}

// ============================================================================
// pull_request_review_comment
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawReviewCommentPayload {
    action: Option<String>,
    comment: Option<RawComment>,
    pull_request: Option<RawNumbered>,
    repository: Option<RawRepository>,
}

fn decode_review_comment(payload: &[u8]) -> Result<CommentEvent, DecodeError> {
    let raw: RawReviewCommentPayload = serde_json::from_slice(payload)?;
    let action = raw.action.ok_or(DecodeError::MissingAction)?;
    let repo = resolve_repository(raw.repository)?;

    let pull_request = raw.pull_request.unwrap_or_default();
    let number = positive_number(pull_request.number)?;
    let comment = raw.comment.unwrap_or_default();

    Ok(CommentEvent {
        action: CommentAction::parse(&action),
        subject: Subject::new(repo, number),
        author: login(pull_request.user),
        commenter: login(comment.user),
        body: comment.body.unwrap_or_default(),
    })
}

// ============================================================================
// issue_comment
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawIssueCommentPayload {
    action: Option<String>,
    comment: Option<RawComment>,
    issue: Option<RawNumbered>,
    repository: Option<RawRepository>,
}

fn decode_issue_comment(payload: &[u8]) -> Result<Option<CommentEvent>, DecodeError> {
    let raw: RawIssueCommentPayload = serde_json::from_slice(payload)?;
    let action = raw.action.ok_or(DecodeError::MissingAction)?;
    let repo = resolve_repository(raw.repository)?;

    let issue = raw.issue.unwrap_or_default();
    let number = positive_number(issue.number)?;

    // A conversation comment on a plain issue: nothing here applies to it.
    if issue.pull_request.is_none() {
        return Ok(None);
    }

    let comment = raw.comment.unwrap_or_default();
    Ok(Some(CommentEvent {
        action: CommentAction::parse(&action),
        subject: Subject::new(repo, number),
        author: login(issue.user),
        commenter: login(comment.user),
        body: comment.body.unwrap_or_default(),
    }))
}
