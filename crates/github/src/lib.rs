//! LabelSmith GitHub infrastructure adapter.
//!
//! Implements the [`reconcile::ports::IssueTracker`] port over the GitHub REST
//! v3 API with [`reqwest`]:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | `add_label` | `POST /repos/{owner}/{repo}/issues/{number}/labels` |
//! | `remove_label` | `DELETE /repos/{owner}/{repo}/issues/{number}/labels/{label}` |
//! | `issue_labels` | `GET /repos/{owner}/{repo}/issues/{number}/labels` (paginated) |
//! | `repo_labels` | `GET /repos/{owner}/{repo}/labels` (paginated) |
//! | `create_comment` | `POST /repos/{owner}/{repo}/issues/{number}/comments` |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. Each port
//! method is exactly one logical call; nothing is retried here. Removing a
//! label that is not on the subject (HTTP 404) counts as success.

mod client;

pub use client::{RestTracker, DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT};

use thiserror::Error;

/// Why a [`RestTracker`] could not be built.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid GitHub API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("GitHub token is empty")]
    MissingToken,

    #[error("GitHub token contains characters not allowed in an HTTP header")]
    InvalidToken,

    #[error("failed to build HTTP client: {0}")]
    Http(#[source] reqwest::Error),
}
