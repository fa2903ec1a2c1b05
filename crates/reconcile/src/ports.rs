//! Port traits implemented by the infrastructure crates.
//!
//! | Port | Implemented by |
//! |------|----------------|
//! | [`IssueTracker`] | `github::RestTracker` |
//! | [`AgreementAuthority`] / [`AuthorityConnector`] | `authority::GrpcConnector` |
//! | [`ArchiveStore`] | `archive::FsArchiveStore` |
//!
//! All ports must be safe for concurrent use: one instance is shared by every
//! in-flight delivery.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    ArchiveError, AuthorityError, LabelName, LabelSet, RepoRef, Subject, TrackerError, UserLogin,
    Verdict,
};

/// The remote resource API: labels and comments on issues / pull requests.
///
/// Every method is exactly one remote call. Nothing here batches or retries.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Applies `label` to the subject.
    async fn add_label(&self, subject: &Subject, label: &LabelName) -> Result<(), TrackerError>;

    /// Removes `label` from the subject. Removing an absent label succeeds.
    async fn remove_label(&self, subject: &Subject, label: &LabelName)
        -> Result<(), TrackerError>;

    /// Returns the labels currently applied to the subject.
    async fn issue_labels(&self, subject: &Subject) -> Result<LabelSet, TrackerError>;

    /// Returns every label defined on the repository (its vocabulary).
    async fn repo_labels(&self, repo: &RepoRef) -> Result<LabelSet, TrackerError>;

    /// Posts a comment on the subject.
    async fn create_comment(&self, subject: &Subject, body: &str) -> Result<(), TrackerError>;
}

/// The external authority that knows whether a contributor signed the agreement.
#[async_trait]
pub trait AgreementAuthority: Send + Sync {
    async fn signed_status(&self, login: &UserLogin) -> Result<Verdict, AuthorityError>;
}

/// Creates an [`AgreementAuthority`] on first use.
///
/// Connecting is expensive (TLS handshake, credential load), so handlers hold
/// a connector and memoize its result rather than connecting per event.
#[async_trait]
pub trait AuthorityConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn AgreementAuthority>, AuthorityError>;
}

/// Result of a create-only archive write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new object was created.
    Created,
    /// An object already existed at this path; nothing was written.
    AlreadyPresent,
}

/// Durable, append-only object storage for archived deliveries.
///
/// Writes must be all-or-nothing: a reader never observes a partially written
/// object.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn write(
        &self,
        bucket: &str,
        path: &str,
        payload: &[u8],
    ) -> Result<WriteOutcome, ArchiveError>;
}
