//! Error types shared across the LabelSmith domain.
//!
//! Each port has its own error enum ([`TrackerError`], [`AuthorityError`],
//! [`ArchiveError`]) so adapters can report failures without leaking transport
//! types into this crate. [`OperationFailures`] is the aggregate a
//! reconciliation returns after it has attempted every independent remote call.
//!
//! Nothing in here is fatal to the process: every error is scoped to a single
//! delivery, and most are logged and swallowed at a component boundary.

use thiserror::Error;

use crate::{LabelName, Subject};

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// A failure talking to the remote issue tracker (GitHub).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The API answered with a non-success status code.
    #[error("GitHub API returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The request never produced a response (DNS, TLS, connection reset, timeout).
    #[error("GitHub API request failed: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The API answered successfully but the body could not be decoded.
    #[error("GitHub API response could not be decoded: {message}")]
    InvalidResponse {
        /// Description of the decoding failure.
        message: String,
    },
}

/// A failure resolving or querying the external agreement authority.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    /// No authority endpoint or credential is configured.
    #[error("agreement authority is not configured: {message}")]
    NotConfigured {
        /// What is missing.
        message: String,
    },

    /// The credential file could not be read or is not usable.
    #[error("agreement authority credential is unusable: {message}")]
    Credential {
        /// Description of the credential problem.
        message: String,
    },

    /// The connection to the authority could not be established.
    #[error("agreement authority is unavailable: {message}")]
    Unavailable {
        /// Description of the connection failure.
        message: String,
    },

    /// The authority rejected or failed the status lookup.
    #[error("agreement authority lookup failed: {message}")]
    Rpc {
        /// Status code and message reported by the authority.
        message: String,
    },
}

/// A failure writing to the archive store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// No bucket is configured, so there is nowhere to write.
    #[error("no archive bucket configured")]
    MissingBucket,

    /// The computed object path is not acceptable to the store.
    #[error("invalid archive path '{path}': {reason}")]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The storage backend failed the write.
    #[error("archive write to '{path}' failed: {message}")]
    Write {
        /// Object path that was being written.
        path: String,
        /// Backend error description.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Aggregated remote-call failures
// ---------------------------------------------------------------------------

/// One kind of remote mutation or lookup performed during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AddLabel,
    RemoveLabel,
    CreateComment,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::AddLabel => write!(f, "add label"),
            Operation::RemoveLabel => write!(f, "remove label"),
            Operation::CreateComment => write!(f, "create comment"),
        }
    }
}

/// A single failed remote call, with enough context to act on the log line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} on {subject}{suffix} failed: {error}", suffix = label_suffix(.label))]
pub struct OperationFailure {
    /// What was being attempted.
    pub operation: Operation,
    /// The issue / pull request it targeted.
    pub subject: Subject,
    /// The label involved, for label operations.
    pub label: Option<LabelName>,
    /// The underlying tracker error.
    pub error: TrackerError,
}

fn label_suffix(label: &Option<LabelName>) -> String {
    match label {
        Some(l) => format!(" ({l})"),
        None => String::new(),
    }
}

/// Zero or more [`OperationFailure`]s collected across independent calls.
///
/// Reconcilers attempt every call in a plan and collect failures here instead
/// of stopping at the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationFailures(Vec<OperationFailure>);

impl OperationFailures {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, failure: OperationFailure) {
        self.0.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationFailure> {
        self.0.iter()
    }

    /// `Ok(())` when nothing failed, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), OperationFailures> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for OperationFailures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} remote operation(s) failed", self.0.len())?;
        for failure in &self.0 {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for OperationFailures {}

// ---------------------------------------------------------------------------
// Handler errors
// ---------------------------------------------------------------------------

/// Why a routed handler did not complete cleanly.
///
/// The router logs these and records them in its dispatch report; they never
/// affect sibling handlers or the HTTP response.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A lookup the handler needed before it could plan failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// The agreement authority could not be resolved or queried.
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// Some planned remote calls failed; the rest were still attempted.
    #[error(transparent)]
    Operations(#[from] OperationFailures),

    /// The handler panicked or its task was cancelled.
    #[error("handler aborted: {message}")]
    Aborted { message: String },
}
