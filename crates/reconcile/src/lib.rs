//! Core domain for LabelSmith.
//!
//! This crate turns verified webhook payloads into typed events, routes them to
//! handlers, and reconciles the labels and agreement status of pull requests
//! against what the repository and the agreement authority say they should be.
//! It also computes where each accepted delivery is archived.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no I/O of its
//! own. The GitHub API, the agreement authority and the archive store are
//! reached only through the traits in [`ports`]; infrastructure crates supply
//! the implementations and the CLI wires them together.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`OwnerLogin`, `LabelName`, `Subject`, etc.) |
//! | [`types`] | Shared value types (`LabelSet`, `Verdict`, `Timestamp`) |
//! | [`errors`] | Per-component error types and `OperationFailures` |
//! | [`events`] | Decoded event model |
//! | [`decoder`] | Payload to event decoding |
//! | [`router`] | Handler table and dispatch |
//! | [`plan`] | Reconciliation plans and best-effort execution |
//! | [`labels`] | Default label reconciliation |
//! | [`status`] | Agreement status reconciliation |
//! | [`archive`] | Archive partitioning and the archival sink |
//! | [`settings`] | Hot-swappable runtime settings |
//! | [`capability`] | Lazily resolved capabilities |
//! | [`ports`] | Traits implemented by infrastructure crates |

pub mod archive;
pub mod capability;
pub mod decoder;
pub mod errors;
pub mod events;
pub mod identifiers;
pub mod labels;
pub mod plan;
pub mod ports;
pub mod router;
pub mod settings;
pub mod status;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use archive::{content_digest, ArchivalSink, ArchivePartition, ArchivedEventRecord};
pub use decoder::{decode, decode_archive_subject, DecodeError};
pub use errors::{
    ArchiveError, AuthorityError, HandlerError, Operation, OperationFailure, OperationFailures,
    TrackerError,
};
pub use events::{
    CommentAction, CommentEvent, DecodedEvent, EventKind, PullRequestAction, PullRequestEvent,
};
pub use identifiers::{
    DeliveryId, LabelName, OwnerLogin, RepoName, RepoRef, Subject, SubjectNumber, UserLogin,
};
pub use labels::{plan_labels, reconcile_labels, DefaultLabelsHandler};
pub use plan::{apply_plan, ReconcileOutcome, ReconciliationPlan};
pub use router::{
    DispatchReport, EventHandler, HandlerContext, HandlerFailure, Router, RouterBuilder,
};
pub use settings::{AgreementSettings, ArchiveSettings, Settings, SettingsHandle};
pub use status::{plan_status, AgreementStatusHandler, StatusPolicy, StatusReconciler};
pub use types::{LabelSet, Timestamp, Verdict};
