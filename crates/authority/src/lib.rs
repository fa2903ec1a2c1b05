//! LabelSmith agreement authority adapter.
//!
//! Implements [`reconcile::ports::AgreementAuthority`] and
//! [`reconcile::ports::AuthorityConnector`] over gRPC with [`tonic`]. The
//! channel uses TLS with the platform trust store for `https://` endpoints and
//! every call carries a bearer credential read from a configured file.
//!
//! The service definition is small enough that the message types in
//! [`proto`] are written by hand with `prost` derives rather than generated.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport, TLS and credential handling live here. The
//! [`reconcile`] crate sees only the port traits; it decides when to connect.

mod client;
pub mod proto;

pub use client::{load_credential, GrpcAuthority, GrpcConnector, DEFAULT_TIMEOUT};
