//! LabelSmith webhook ingress.
//!
//! Receives GitHub webhook deliveries over HTTP, authenticates them against
//! the shared secret and hands accepted ones to two independent consumers:
//!
//! - the [`reconcile::ArchivalSink`], for any delivery that names a pull
//!   request
//! - the [`reconcile::Router`], for deliveries the decoder turns into a typed
//!   event
//!
//! Only a bad signature is visible to the sender (401). Malformed or
//! uninteresting deliveries are logged and acknowledged with 200 so GitHub
//! does not redeliver them.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport and signature checking live here. What
//! happens to an event is decided by the handlers registered on the router.

pub mod server;
pub mod signature;

pub use server::{accept_delivery, build_router, serve, AppState, DeliveryTasks, WebhookError};
pub use signature::{verify_delivery, InboundDelivery, SignatureAlgorithm, Verification};
