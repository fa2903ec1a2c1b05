//! Event routing: an immutable table from [`EventKind`] to the handlers that
//! react to it.
//!
//! The table is assembled once with [`RouterBuilder`] in the composition root
//! and shared by `Arc`. [`Router::dispatch`] runs every handler registered for
//! the event's kind, in registration order, each exactly once and each on its
//! own task. A handler that fails or panics is logged and recorded in the
//! [`DispatchReport`]; its siblings still run.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info_span, Instrument, Span};

use crate::events::{DecodedEvent, EventKind};
use crate::ports::IssueTracker;
use crate::settings::Settings;
use crate::{DeliveryId, HandlerError};

/// A unit of reaction to decoded events.
///
/// Handlers self-filter on action: an event with an action they do not care
/// about is answered with `Ok(())`.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short stable name used in logs and dispatch reports.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DecodedEvent, ctx: &HandlerContext) -> Result<(), HandlerError>;
}

/// Everything a handler needs besides the event itself.
#[derive(Clone)]
pub struct HandlerContext {
    /// Issue tracker used for all label and comment calls.
    pub github: Arc<dyn IssueTracker>,

    /// Settings snapshot taken when the delivery arrived.
    pub settings: Arc<Settings>,

    /// Span that handler work is recorded under.
    pub span: Span,
}

impl HandlerContext {
    pub fn new(github: Arc<dyn IssueTracker>, settings: Arc<Settings>, span: Span) -> Self {
        Self {
            github,
            settings,
            span,
        }
    }

    /// Builds a context whose span is tagged with the delivery id and event
    /// kind.
    pub fn for_delivery(
        github: Arc<dyn IssueTracker>,
        settings: Arc<Settings>,
        delivery_id: &DeliveryId,
        kind: EventKind,
    ) -> Self {
        let span = info_span!("delivery", delivery_id = %delivery_id, event = %kind);
        Self::new(github, settings, span)
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("settings", &self.settings)
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}

/// Collects handler registrations before freezing them into a [`Router`].
#[derive(Default)]
pub struct RouterBuilder {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `kind`.
    ///
    /// Registering the same handler twice for one kind makes it run twice.
    pub fn on(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    pub fn build(self) -> Router {
        Router {
            handlers: self.handlers,
        }
    }
}

/// Immutable handler table.
pub struct Router {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl Router {
    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Runs every handler registered for the event's kind.
    pub async fn dispatch(&self, event: &DecodedEvent, ctx: &HandlerContext) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            return report;
        };

        let subject = event.subject();
        for handler in handlers {
            report.invoked.push(handler.name());
            let result = run_isolated(handler.clone(), event, ctx).await;
            if let Err(e) = result {
                error!(
                    handler = handler.name(),
                    event = %event.kind(),
                    action = event.action(),
                    org = %subject.repo.owner,
                    repo = %subject.repo.name,
                    number = %subject.number,
                    error = %e,
                    "Event handler failed"
                );
                report.failed.push(HandlerFailure {
                    handler: handler.name(),
                    error: e,
                });
            }
        }
        report
    }
}

/// Runs one handler on its own task so a panic stays with that handler.
async fn run_isolated(
    handler: Arc<dyn EventHandler>,
    event: &DecodedEvent,
    ctx: &HandlerContext,
) -> Result<(), HandlerError> {
    let event = event.clone();
    let ctx = ctx.clone();
    let span = ctx.span.clone();
    let task = tokio::spawn(async move { handler.handle(&event, &ctx).await }.instrument(span));
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(HandlerError::Aborted {
            message: panic_message(e.into_panic()),
        }),
        Err(e) => Err(HandlerError::Aborted {
            message: e.to_string(),
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_owned()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut table: Vec<_> = self
            .handlers
            .iter()
            .map(|(kind, hs)| (kind.as_str(), hs.iter().map(|h| h.name()).collect::<Vec<_>>()))
            .collect();
        table.sort();
        f.debug_struct("Router").field("handlers", &table).finish()
    }
}

/// A handler that returned an error during dispatch.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: &'static str,
    pub error: HandlerError,
}

/// Which handlers ran for one event, and which of them failed.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Handler names in invocation order.
    pub invoked: Vec<&'static str>,
    pub failed: Vec<HandlerFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
