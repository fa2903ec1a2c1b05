//! LabelSmith entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: command-line flags plus the TOML file named by
//!    `--config-path`.
//! 2. **Wire observability**: `tracing-subscriber` with a JSON layer and, when
//!    `[telemetry] otlp_endpoint` is set, an OpenTelemetry OTLP exporter. All
//!    `tracing` spans and events from every crate in the workspace flow
//!    through it.
//! 3. **Construct infrastructure**: `RestTracker`, `FsArchiveStore` and
//!    `GrpcConnector`, injected into the handlers, the archival sink and the
//!    HTTP state.
//! 4. **Build the router**: the handler table is fixed here and never changes
//!    while the process runs.
//! 5. **Serve**: run the webhook server and the configuration reloader until
//!    interrupted. SIGTERM is logged and otherwise ignored so deliveries in
//!    flight during a pod shutdown still complete; SIGINT (ctrl-c) stops the
//!    server.

mod config;
mod reload;
mod telemetry;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use archive::FsArchiveStore;
use authority::GrpcConnector;
use github::RestTracker;
use listener::AppState;
use reconcile::ports::IssueTracker;
use reconcile::{
    AgreementStatusHandler, ArchivalSink, DefaultLabelsHandler, EventKind, Router, RouterBuilder,
    SettingsHandle,
};

use crate::config::{load_config, read_secret, Cli, ConfigFile, GithubSection};
use crate::reload::ConfigWatcher;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config_path)
        .await
        .context("failed to load configuration")?;

    let tracer_provider = telemetry::init_telemetry(&config.telemetry)?;
    let result = run(cli, config).await;
    if let Err(e) = &result {
        error!(error = ?e, "LabelSmith stopped with an error");
    }
    telemetry::shutdown_telemetry(tracer_provider);
    result
}

async fn run(cli: Cli, config: ConfigFile) -> Result<()> {
    let secret_path = config
        .hmac_secret_path(&cli)
        .context("no webhook secret configured; set [webhook] hmac_secret_path")?;
    let secret = read_secret(&secret_path).await?;
    if secret.is_empty() {
        bail!("webhook secret file {} is empty", secret_path.display());
    }

    let github: Arc<dyn IssueTracker> = Arc::new(build_tracker(&config.github).await?);
    let settings = Arc::new(SettingsHandle::new(config.settings()));
    let router = Arc::new(build_router(&settings));
    let sink = ArchivalSink::new(Arc::new(FsArchiveStore::new(config.archive.root.clone())));

    if settings.snapshot().archive.bucket.trim().is_empty() {
        warn!("No archive bucket configured; deliveries will not be archived");
    }

    let app_state = AppState::new(secret.into_bytes(), router, github, settings.clone(), sink);

    let reloader = match cli.reload_interval() {
        Some(interval) => {
            let watcher = ConfigWatcher::new(cli.config_path.clone(), settings).await;
            Some(tokio::spawn(watcher.run(interval)))
        }
        None => None,
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port(&cli)));
    let tcp = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening for webhooks");

    let served = listener::serve(tcp, app_state, shutdown_signal()).await;
    if let Some(reloader) = reloader {
        reloader.abort();
    }
    served.context("server error")?;
    info!("Shut down");
    Ok(())
}

async fn build_tracker(section: &GithubSection) -> Result<RestTracker> {
    let token_path = section
        .token_path
        .as_deref()
        .context("no GitHub token configured; set [github] token_path")?;
    let token = read_secret(token_path).await?;
    RestTracker::new(&section.api_base_url, &token, section.timeout())
        .context("failed to build GitHub client")
}

/// Registers every handler.
///
/// The agreement connector is built from the settings in force at startup;
/// the authority is connected on first use and kept for the process lifetime.
fn build_router(settings: &SettingsHandle) -> Router {
    let agreement = settings.snapshot().agreement.clone();
    if agreement.endpoint.is_none() {
        warn!("No agreement authority endpoint configured; agreement checks will fail");
    }
    let status = Arc::new(AgreementStatusHandler::new(Arc::new(
        GrpcConnector::from_settings(&agreement),
    )));
    let default_labels = Arc::new(DefaultLabelsHandler::new());

    RouterBuilder::new()
        .on(EventKind::PullRequest, default_labels)
        .on(EventKind::PullRequest, status.clone())
        .on(EventKind::ReviewComment, status.clone())
        .on(EventKind::IssueComment, status)
        .build()
}

/// Resolves on ctrl-c. SIGTERM is only logged.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::spawn(async move {
                    while sigterm.recv().await.is_some() {
                        info!("Received SIGTERM, still serving; send SIGINT to stop");
                    }
                });
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for ctrl-c, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
