//! Configuration hot reload.
//!
//! Polls the configuration file's modification time and swaps the settings
//! snapshot when it changes. A file that fails to load keeps the previous
//! snapshot in force.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use reconcile::SettingsHandle;
use tracing::{debug, info, warn};

use crate::config::load_config;

/// What one poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Unchanged,
    Reloaded,
    /// The file changed but could not be used.
    Rejected,
}

/// Watches one configuration file.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    handle: Arc<SettingsHandle>,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    /// Starts watching `path`, treating its current contents as already loaded.
    pub async fn new(path: impl Into<PathBuf>, handle: Arc<SettingsHandle>) -> Self {
        let path = path.into();
        let last_modified = modified(&path).await;
        Self {
            path,
            handle,
            last_modified,
        }
    }

    /// Reloads the file if its modification time moved.
    pub async fn poll(&mut self) -> ReloadOutcome {
        let Some(current) = modified(&self.path).await else {
            debug!(
                path = %self.path.display(),
                "Configuration file not readable, keeping current settings"
            );
            return ReloadOutcome::Unchanged;
        };
        if self.last_modified == Some(current) {
            return ReloadOutcome::Unchanged;
        }
        self.last_modified = Some(current);

        match load_config(&self.path).await {
            Ok(config) => {
                let settings = config.settings();
                let previous = self.handle.snapshot();
                if previous.agreement.endpoint != settings.agreement.endpoint
                    || previous.agreement.credential_path != settings.agreement.credential_path
                {
                    warn!(
                        "Agreement authority connection settings changed; \
                         they take effect after a restart"
                    );
                }
                self.handle.replace(settings);
                info!(path = %self.path.display(), "Configuration reloaded");
                ReloadOutcome::Reloaded
            }
            Err(e) => {
                warn!(error = %e, "Configuration reload failed, keeping previous settings");
                ReloadOutcome::Rejected
            }
        }
    }

    /// Polls every `interval` until the task is dropped.
    pub async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.poll().await;
        }
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
