//! Command-line flags and the TOML configuration file.
//!
//! ```toml
//! [server]
//! port = 8889
//!
//! [webhook]
//! hmac_secret_path = "/etc/webhook/hmac"
//!
//! [github]
//! token_path = "/etc/github/token"
//!
//! [archive]
//! bucket = "webhooks"
//! root = "/var/lib/labelsmith"
//!
//! [default_labels]
//! "org/repo" = ["lgtm"]
//!
//! [agreement]
//! endpoint = "https://agreements.example.com:443"
//! credential_path = "/etc/agreement/token"
//!
//! [telemetry]
//! log_level = "info"
//! ```
//!
//! Only `[archive]` (minus `root`), `[default_labels]` and `[agreement]` are
//! picked up by a reload; everything else is read once at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use reconcile::{AgreementSettings, ArchiveSettings, Settings};
use serde::Deserialize;
use thiserror::Error;

/// Port used when neither the flag nor the file sets one.
pub const DEFAULT_PORT: u16 = 8889;

/// Seconds between checks of the configuration file's modification time.
pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 10;

/// LabelSmith webhook bot.
#[derive(Parser, Debug, Clone)]
#[command(name = "labelsmith", version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on; overrides `[server] port`.
    #[arg(long)]
    pub port: Option<u16>,

    /// Path to the TOML configuration file.
    #[arg(long, default_value = "/etc/labelsmith/config.toml")]
    pub config_path: PathBuf,

    /// File holding the webhook HMAC secret; overrides `[webhook] hmac_secret_path`.
    #[arg(long)]
    pub webhook_hmac_secret_path: Option<PathBuf>,

    /// How often to check the configuration file for changes. 0 disables reloading.
    #[arg(long, default_value_t = DEFAULT_RELOAD_INTERVAL_SECS)]
    pub reload_interval_secs: u64,
}

impl Cli {
    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }
}

/// Why the configuration file could not be used.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid [default_labels] key '{key}': expected \"org\" or \"org/repo\"")]
    InvalidDefaultLabelsKey { key: String },
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub webhook: WebhookSection,
    pub github: GithubSection,
    pub archive: ArchiveSection,
    pub default_labels: BTreeMap<String, Vec<String>>,
    pub agreement: AgreementSettings,
    pub telemetry: TelemetrySection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WebhookSection {
    pub hmac_secret_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GithubSection {
    /// REST API root; GitHub Enterprise Server uses `https://host/api/v3`.
    pub api_base_url: String,
    pub token_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            api_base_url: github::DEFAULT_API_BASE_URL.to_owned(),
            token_path: None,
            timeout_secs: github::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl GithubSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[archive]`: the reloadable bucket and prefix plus the filesystem root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArchiveSection {
    #[serde(flatten)]
    pub settings: ArchiveSettings,
    pub root: PathBuf,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        Self {
            settings: ArchiveSettings::default(),
            root: PathBuf::from("/var/lib/labelsmith"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    /// OTLP gRPC collector endpoint. Empty disables span export.
    pub otlp_endpoint: String,
    pub service_name: String,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            otlp_endpoint: String::new(),
            service_name: "labelsmith".to_owned(),
        }
    }
}

impl ConfigFile {
    pub fn from_toml_str(path: &Path, contents: &str) -> Result<Self, SettingsError> {
        let config: ConfigFile = toml::from_str(contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        for key in self.default_labels.keys() {
            let parts: Vec<&str> = key.split('/').collect();
            if parts.len() > 2 || parts.iter().any(|p| p.trim().is_empty()) {
                return Err(SettingsError::InvalidDefaultLabelsKey { key: key.clone() });
            }
        }
        Ok(())
    }

    /// The part of the file handlers and the archival sink see.
    pub fn settings(&self) -> Settings {
        Settings {
            archive: self.archive.settings.clone(),
            default_labels: self.default_labels.clone(),
            agreement: self.agreement.clone(),
        }
    }

    /// Flag first, then file, then [`DEFAULT_PORT`].
    pub fn port(&self, cli: &Cli) -> u16 {
        cli.port.or(self.server.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn hmac_secret_path(&self, cli: &Cli) -> Option<PathBuf> {
        cli.webhook_hmac_secret_path
            .clone()
            .or_else(|| self.webhook.hmac_secret_path.clone())
    }
}

/// Reads and validates the configuration file.
pub async fn load_config(path: &Path) -> Result<ConfigFile, SettingsError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    ConfigFile::from_toml_str(path, &contents)
}

/// Reads a secret file, dropping surrounding whitespace.
pub async fn read_secret(path: &Path) -> Result<String, SettingsError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(raw.trim().to_owned())
}
