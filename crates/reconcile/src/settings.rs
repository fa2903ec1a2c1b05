//! Runtime settings consumed by handlers and the archival sink.
//!
//! The CLI loads these from the `[archive]`, `[default_labels]` and
//! `[agreement]` sections of the configuration file and may replace them at
//! any time (hot reload). Each delivery takes one [`SettingsHandle::snapshot`]
//! and uses it throughout, so a reload never changes settings half-way through
//! a reconciliation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::{LabelSet, RepoRef};

/// Object prefix used when the configured one is empty.
pub const DEFAULT_OBJECT_PREFIX: &str = "hatch-webhooks";

/// Label applied when the author has signed the agreement.
pub const DEFAULT_SIGNED_LABEL: &str = "status:yes";
/// Label applied when the author has not signed the agreement.
pub const DEFAULT_UNSIGNED_LABEL: &str = "status:no";
/// Merge-blocking label applied alongside [`DEFAULT_UNSIGNED_LABEL`].
pub const DEFAULT_BLOCKED_LABEL: &str = "status:blocked";
/// Comment posted when the author has not signed the agreement.
pub const DEFAULT_UNSIGNED_COMMENT: &str = "Thanks for your pull request! Before we can accept it \
you need to sign the contributor license agreement. Once you have signed, comment `/check-cla` \
to re-check.";

/// Everything a handler or the archival sink reads from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where accepted deliveries are archived.
    pub archive: ArchiveSettings,

    /// Labels every new pull request should carry.
    ///
    /// Keys are either `"org/repo"` or `"org"`; a repository entry replaces
    /// (does not merge with) its organisation's entry.
    pub default_labels: BTreeMap<String, Vec<String>>,

    /// Contributor agreement checking.
    pub agreement: AgreementSettings,
}

impl Settings {
    /// Returns the desired default labels for `repo`.
    pub fn default_labels_for(&self, repo: &RepoRef) -> LabelSet {
        self.default_labels
            .get(&repo.full_name())
            .or_else(|| self.default_labels.get(repo.owner.as_str()))
            .map(|names| LabelSet::from_names(names.iter().cloned()))
            .unwrap_or_default()
    }
}

/// Archive destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Bucket name. Empty means archival is misconfigured.
    pub bucket: String,

    /// Object name prefix. Empty means [`DEFAULT_OBJECT_PREFIX`].
    pub prefix: String,
}

impl ArchiveSettings {
    pub fn object_prefix(&self) -> &str {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            DEFAULT_OBJECT_PREFIX
        } else {
            prefix
        }
    }
}

/// Agreement authority connection and the labels/comment it drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgreementSettings {
    /// gRPC endpoint of the authority, e.g. `https://agreements.example.com:443`.
    pub endpoint: Option<String>,

    /// File holding the bearer credential presented to the authority.
    pub credential_path: Option<PathBuf>,

    pub signed_label: String,
    pub unsigned_label: String,
    pub blocked_label: String,

    /// Comment posted on a negative verdict.
    pub comment: String,
}

impl Default for AgreementSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            credential_path: None,
            signed_label: DEFAULT_SIGNED_LABEL.to_owned(),
            unsigned_label: DEFAULT_UNSIGNED_LABEL.to_owned(),
            blocked_label: DEFAULT_BLOCKED_LABEL.to_owned(),
            comment: DEFAULT_UNSIGNED_COMMENT.to_owned(),
        }
    }
}

/// Shared, swappable holder of the current [`Settings`].
///
/// Readers clone an `Arc` under a short read lock; a reload swaps the `Arc`
/// under the write lock. In-flight deliveries keep the snapshot they took.
#[derive(Debug, Default)]
pub struct SettingsHandle {
    current: RwLock<Arc<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    /// Returns the settings in force right now.
    pub fn snapshot(&self) -> Arc<Settings> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current settings.
    pub fn replace(&self, settings: Settings) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
    }
}
