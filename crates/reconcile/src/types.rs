//! Shared value types for the LabelSmith domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values and participate in domain computations (set algebra over
//! labels, verdicts, timestamps).

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::LabelName;

// ---------------------------------------------------------------------------
// Label sets
// ---------------------------------------------------------------------------

/// A set of label names.
///
/// Backed by a [`BTreeSet`] so iteration order is deterministic; the order
/// itself carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet(BTreeSet<LabelName>);

impl LabelSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Builds a set from raw names, silently dropping empty strings.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().filter_map(LabelName::new).collect()
    }

    /// Adds a label. Returns `false` if it was already present.
    pub fn insert(&mut self, label: LabelName) -> bool {
        self.0.insert(label)
    }

    /// Removes a label. Returns `false` if it was not present.
    pub fn remove(&mut self, label: &LabelName) -> bool {
        self.0.remove(label)
    }

    /// Returns `true` if the set contains `label`.
    pub fn contains(&self, label: &LabelName) -> bool {
        self.0.contains(label)
    }

    /// Returns `true` if the set contains a label with this exact name.
    pub fn contains_name(&self, name: &str) -> bool {
        self.0.iter().any(|l| l.as_str() == name)
    }

    /// `self − other`.
    pub fn difference(&self, other: &LabelSet) -> LabelSet {
        Self(self.0.difference(&other.0).cloned().collect())
    }

    /// `self ∩ other`.
    pub fn intersection(&self, other: &LabelSet) -> LabelSet {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    /// `self ∪ other`.
    pub fn union(&self, other: &LabelSet) -> LabelSet {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelName> {
        self.0.iter()
    }

    /// Returns the label names in sorted order, for logging.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(LabelName::as_str).collect()
    }
}

impl FromIterator<LabelName> for LabelSet {
    fn from_iter<T: IntoIterator<Item = LabelName>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for LabelSet {
    type Item = LabelName;
    type IntoIter = std::collections::btree_set::IntoIter<LabelName>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a LabelName;
    type IntoIter = std::collections::btree_set::Iter<'a, LabelName>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Extend<LabelName> for LabelSet {
    fn extend<T: IntoIterator<Item = LabelName>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// The answer an external agreement authority gives about a contributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The contributor is permitted to contribute.
    Signed,
    /// The contributor has not signed the agreement.
    Unsigned,
}

impl Verdict {
    /// Maps the authority's boolean flag onto a [`Verdict`].
    pub fn from_signed(signed: bool) -> Self {
        if signed {
            Verdict::Signed
        } else {
            Verdict::Unsigned
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Verdict::Signed)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Signed => write!(f, "signed"),
            Verdict::Unsigned => write!(f, "unsigned"),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns the calendar `(year, month, day)` in UTC.
    pub fn ymd(self) -> (i32, u32, u32) {
        (self.0.year(), self.0.month(), self.0.day())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
