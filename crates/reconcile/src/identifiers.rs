//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`LabelName`] with a [`UserLogin`] even though both are `String` under the
//! hood.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (GitHub names)
// ---------------------------------------------------------------------------

string_id! {
    /// A GitHub organisation or user that owns a repository (e.g. `"octocat"`).
    OwnerLogin
}

string_id! {
    /// A repository name without its owner (e.g. `"hello-world"`).
    RepoName
}

string_id! {
    /// A GitHub user login (e.g. the author of a pull request).
    UserLogin
}

string_id! {
    /// A label name. Case-sensitive and scoped to one repository.
    LabelName
}

// ---------------------------------------------------------------------------
// Subject number
// ---------------------------------------------------------------------------

/// The number of an issue or pull request within its repository.
///
/// GitHub assigns these starting at 1; zero is never a valid subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectNumber(u64);

impl SubjectNumber {
    /// Creates a [`SubjectNumber`], returning `None` for zero.
    pub fn new(value: u64) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubjectNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Delivery identifier
// ---------------------------------------------------------------------------

/// The per-delivery identifier GitHub sends in `X-GitHub-Delivery`.
///
/// Unlike the other identifiers this one may be empty: a delivery without the
/// header is still processed, it just has no dedup key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(String);

impl DeliveryId {
    /// Creates a delivery identifier. Surrounding whitespace is dropped.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_owned())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when no delivery header was supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Composite identifiers
// ---------------------------------------------------------------------------

/// A repository, identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    /// Owning organisation or user.
    pub owner: OwnerLogin,
    /// Repository name.
    pub name: RepoName,
}

impl RepoRef {
    /// Creates a [`RepoRef`] from already-validated parts.
    pub fn new(owner: OwnerLogin, name: RepoName) -> Self {
        Self { owner, name }
    }

    /// Parses an `"owner/name"` string.
    ///
    /// Returns `None` unless there is exactly one `/` with a non-empty segment
    /// on each side.
    pub fn from_full_name(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if name.contains('/') {
            return None;
        }
        Some(Self {
            owner: OwnerLogin::new(owner)?,
            name: RepoName::new(name)?,
        })
    }

    /// Returns the repository in `"owner/name"` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The issue or pull request a label, status or comment applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subject {
    /// Repository the subject lives in.
    pub repo: RepoRef,
    /// Issue / pull request number.
    pub number: SubjectNumber,
}

impl Subject {
    /// Creates a [`Subject`].
    pub fn new(repo: RepoRef, number: SubjectNumber) -> Self {
        Self { repo, number }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_reject_empty() {
        assert!(LabelName::new("").is_none());
        assert_eq!(LabelName::new("lgtm").unwrap().as_str(), "lgtm");
    }

    #[test]
    fn subject_number_rejects_zero() {
        assert!(SubjectNumber::new(0).is_none());
        assert_eq!(SubjectNumber::new(7).unwrap().as_u64(), 7);
    }

    #[test]
    fn delivery_id_may_be_empty() {
        let id = DeliveryId::new("  ");
        assert!(id.is_empty());
        assert_eq!(DeliveryId::new("abc").as_str(), "abc");
    }

    #[test]
    fn repo_ref_parses_full_name() {
        let repo = RepoRef::from_full_name("octocat/hello-world").unwrap();
        assert_eq!(repo.owner.as_str(), "octocat");
        assert_eq!(repo.name.as_str(), "hello-world");
        assert_eq!(repo.full_name(), "octocat/hello-world");
    }

    #[test]
    fn repo_ref_rejects_malformed_full_names() {
        assert!(RepoRef::from_full_name("").is_none());
        assert!(RepoRef::from_full_name("octocat").is_none());
        assert!(RepoRef::from_full_name("/hello").is_none());
        assert!(RepoRef::from_full_name("octocat/").is_none());
        assert!(RepoRef::from_full_name("a/b/c").is_none());
    }

    #[test]
    fn subject_display() {
        let subject = Subject::new(
            RepoRef::from_full_name("org/repo").unwrap(),
            SubjectNumber::new(12).unwrap(),
        );
        assert_eq!(subject.to_string(), "org/repo#12");
    }
}
