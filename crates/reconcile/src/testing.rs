//! In-memory fakes of every port, for tests in this and downstream crates.
//!
//! Enabled in this crate's own tests and, for other crates, through the
//! `test-support` feature.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::ports::{AgreementAuthority, ArchiveStore, AuthorityConnector, IssueTracker, WriteOutcome};
use crate::{
    ArchiveError, AuthorityError, LabelName, LabelSet, RepoRef, Subject, SubjectNumber,
    TrackerError, UserLogin, Verdict,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Issue tracker
// ---------------------------------------------------------------------------

/// One call made against a [`FakeTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    AddLabel(Subject, LabelName),
    RemoveLabel(Subject, LabelName),
    IssueLabels(Subject),
    RepoLabels(RepoRef),
    CreateComment(Subject, String),
}

#[derive(Debug, Default)]
struct TrackerState {
    repo_labels: HashMap<RepoRef, LabelSet>,
    issue_labels: HashMap<Subject, LabelSet>,
    comments: Vec<(Subject, String)>,
    calls: Vec<TrackerCall>,
    failing_adds: HashSet<LabelName>,
    failing_removes: HashSet<LabelName>,
    fail_comments: bool,
    fail_lookups: bool,
}

/// A GitHub stand-in that keeps labels and comments in memory and records
/// every call.
#[derive(Debug, Default)]
pub struct FakeTracker {
    state: Mutex<TrackerState>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a [`Subject`] from `"owner/name"` and a number.
    ///
    /// # Panics
    ///
    /// Panics on a malformed name or zero number; test input only.
    pub fn subject(&self, full_name: &str, number: u64) -> Subject {
        Subject::new(
            RepoRef::from_full_name(full_name).expect("valid repository name"),
            SubjectNumber::new(number).expect("positive subject number"),
        )
    }

    pub fn set_repo_labels<S: Into<String>>(
        &self,
        repo: &RepoRef,
        names: impl IntoIterator<Item = S>,
    ) {
        lock(&self.state)
            .repo_labels
            .insert(repo.clone(), LabelSet::from_names(names));
    }

    pub fn set_issue_labels<S: Into<String>>(
        &self,
        subject: &Subject,
        names: impl IntoIterator<Item = S>,
    ) {
        lock(&self.state)
            .issue_labels
            .insert(subject.clone(), LabelSet::from_names(names));
    }

    /// Labels currently on `subject`.
    pub fn labels_on(&self, subject: &Subject) -> LabelSet {
        lock(&self.state)
            .issue_labels
            .get(subject)
            .cloned()
            .unwrap_or_default()
    }

    /// Comments posted on `subject`, oldest first.
    pub fn comments_on(&self, subject: &Subject) -> Vec<String> {
        lock(&self.state)
            .comments
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of `add_label` calls made, successful or not.
    pub fn add_calls(&self) -> usize {
        self.count(|c| matches!(c, TrackerCall::AddLabel(..)))
    }

    /// Number of `remove_label` calls made, successful or not.
    pub fn remove_calls(&self) -> usize {
        self.count(|c| matches!(c, TrackerCall::RemoveLabel(..)))
    }

    fn count(&self, pred: impl Fn(&TrackerCall) -> bool) -> usize {
        lock(&self.state).calls.iter().filter(|c| pred(c)).count()
    }

    pub fn fail_add(&self, label: &LabelName) {
        lock(&self.state).failing_adds.insert(label.clone());
    }

    pub fn fail_remove(&self, label: &LabelName) {
        lock(&self.state).failing_removes.insert(label.clone());
    }

    pub fn fail_comments(&self) {
        lock(&self.state).fail_comments = true;
    }

    pub fn fail_lookups(&self) {
        lock(&self.state).fail_lookups = true;
    }
}

fn injected(status: u16) -> TrackerError {
    TrackerError::Status {
        status,
        message: "injected failure".into(),
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn add_label(&self, subject: &Subject, label: &LabelName) -> Result<(), TrackerError> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(TrackerCall::AddLabel(subject.clone(), label.clone()));
        if state.failing_adds.contains(label) {
            return Err(injected(500));
        }
        state
            .issue_labels
            .entry(subject.clone())
            .or_default()
            .insert(label.clone());
        Ok(())
    }

    async fn remove_label(
        &self,
        subject: &Subject,
        label: &LabelName,
    ) -> Result<(), TrackerError> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(TrackerCall::RemoveLabel(subject.clone(), label.clone()));
        if state.failing_removes.contains(label) {
            return Err(injected(500));
        }
        if let Some(labels) = state.issue_labels.get_mut(subject) {
            labels.remove(label);
        }
        Ok(())
    }

    async fn issue_labels(&self, subject: &Subject) -> Result<LabelSet, TrackerError> {
        let mut state = lock(&self.state);
        state.calls.push(TrackerCall::IssueLabels(subject.clone()));
        if state.fail_lookups {
            return Err(injected(502));
        }
        Ok(state.issue_labels.get(subject).cloned().unwrap_or_default())
    }

    async fn repo_labels(&self, repo: &RepoRef) -> Result<LabelSet, TrackerError> {
        let mut state = lock(&self.state);
        state.calls.push(TrackerCall::RepoLabels(repo.clone()));
        if state.fail_lookups {
            return Err(injected(502));
        }
        Ok(state.repo_labels.get(repo).cloned().unwrap_or_default())
    }

    async fn create_comment(&self, subject: &Subject, body: &str) -> Result<(), TrackerError> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(TrackerCall::CreateComment(subject.clone(), body.to_owned()));
        if state.fail_comments {
            return Err(injected(500));
        }
        state.comments.push((subject.clone(), body.to_owned()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Agreement authority
// ---------------------------------------------------------------------------

/// An authority that answers every lookup with a fixed result.
#[derive(Debug)]
pub struct FakeAuthority {
    answer: Mutex<Result<Verdict, AuthorityError>>,
    lookups: Mutex<Vec<UserLogin>>,
}

impl FakeAuthority {
    pub fn answering(verdict: Verdict) -> Self {
        Self {
            answer: Mutex::new(Ok(verdict)),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: AuthorityError) -> Self {
        Self {
            answer: Mutex::new(Err(error)),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn set_verdict(&self, verdict: Verdict) {
        *lock(&self.answer) = Ok(verdict);
    }

    /// Logins looked up so far, in order.
    pub fn lookups(&self) -> Vec<UserLogin> {
        lock(&self.lookups).clone()
    }
}

#[async_trait]
impl AgreementAuthority for FakeAuthority {
    async fn signed_status(&self, login: &UserLogin) -> Result<Verdict, AuthorityError> {
        lock(&self.lookups).push(login.clone());
        lock(&self.answer).clone()
    }
}

/// A connector that hands out one shared [`FakeAuthority`] and counts how
/// often it was asked to connect.
#[derive(Debug)]
pub struct FakeConnector {
    authority: Arc<FakeAuthority>,
    connects: AtomicUsize,
    fail: AtomicBool,
}

impl FakeConnector {
    pub fn new(authority: Arc<FakeAuthority>) -> Self {
        Self {
            authority,
            connects: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// Makes subsequent `connect` calls fail until [`Self::recover`].
    pub fn fail_connects(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorityConnector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn AgreementAuthority>, AuthorityError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        // Give concurrent first-callers a chance to interleave.
        tokio::task::yield_now().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthorityError::Unavailable {
                message: "injected failure".into(),
            });
        }
        Ok(self.authority.clone())
    }
}

// ---------------------------------------------------------------------------
// Archive store
// ---------------------------------------------------------------------------

/// A create-only object store held in memory.
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    writes: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Number of `write` calls, including ones that found an existing object.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// All stored objects as `(bucket, path)` keys, sorted.
    pub fn keys(&self) -> Vec<(String, String)> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        lock(&self.objects)
            .get(&(bucket.to_owned(), path.to_owned()))
            .cloned()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn write(
        &self,
        bucket: &str,
        path: &str,
        payload: &[u8],
    ) -> Result<WriteOutcome, ArchiveError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ArchiveError::Write {
                path: path.to_owned(),
                message: "injected failure".into(),
            });
        }
        let mut objects = lock(&self.objects);
        let key = (bucket.to_owned(), path.to_owned());
        if objects.contains_key(&key) {
            return Ok(WriteOutcome::AlreadyPresent);
        }
        objects.insert(key, payload.to_vec());
        Ok(WriteOutcome::Created)
    }
}
