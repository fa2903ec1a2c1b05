//! Lazily resolved, process-lifetime capabilities.

use std::future::Future;

use tokio::sync::OnceCell;

/// A value resolved on first use and then shared for the rest of its owner's
/// lifetime.
///
/// Concurrent first callers are serialized: exactly one initializer runs at a
/// time, and once it succeeds every caller observes the same value. A failed
/// initializer leaves the capability empty so the next caller retries.
#[derive(Debug)]
pub struct Memoized<T> {
    cell: OnceCell<T>,
}

impl<T> Memoized<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Returns the value, running `init` if it has not been resolved yet.
    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell.get_or_try_init(init).await
    }

    /// Returns the value if it has already been resolved.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T> Default for Memoized<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn initializer_runs_once() {
        let memo = Memoized::new();
        let runs = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = memo
                .get_or_try_init(|| async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(42)
                })
                .await
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_leaves_capability_empty() {
        let memo: Memoized<u32> = Memoized::new();
        let err = memo.get_or_try_init(|| async { Err("down") }).await;
        assert_eq!(err.unwrap_err(), "down");
        assert!(memo.get().is_none());

        let ok = memo.get_or_try_init(|| async { Ok::<_, &str>(7) }).await;
        assert_eq!(*ok.unwrap(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_resolves_once() {
        let memo = Arc::new(Memoized::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let memo = memo.clone();
                let runs = runs.clone();
                tokio::spawn(async move {
                    *memo
                        .get_or_try_init(|| async {
                            runs.fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            Ok::<_, ()>("client")
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), "client");
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
