//! One-shot memoized async cells
//!
//! A `LazyCell` runs its computation at most once per attempt: concurrent
//! forcers coalesce onto the single in-flight computation through a watch
//! channel, and a failed attempt resets the cell to pending so a later
//! forcer may retry. Cells are shared by `Arc` so every consumer of a value
//! observes the same computation.

use crate::error::{ConstellationError, ConstellationResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

type Compute<T> = Box<dyn Fn() -> BoxFuture<'static, ConstellationResult<T>> + Send + Sync>;
type AttemptSignal<T> = watch::Receiver<Option<ConstellationResult<T>>>;

enum CellState<T> {
    Pending,
    /// One computation in flight; the receiver observes its outcome
    Computing(AttemptSignal<T>),
    Computed(T),
}

/// A memoized, one-shot, concurrent-safe computation cell
pub struct LazyCell<T> {
    state: Mutex<CellState<T>>,
    compute: Compute<T>,
}

/// Returns a computing cell to pending if its attempt vanishes mid-flight
/// (the forcing task was cancelled at a suspension point).
struct AttemptGuard<'a, T> {
    cell: &'a LazyCell<T>,
    armed: bool,
}

impl<T> Drop for AttemptGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.cell.state.lock();
            if matches!(*state, CellState::Computing(_)) {
                *state = CellState::Pending;
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> LazyCell<T> {
    /// Construct a pending cell; the computation does not run
    pub fn new<F, Fut>(compute: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ConstellationResult<T>> + Send + 'static,
    {
        Self {
            state: Mutex::new(CellState::Pending),
            compute: Box::new(move || compute().boxed()),
        }
    }

    /// Construct a cell that is already computed
    pub fn computed(value: T) -> Self {
        let cached = value.clone();
        Self {
            state: Mutex::new(CellState::Computed(value)),
            compute: Box::new(move || {
                let cached = cached.clone();
                async move { Ok(cached) }.boxed()
            }),
        }
    }

    /// Force the cell: run the computation, await the in-flight one, or
    /// return the cached value.
    ///
    /// On failure the cell returns to pending and the error is re-raised to
    /// every forcer of that attempt; errors are never cached.
    pub async fn force(&self) -> ConstellationResult<T> {
        enum Role<T> {
            Run(watch::Sender<Option<ConstellationResult<T>>>),
            Wait(AttemptSignal<T>),
        }

        let role = {
            let mut state = self.state.lock();
            match &*state {
                CellState::Computed(value) => return Ok(value.clone()),
                CellState::Computing(rx) => Role::Wait(rx.clone()),
                CellState::Pending => {
                    let (tx, rx) = watch::channel(None);
                    *state = CellState::Computing(rx);
                    Role::Run(tx)
                }
            }
        };

        match role {
            Role::Run(tx) => {
                let mut guard = AttemptGuard {
                    cell: self,
                    armed: true,
                };
                let result = (self.compute)().await;
                {
                    let mut state = self.state.lock();
                    *state = match &result {
                        Ok(value) => CellState::Computed(value.clone()),
                        Err(_) => CellState::Pending,
                    };
                }
                guard.armed = false;
                let _ = tx.send(Some(result.clone()));
                result
            }
            Role::Wait(mut rx) => match rx.wait_for(|outcome| outcome.is_some()).await {
                Ok(outcome) => match &*outcome {
                    Some(result) => result.clone(),
                    None => Err(ConstellationError::Internal(
                        "lazy cell attempt signalled without an outcome".to_string(),
                    )),
                },
                // The computing task vanished without publishing.
                Err(_) => Err(ConstellationError::Cancelled),
            },
        }
    }

    /// Non-forcing snapshot; `Some` only when computed
    pub fn peek(&self) -> Option<T> {
        match &*self.state.lock() {
            CellState::Computed(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(*self.state.lock(), CellState::Computed(_))
    }

    pub fn is_computing(&self) -> bool {
        matches!(*self.state.lock(), CellState::Computing(_))
    }

    /// Return the cell to pending so the next force recomputes.
    ///
    /// If a computation is in flight, waits for it to settle first.
    pub async fn reset(&self) {
        loop {
            let rx = {
                let mut state = self.state.lock();
                match &*state {
                    CellState::Computing(rx) => rx.clone(),
                    _ => {
                        *state = CellState::Pending;
                        return;
                    }
                }
            };
            let mut rx = rx;
            // Either the attempt publishes or its task vanishes; both settle.
            let _ = rx.wait_for(|outcome| outcome.is_some()).await;
        }
    }

    /// Derive a cell that forces this one and applies `f` to its value
    pub fn map<U, F>(self: &Arc<Self>, f: F) -> Arc<LazyCell<U>>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let parent = Arc::clone(self);
        let f = Arc::new(f);
        Arc::new(LazyCell::new(move || {
            let parent = Arc::clone(&parent);
            let f = Arc::clone(&f);
            async move { parent.force().await.map(|value| f(value)) }
        }))
    }

    /// Derive a cell that forces this one, then forces the cell `f` returns
    pub fn flat_map<U, F>(self: &Arc<Self>, f: F) -> Arc<LazyCell<U>>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Arc<LazyCell<U>> + Send + Sync + 'static,
    {
        let parent = Arc::clone(self);
        let f = Arc::new(f);
        Arc::new(LazyCell::new(move || {
            let parent = Arc::clone(&parent);
            let f = Arc::clone(&f);
            async move {
                let value = parent.force().await?;
                f(value).force().await
            }
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_force_computes_once() {
        let runs = Arc::new(AtomicU32::new(0));
        let runs_clone = runs.clone();
        let cell = LazyCell::new(move || {
            let runs = runs_clone.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(21)
            }
        });

        assert_eq!(cell.force().await.unwrap(), 21);
        assert_eq!(cell.force().await.unwrap(), 21);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(cell.is_computed());
    }

    #[tokio::test]
    async fn test_concurrent_forcers_coalesce() {
        let runs = Arc::new(AtomicU32::new(0));
        let runs_clone = runs.clone();
        let cell = Arc::new(LazyCell::new(move || {
            let runs = runs_clone.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                Ok("done".to_string())
            }
        }));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cell = cell.clone();
            handles.push(tokio::spawn(async move { cell.force().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "done");
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_resets_to_pending() {
        let runs = Arc::new(AtomicU32::new(0));
        let runs_clone = runs.clone();
        let cell = LazyCell::new(move || {
            let runs = runs_clone.clone();
            async move {
                let attempt = runs.fetch_add(1, Ordering::SeqCst);
                if attempt == 0 {
                    Err(ConstellationError::Internal("first attempt".to_string()))
                } else {
                    Ok(7)
                }
            }
        });

        assert!(cell.force().await.is_err());
        assert!(!cell.is_computed());
        assert_eq!(cell.force().await.unwrap(), 7);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_forcers_observe_same_failure() {
        let runs = Arc::new(AtomicU32::new(0));
        let runs_clone = runs.clone();
        let cell = Arc::new(LazyCell::new(move || {
            let runs = runs_clone.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                Err::<u32, _>(ConstellationError::Internal("boom".to_string()))
            }
        }));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cell = cell.clone();
            handles.push(tokio::spawn(async move { cell.force().await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!cell.is_computed());
    }

    #[tokio::test]
    async fn test_peek_never_forces() {
        let cell: LazyCell<u32> = LazyCell::new(|| async { Ok(1) });
        assert!(cell.peek().is_none());
        cell.force().await.unwrap();
        assert_eq!(cell.peek(), Some(1));
    }

    #[tokio::test]
    async fn test_reset_recomputes() {
        let runs = Arc::new(AtomicU32::new(0));
        let runs_clone = runs.clone();
        let cell = LazyCell::new(move || {
            let runs = runs_clone.clone();
            async move { Ok(runs.fetch_add(1, Ordering::SeqCst)) }
        });

        assert_eq!(cell.force().await.unwrap(), 0);
        cell.reset().await;
        assert!(!cell.is_computed());
        assert_eq!(cell.force().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_computed_constructor() {
        let cell = LazyCell::computed(42);
        assert!(cell.is_computed());
        assert_eq!(cell.force().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_map_and_flat_map() {
        let base = Arc::new(LazyCell::new(|| async { Ok(10) }));
        let doubled = base.map(|v| v * 2);
        assert_eq!(doubled.force().await.unwrap(), 20);

        let chained = base.flat_map(|v| Arc::new(LazyCell::computed(v + 1)));
        assert_eq!(chained.force().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_cancelled_forcer_releases_cell() {
        let cell: Arc<LazyCell<u32>> = Arc::new(LazyCell::new(|| async {
            sleep(Duration::from_secs(60)).await;
            Ok(1)
        }));

        let forcer = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.force().await })
        };
        sleep(Duration::from_millis(20)).await;
        assert!(cell.is_computing());
        forcer.abort();
        sleep(Duration::from_millis(20)).await;
        // The vanished attempt must not wedge the cell.
        assert!(!cell.is_computing());
        assert!(!cell.is_computed());
    }
}
