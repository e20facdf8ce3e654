//! Trailing-edge debounce on the tokio runtime.
//!
//! Each [`Debouncer::trigger`] aborts the pending timer and arms a new one, so
//! a burst of triggers runs the task once, with the arguments of the last
//! trigger, after the burst has been quiet for `delay`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

type BoxedTask<T> = Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct PendingRun {
    id: u64,
    timer: AbortHandle,
}

struct Inner<T> {
    handle: Handle,
    delay: Duration,
    task: BoxedTask<T>,
    pending: Mutex<Option<PendingRun>>,
    next_id: AtomicU64,
}

impl<T> Inner<T> {
    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingRun>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Collapses bursts of triggers into one execution per quiet period.
///
/// Clones share the same timer.
pub struct Debouncer<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create a debouncer that runs `task` on `handle`'s runtime.
    pub fn new<F, Fut>(handle: Handle, delay: Duration, task: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task: BoxedTask<T> = Arc::new(move |args| Box::pin(task(args)));
        Self {
            inner: Arc::new(Inner {
                handle,
                delay,
                task,
                pending: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Schedule `task(args)` after the delay, replacing any pending run.
    ///
    /// A run whose timer has already elapsed is left alone.
    pub fn trigger(&self, args: T) {
        // Held across the spawn so the timer can't observe the slot before it is filled
        let mut pending = self.inner.lock_pending();
        if let Some(previous) = pending.take() {
            previous.timer.abort();
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);

        let timer = self.inner.handle.spawn(async move {
            tokio::time::sleep(inner.delay).await;

            {
                let mut pending = inner.lock_pending();
                match pending.as_ref() {
                    Some(run) if run.id == id => *pending = None,
                    _ => return,
                }
            }

            tracing::trace!("Debounce timer {} elapsed", id);
            (inner.task)(args).await;
        });

        *pending = Some(PendingRun {
            id,
            timer: timer.abort_handle(),
        });
    }

    /// Drop the pending run, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        match self.inner.lock_pending().take() {
            Some(run) => {
                run.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Whether a run is scheduled and its timer has not yet elapsed.
    pub fn is_pending(&self) -> bool {
        self.inner.lock_pending().is_some()
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Debouncer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.inner.delay)
            .field("pending", &self.inner.lock_pending().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn recording(delay_ms: u64) -> (Debouncer<u32>, Arc<Mutex<Vec<u32>>>) {
        let runs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&runs);
        let debouncer = Debouncer::new(Handle::current(), Duration::from_millis(delay_ms), move |n| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(n);
            }
        });
        (debouncer, runs)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once_with_last_args() {
        let (debouncer, runs) = recording(160);

        for n in 1..=5 {
            debouncer.trigger(n);
            sleep(Duration::from_millis(50)).await;
        }
        assert!(runs.lock().unwrap().is_empty());
        assert!(debouncer.is_pending());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(*runs.lock().unwrap(), vec![5]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_triggers_run_each() {
        let (debouncer, runs) = recording(160);

        debouncer.trigger(1);
        sleep(Duration::from_millis(300)).await;
        debouncer.trigger(2);
        sleep(Duration::from_millis(300)).await;

        assert_eq!(*runs.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_run() {
        let (debouncer, runs) = recording(160);

        debouncer.trigger(7);
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        sleep(Duration::from_millis(500)).await;
        assert!(runs.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_run_is_not_interrupted() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let debouncer = Debouncer::new(Handle::current(), Duration::from_millis(10), move |n: u32| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(format!("start {}", n));
                sleep(Duration::from_millis(100)).await;
                sink.lock().unwrap().push(format!("end {}", n));
            }
        });

        debouncer.trigger(1);
        sleep(Duration::from_millis(20)).await;
        // Run 1 is mid-flight; this must not abort it
        debouncer.trigger(2);
        sleep(Duration::from_millis(300)).await;

        assert_eq!(
            *events.lock().unwrap(),
            vec!["start 1", "start 2", "end 1", "end 2"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_timer() {
        let (debouncer, runs) = recording(100);
        let other = debouncer.clone();

        debouncer.trigger(1);
        other.trigger(2);
        assert_eq!(other.delay(), Duration::from_millis(100));

        sleep(Duration::from_millis(150)).await;
        assert_eq!(*runs.lock().unwrap(), vec![2]);
    }
}
