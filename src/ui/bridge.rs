// UiBridge - marshals work between tokio tasks and the Slint event loop
//
// Slint owns the main thread and is single-threaded; renders, logo decodes and
// exports run on tokio. UI updates from tokio go through a bounded channel to a
// forwarding thread that queues them with `upgrade_in_event_loop`.

use crate::metrics::Metrics;
use slint::{ComponentHandle, Weak};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Pending UI updates beyond this are dropped rather than queued
const UI_UPDATE_CAPACITY: usize = 64;

type UiUpdate<T> = Box<dyn FnOnce(&T) + Send>;

/// Result of queueing a UI update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Channel full; the update was dropped
    Full,
    /// Bridge thread has stopped
    Closed,
}

/// Coordinates between the tokio runtime and the Slint event loop
///
/// - [`update_ui`](Self::update_ui) runs a closure on the UI thread
/// - [`spawn_async`](Self::spawn_async) runs a future on tokio from a callback
pub struct UiBridge<T: ComponentHandle> {
    ui_weak: Weak<T>,
    tokio_handle: tokio::runtime::Handle,
    ui_update_tx: mpsc::Sender<UiUpdate<T>>,
    metrics: Arc<Metrics>,
}

impl<T: ComponentHandle + 'static> UiBridge<T> {
    /// Create the bridge and start its forwarding thread
    ///
    /// The thread exits once every sender is dropped or the event loop is gone.
    pub fn new(ui: &T, tokio_handle: tokio::runtime::Handle, metrics: Arc<Metrics>) -> Self {
        let ui_weak = ui.as_weak();
        let (ui_update_tx, mut ui_update_rx) = mpsc::channel::<UiUpdate<T>>(UI_UPDATE_CAPACITY);

        let forward_to = ui_weak.clone();
        std::thread::Builder::new()
            .name("qrstudio-ui-bridge".to_string())
            .spawn(move || {
                tracing::debug!("UI bridge thread started");

                while let Some(update) = ui_update_rx.blocking_recv() {
                    if let Err(e) = forward_to.upgrade_in_event_loop(move |ui| update(&ui)) {
                        tracing::warn!("Event loop gone, stopping UI bridge: {:?}", e);
                        break;
                    }
                }

                tracing::debug!("UI bridge thread terminated");
            })
            .map_err(|e| tracing::error!("Failed to start UI bridge thread: {}", e))
            .ok();

        Self {
            ui_weak,
            tokio_handle,
            ui_update_tx,
            metrics,
        }
    }

    /// Schedule `update` on the UI thread. Returns false if it was dropped.
    pub fn update_ui<F>(&self, update: F) -> bool
    where
        F: FnOnce(&T) + Send + 'static,
    {
        enqueue(&self.ui_update_tx, Box::new(update), &self.metrics) == Enqueued::Queued
    }

    /// Run a future on the tokio runtime
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }

    pub fn clone_handle(&self) -> UiBridgeHandle<T> {
        UiBridgeHandle {
            ui_weak: self.ui_weak.clone(),
            tokio_handle: self.tokio_handle.clone(),
            ui_update_tx: self.ui_update_tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Cloneable handle to a [`UiBridge`] for capture in callbacks and threads
pub struct UiBridgeHandle<T: ComponentHandle> {
    ui_weak: Weak<T>,
    tokio_handle: tokio::runtime::Handle,
    ui_update_tx: mpsc::Sender<UiUpdate<T>>,
    metrics: Arc<Metrics>,
}

// Manual Clone implementation to avoid requiring T: Clone
impl<T: ComponentHandle> Clone for UiBridgeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            ui_weak: self.ui_weak.clone(),
            tokio_handle: self.tokio_handle.clone(),
            ui_update_tx: self.ui_update_tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<T: ComponentHandle + 'static> UiBridgeHandle<T> {
    /// See [`UiBridge::update_ui`]
    pub fn update_ui<F>(&self, update: F) -> bool
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.try_update_ui(update) == Enqueued::Queued
    }

    /// Like [`update_ui`](Self::update_ui), but tells a full channel from a closed one.
    pub fn try_update_ui<F>(&self, update: F) -> Enqueued
    where
        F: FnOnce(&T) + Send + 'static,
    {
        enqueue(&self.ui_update_tx, Box::new(update), &self.metrics)
    }

    /// See [`UiBridge::spawn_async`]
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }

    pub fn ui_weak(&self) -> &Weak<T> {
        &self.ui_weak
    }

    pub fn tokio_handle(&self) -> &tokio::runtime::Handle {
        &self.tokio_handle
    }
}

/// Queue an update without blocking; a full or closed channel drops it.
fn enqueue<U>(tx: &mpsc::Sender<U>, update: U, metrics: &Metrics) -> Enqueued {
    match tx.try_send(update) {
        Ok(()) => {
            metrics.record_ui_update();
            Enqueued::Queued
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            metrics.record_ui_channel_full();
            tracing::warn!("UI update channel full - dropping update");
            Enqueued::Full
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::warn!("Failed to send UI update - bridge thread has stopped");
            Enqueued::Closed
        }
    }
}

/// Deferred read of the newest value in a watch channel.
///
/// Handed to the UI thread instead of the value itself, so whatever arrived
/// while the update sat in the queue is what gets shown.
pub struct Latest<V> {
    rx: watch::Receiver<V>,
    outstanding: Arc<AtomicBool>,
}

impl<V: Clone> Latest<V> {
    /// Read the newest value and allow the next submission.
    pub fn get(self) -> V {
        self.outstanding.store(false, Ordering::Release);
        self.rx.borrow().clone()
    }
}

/// Submit a [`Latest`] through `submit` whenever `rx` changes.
///
/// At most one submission is outstanding; changes in the meantime are picked
/// up when it is read. A submission refused with [`Enqueued::Full`] is retried
/// after `retry`. Returns when `rx` closes or `submit` reports [`Enqueued::Closed`].
pub async fn forward_latest<V, F>(mut rx: watch::Receiver<V>, retry: Duration, mut submit: F)
where
    V: Clone,
    F: FnMut(Latest<V>) -> Enqueued,
{
    let outstanding = Arc::new(AtomicBool::new(false));

    while rx.changed().await.is_ok() {
        drop(rx.borrow_and_update());
        if outstanding.swap(true, Ordering::AcqRel) {
            continue;
        }

        loop {
            let latest = Latest {
                rx: rx.clone(),
                outstanding: Arc::clone(&outstanding),
            };
            match submit(latest) {
                Enqueued::Queued => break,
                Enqueued::Full => tokio::time::sleep(retry).await,
                Enqueued::Closed => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Building a real component needs a display; these cover the queueing.

    #[test]
    fn test_enqueue_counts_updates() {
        let metrics = Metrics::new();
        let (tx, mut rx) = mpsc::channel::<u32>(4);

        assert_eq!(enqueue(&tx, 1, &metrics), Enqueued::Queued);
        assert_eq!(enqueue(&tx, 2, &metrics), Enqueued::Queued);

        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(metrics.ui_updates.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_enqueue_drops_when_full() {
        let metrics = Metrics::new();
        let (tx, _rx) = mpsc::channel::<u32>(1);

        assert_eq!(enqueue(&tx, 1, &metrics), Enqueued::Queued);
        assert_eq!(enqueue(&tx, 2, &metrics), Enqueued::Full);
        assert_eq!(metrics.ui_update_channel_full.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_enqueue_after_receiver_dropped() {
        let metrics = Metrics::new();
        let (tx, rx) = mpsc::channel::<u32>(1);
        drop(rx);

        assert_eq!(enqueue(&tx, 1, &metrics), Enqueued::Closed);
        assert_eq!(metrics.ui_updates.load(Ordering::Relaxed), 0);
    }

    type Submitted = Arc<Mutex<Vec<Latest<u32>>>>;

    /// Submitter that refuses the first `refusals` attempts with a full channel
    fn scripted_submit(submitted: &Submitted, refusals: usize) -> impl FnMut(Latest<u32>) -> Enqueued + use<> {
        let submitted = Arc::clone(submitted);
        let mut remaining = refusals;
        move |latest| {
            if remaining > 0 {
                remaining -= 1;
                return Enqueued::Full;
            }
            submitted.lock().unwrap().push(latest);
            Enqueued::Queued
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_latest_retries_full_channel() {
        let (tx, rx) = watch::channel(0u32);
        let submitted: Submitted = Arc::default();

        let task = tokio::spawn(forward_latest(
            rx,
            Duration::from_millis(16),
            scripted_submit(&submitted, 3),
        ));

        tx.send(7).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let latest = submitted.lock().unwrap().pop().expect("update retried until queued");
        assert_eq!(latest.get(), 7);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_latest_coalesces_while_outstanding() {
        let (tx, rx) = watch::channel(0u32);
        let submitted: Submitted = Arc::default();

        let task = tokio::spawn(forward_latest(
            rx,
            Duration::from_millis(16),
            scripted_submit(&submitted, 0),
        ));

        for frame in 1..=5 {
            tx.send(frame).unwrap();
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut queued = std::mem::take(&mut *submitted.lock().unwrap());
        assert_eq!(queued.len(), 1);
        assert_eq!(queued.remove(0).get(), 5);

        // Once read, the next change is submitted again
        tx.send(6).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let latest = submitted.lock().unwrap().pop().expect("new change submitted");
        assert_eq!(latest.get(), 6);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_forward_latest_stops_when_closed() {
        let (tx, rx) = watch::channel(0u32);
        let task = tokio::spawn(forward_latest(rx, Duration::from_millis(16), |_| Enqueued::Closed));

        tx.send(1).unwrap();
        task.await.unwrap();
        assert!(tx.is_closed());
    }
}
