use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Collapses a burst of raw inputs into one settled value after a quiet
/// period, one instance per logical field (or composite argument tuple).
///
/// Two read surfaces with different guarantees:
/// - [`Debouncer::snapshot`] returns the latest raw input synchronously.
///   Submission reads this, so continuous typing can never starve a
///   submit or hand it a stale argument tuple.
/// - [`Debouncer::settled`] subscribes to quiet-period emissions: at most
///   one per quiet window, never older than the most recent input, none
///   at all while inputs keep arriving faster than the quiet period.
///
/// Dropping the debouncer aborts any armed timer; nothing is emitted
/// after teardown.
pub struct Debouncer<T: Clone + Send + Sync + 'static> {
    quiet_period: Duration,
    latest: Arc<Mutex<T>>,
    settled_tx: Arc<watch::Sender<T>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Clone + Send + Sync + 'static> Debouncer<T> {
    pub fn new(initial: T, quiet_period: Duration) -> Self {
        let (settled_tx, _) = watch::channel(initial.clone());
        Self {
            quiet_period,
            latest: Arc::new(Mutex::new(initial)),
            settled_tx: Arc::new(settled_tx),
            timer: Mutex::new(None),
        }
    }

    /// Records a new raw value and re-arms the quiet-period timer,
    /// superseding (never mutating) the previous pending snapshot.
    pub fn set(&self, value: T) {
        {
            let mut latest = self.latest.lock().expect("debouncer poisoned");
            *latest = value;
        }

        let latest = Arc::clone(&self.latest);
        let settled_tx = Arc::clone(&self.settled_tx);
        let quiet_period = self.quiet_period;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let value = latest.lock().expect("debouncer poisoned").clone();
            let _ = settled_tx.send(value);
        });

        let mut timer = self.timer.lock().expect("debouncer poisoned");
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
    }

    /// The most recent raw input, readable synchronously at submit time.
    pub fn snapshot(&self) -> T {
        self.latest.lock().expect("debouncer poisoned").clone()
    }

    /// Subscribe to settled emissions.
    pub fn settled(&self) -> watch::Receiver<T> {
        self.settled_tx.subscribe()
    }

    /// Cancels any armed timer and replaces both the raw and settled
    /// value immediately. Used to clear a form after a confirmed write.
    pub fn reset(&self, value: T) {
        {
            let mut timer = self.timer.lock().expect("debouncer poisoned");
            if let Some(previous) = timer.take() {
                previous.abort();
            }
        }
        {
            let mut latest = self.latest.lock().expect("debouncer poisoned");
            *latest = value.clone();
        }
        let _ = self.settled_tx.send(value);
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.lock().expect("debouncer poisoned").take() {
            handle.abort();
        }
    }
}
