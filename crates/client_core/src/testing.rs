//! Helpers for asserting on asynchronous controller notifications.
//!
//! Delivery always happens later on a callback queue, so tests wait for the
//! observed value instead of asserting right after `set_state`.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::{
    controller::{Controller, ControllerStateDelegate, LifecycleState},
    error::QueueError,
    queue::{current_queue_id, CallbackQueue, QueueId, ThreadQueue},
};

pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A thread-backed queue whose identity the test chooses.
pub fn test_queue(id: QueueId) -> Arc<ThreadQueue> {
    Arc::new(ThreadQueue::with_id(format!("test-{id}"), id))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<S> {
    pub state: S,
    pub queue: Option<QueueId>,
}

/// Delegate that records each notification and the queue it ran on.
pub struct RecordingDelegate<S> {
    expected_queue: Option<QueueId>,
    deliveries: Mutex<Vec<Delivery<S>>>,
}

impl<S: LifecycleState> RecordingDelegate<S> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            expected_queue: None,
            deliveries: Mutex::new(Vec::new()),
        })
    }

    pub fn expecting_queue(queue: QueueId) -> Arc<Self> {
        Arc::new(Self {
            expected_queue: Some(queue),
            deliveries: Mutex::new(Vec::new()),
        })
    }

    pub fn deliveries(&self) -> Vec<Delivery<S>> {
        lock(&self.deliveries).clone()
    }

    pub fn states(&self) -> Vec<S> {
        lock(&self.deliveries)
            .iter()
            .map(|delivery| delivery.state.clone())
            .collect()
    }

    pub fn last_state(&self) -> Option<S> {
        lock(&self.deliveries)
            .last()
            .map(|delivery| delivery.state.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.deliveries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliveries that ran somewhere other than the expected queue.
    pub fn misplaced_deliveries(&self) -> usize {
        let Some(expected) = self.expected_queue else {
            return 0;
        };
        lock(&self.deliveries)
            .iter()
            .filter(|delivery| delivery.queue != Some(expected))
            .count()
    }
}

impl<S: LifecycleState> ControllerStateDelegate<S> for RecordingDelegate<S> {
    fn on_state_change(&self, _controller: &Controller<S>, state: &S) {
        lock(&self.deliveries).push(Delivery {
            state: state.clone(),
            queue: current_queue_id(),
        });
    }
}

impl<S: fmt::Debug> fmt::Debug for RecordingDelegate<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingDelegate")
            .field("expected_queue", &self.expected_queue)
            .field("deliveries", &*lock(&self.deliveries))
            .finish()
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Async flavour of [`wait_until`] that yields to the runtime between polls.
pub fn wait_until_async<F>(timeout: Duration, mut condition: F) -> impl Future<Output = bool>
where
    F: FnMut() -> bool,
{
    async move {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Waits for every job dispatched to `queue` so far to finish.
pub fn flush_queue(queue: &dyn CallbackQueue, timeout: Duration) -> bool {
    let (done_tx, done) = bounded::<()>(1);
    let dispatched = queue.dispatch(Box::new(move || {
        let _ = done_tx.send(());
    }));
    dispatched.is_ok() && done.recv_timeout(timeout).is_ok()
}

/// Panics unless `actual` reports `expected` within `timeout`.
pub fn assert_eventually_eq<T>(timeout: Duration, mut actual: impl FnMut() -> T, expected: T)
where
    T: PartialEq + fmt::Debug,
{
    if wait_until(timeout, || actual() == expected) {
        return;
    }
    panic!(
        "value did not become {expected:?} within {timeout:?}; last seen {:?}",
        actual()
    );
}

/// Occupies a queue with a job that waits until released.
///
/// Dropping the blocker releases the queue as well.
pub struct QueueBlocker {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl QueueBlocker {
    pub fn park(queue: &dyn CallbackQueue) -> Result<Self, QueueError> {
        let (entered_tx, entered) = bounded::<()>(1);
        let (release, release_rx) = bounded::<()>(1);
        queue.dispatch(Box::new(move || {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
        }))?;
        Ok(Self { entered, release })
    }

    /// Waits until the blocking job has started running.
    pub fn wait_parked(&self, timeout: Duration) -> bool {
        self.entered.recv_timeout(timeout).is_ok()
    }

    pub fn release(self) {
        let _ = self.release.send(());
    }
}

impl fmt::Debug for QueueBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueBlocker").finish_non_exhaustive()
    }
}
