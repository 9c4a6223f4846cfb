use std::{
    convert::Infallible,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::queue::{main_queue, CallbackQueue, Job};

/// A lifecycle enumeration a [`Controller`] can hold.
///
/// `stage` orders the variants: the initial variant is stage 0 and later
/// stages mean more data is available. Variants sharing a stage are
/// alternatives at the same depth (for example a failure next to a success).
pub trait LifecycleState: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    fn initial() -> Self;

    fn stage(&self) -> u8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataState {
    /// Nothing fetched yet.
    #[default]
    Inactive,
    /// Data served from the local cache.
    LocalDataFetched,
    /// Data confirmed by the server.
    RemoteDataFetched,
}

impl LifecycleState for DataState {
    fn initial() -> Self {
        Self::Inactive
    }

    fn stage(&self) -> u8 {
        match self {
            Self::Inactive => 0,
            Self::LocalDataFetched => 1,
            Self::RemoteDataFetched => 2,
        }
    }
}

pub trait ControllerStateDelegate<S: LifecycleState>: Send + Sync {
    fn on_state_change(&self, controller: &Controller<S>, state: &S);
}

type WeakDelegate<S> = Weak<dyn ControllerStateDelegate<S>>;

struct ControllerInner<S: LifecycleState> {
    state: Mutex<S>,
    delegate: Mutex<Option<WeakDelegate<S>>>,
    callback_queue: Mutex<Arc<dyn CallbackQueue>>,
}

/// Holds a lifecycle state and notifies one delegate about every change.
///
/// Cloning yields another handle to the same controller. The delegate is held
/// weakly, so a component may own the controller and act as its delegate at
/// the same time. Each [`set_state`](Self::set_state) schedules exactly one
/// notification on the callback queue, carrying the value that was set and
/// addressed to the delegate registered at that moment. Nothing is validated
/// or coalesced: re-setting the current value notifies again.
pub struct Controller<S: LifecycleState> {
    inner: Arc<ControllerInner<S>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: LifecycleState> Controller<S> {
    pub fn new() -> Self {
        Self::with_callback_queue(main_queue())
    }

    pub fn with_callback_queue(callback_queue: Arc<dyn CallbackQueue>) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                state: Mutex::new(S::initial()),
                delegate: Mutex::new(None),
                callback_queue: Mutex::new(callback_queue),
            }),
        }
    }

    pub fn state(&self) -> S {
        lock(&self.inner.state).clone()
    }

    pub fn set_state(&self, state: S) {
        self.replace_state_with(|_| Ok::<_, Infallible>(state))
            .unwrap_or_else(|never| match never {});
    }

    /// Computes the next state from the current one and stores it, or leaves
    /// the controller untouched when `next` fails.
    ///
    /// Check and write happen under the state lock, so layers that validate
    /// transitions never race with other writers.
    pub fn replace_state_with<E>(&self, next: impl FnOnce(&S) -> Result<S, E>) -> Result<(), E> {
        let mut current = lock(&self.inner.state);
        let state = next(&*current)?;
        *current = state.clone();

        // Dispatch while still holding the state lock so notification order
        // matches write order across threads.
        let Some(delegate) = lock(&self.inner.delegate).clone() else {
            trace!(?state, "state changed without a delegate");
            return Ok(());
        };
        let queue = self.callback_queue();
        let controller = self.clone();
        let job: Job = Box::new(move || match delegate.upgrade() {
            Some(delegate) => delegate.on_state_change(&controller, &state),
            None => debug!(?state, "delegate released before notification was delivered"),
        });

        if let Err(error) = queue.dispatch(job) {
            debug!(%error, "dropping state notification");
        }
        Ok(())
    }

    /// Registers `delegate`, replacing the previous one. The current state is
    /// not replayed; only later changes are reported.
    pub fn set_delegate<D>(&self, delegate: &Arc<D>)
    where
        D: ControllerStateDelegate<S> + 'static,
    {
        let delegate: Arc<dyn ControllerStateDelegate<S>> = delegate.clone();
        *lock(&self.inner.delegate) = Some(Arc::downgrade(&delegate));
    }

    pub fn clear_delegate(&self) {
        lock(&self.inner.delegate).take();
    }

    pub fn has_delegate(&self) -> bool {
        lock(&self.inner.delegate)
            .as_ref()
            .is_some_and(|delegate| delegate.strong_count() > 0)
    }

    pub fn callback_queue(&self) -> Arc<dyn CallbackQueue> {
        Arc::clone(&lock(&self.inner.callback_queue))
    }

    /// Later notifications go to `callback_queue`; already scheduled ones
    /// stay on the queue they were dispatched to.
    pub fn set_callback_queue(&self, callback_queue: Arc<dyn CallbackQueue>) {
        *lock(&self.inner.callback_queue) = callback_queue;
    }

    /// Whether both handles refer to the same controller.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S: LifecycleState> Default for Controller<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LifecycleState> Clone for Controller<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: LifecycleState> fmt::Debug for Controller<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state())
            .field("callback_queue", &self.callback_queue().label())
            .field("has_delegate", &self.has_delegate())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
