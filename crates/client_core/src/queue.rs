//! Serial execution contexts used to deliver controller notifications.
//!
//! Every queue runs its jobs one at a time, in submission order, and never on
//! the caller's stack. Code running inside a job can ask which queue it is on
//! through [`current_queue_id`].

use std::{
    cell::Cell,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
    thread,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::error::QueueError;

pub const MAIN_QUEUE_LABEL: &str = "main";

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(Uuid);

impl QueueId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

thread_local! {
    static CURRENT_THREAD_QUEUE: Cell<Option<QueueId>> = const { Cell::new(None) };
}

tokio::task_local! {
    static CURRENT_TASK_QUEUE: QueueId;
}

/// Id of the queue whose job is currently executing, if any.
pub fn current_queue_id() -> Option<QueueId> {
    CURRENT_TASK_QUEUE
        .try_with(|id| *id)
        .ok()
        .or_else(|| CURRENT_THREAD_QUEUE.with(Cell::get))
}

pub trait CallbackQueue: Send + Sync + fmt::Debug {
    fn id(&self) -> QueueId;

    fn label(&self) -> &str;

    /// Schedules `job` to run after every job dispatched before it.
    fn dispatch(&self, job: Job) -> Result<(), QueueError>;

    fn is_current(&self) -> bool {
        current_queue_id() == Some(self.id())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_job(label: &str, job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        warn!(queue = %label, "callback job panicked; queue keeps running");
    }
}

/// A queue backed by one dedicated OS thread.
pub struct ThreadQueue {
    id: QueueId,
    label: String,
    sender: Mutex<Option<Sender<Job>>>,
}

impl ThreadQueue {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_id(label, QueueId::random())
    }

    /// Starts the worker thread. If the thread cannot be spawned the queue
    /// starts out closed and every dispatch is rejected.
    pub fn with_id(label: impl Into<String>, id: QueueId) -> Self {
        let label = label.into();
        let (sender, receiver) = unbounded::<Job>();
        let thread_label = label.clone();
        let spawned = thread::Builder::new()
            .name(format!("callback-{label}"))
            .spawn(move || run_thread_queue(id, &thread_label, receiver));

        let sender = match spawned {
            Ok(_) => Some(sender),
            Err(error) => {
                error!(queue = %label, %error, "failed to spawn callback queue thread");
                None
            }
        };

        Self {
            id,
            label,
            sender: Mutex::new(sender),
        }
    }

    /// Stops accepting work. Jobs already queued still run.
    pub fn close(&self) {
        if lock(&self.sender).take().is_some() {
            debug!(queue = %self.label, "callback queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.sender).is_none()
    }
}

fn run_thread_queue(id: QueueId, label: &str, receiver: Receiver<Job>) {
    CURRENT_THREAD_QUEUE.with(|current| current.set(Some(id)));
    for job in receiver.iter() {
        run_job(label, job);
    }
    debug!(queue = %label, "callback queue thread stopped");
}

impl CallbackQueue for ThreadQueue {
    fn id(&self) -> QueueId {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn dispatch(&self, job: Job) -> Result<(), QueueError> {
        let sender = lock(&self.sender);
        let closed = || QueueError::Closed {
            label: self.label.clone(),
        };
        let sender = sender.as_ref().ok_or_else(closed)?;
        sender.send(job).map_err(|_| closed())?;
        trace!(queue = %self.label, "job dispatched");
        Ok(())
    }
}

impl fmt::Debug for ThreadQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadQueue")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A queue backed by a single task on the tokio runtime it was created in.
///
/// Jobs run synchronously inside that task, so they should be short.
pub struct TaskQueue {
    id: QueueId,
    label: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

impl TaskQueue {
    pub fn new(label: impl Into<String>) -> Result<Self, QueueError> {
        Self::with_id(label, QueueId::random())
    }

    pub fn with_id(label: impl Into<String>, id: QueueId) -> Result<Self, QueueError> {
        let label = label.into();
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| QueueError::NoRuntime {
            label: label.clone(),
        })?;

        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let task_label = label.clone();
        runtime.spawn(CURRENT_TASK_QUEUE.scope(id, async move {
            while let Some(job) = receiver.recv().await {
                run_job(&task_label, job);
            }
            debug!(queue = %task_label, "callback queue task stopped");
        }));

        Ok(Self {
            id,
            label,
            sender: Mutex::new(Some(sender)),
        })
    }

    /// Stops accepting work. Jobs already queued still run.
    pub fn close(&self) {
        if lock(&self.sender).take().is_some() {
            debug!(queue = %self.label, "callback queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.sender)
            .as_ref()
            .map_or(true, mpsc::UnboundedSender::is_closed)
    }
}

impl CallbackQueue for TaskQueue {
    fn id(&self) -> QueueId {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn dispatch(&self, job: Job) -> Result<(), QueueError> {
        let sender = lock(&self.sender);
        let closed = || QueueError::Closed {
            label: self.label.clone(),
        };
        let sender = sender.as_ref().ok_or_else(closed)?;
        sender.send(job).map_err(|_| closed())?;
        trace!(queue = %self.label, "job dispatched");
        Ok(())
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

static MAIN_QUEUE: OnceLock<Arc<ThreadQueue>> = OnceLock::new();

/// The process-wide queue controllers deliver on unless told otherwise.
pub fn main_queue() -> Arc<dyn CallbackQueue> {
    let queue = MAIN_QUEUE.get_or_init(|| Arc::new(ThreadQueue::new(MAIN_QUEUE_LABEL)));
    Arc::clone(queue) as Arc<dyn CallbackQueue>
}

#[cfg(test)]
#[path = "tests/queue_tests.rs"]
mod tests;
