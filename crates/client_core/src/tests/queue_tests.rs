use super::*;
use crate::testing::{flush_queue, wait_until_async, QueueBlocker, DELIVERY_TIMEOUT};
use std::sync::mpsc;

fn record_into(log: &Arc<Mutex<Vec<u32>>>, value: u32) -> Job {
    let log = Arc::clone(log);
    Box::new(move || lock(&log).push(value))
}

#[test]
fn thread_queue_runs_jobs_in_submission_order() {
    let queue = ThreadQueue::new("ordering");
    let log = Arc::new(Mutex::new(Vec::new()));
    for value in 0..64 {
        queue.dispatch(record_into(&log, value)).expect("dispatch");
    }

    assert!(flush_queue(&queue, DELIVERY_TIMEOUT));
    assert_eq!(*lock(&log), (0..64).collect::<Vec<_>>());
}

#[test]
fn jobs_observe_the_queue_they_run_on() {
    let id = QueueId::random();
    let queue = Arc::new(ThreadQueue::with_id("identity", id));
    let (tx, rx) = mpsc::channel();
    let inner = Arc::clone(&queue);
    queue
        .dispatch(Box::new(move || {
            let _ = tx.send((current_queue_id(), inner.is_current()));
        }))
        .expect("dispatch");

    assert_eq!(rx.recv_timeout(DELIVERY_TIMEOUT), Ok((Some(id), true)));
    assert_eq!(current_queue_id(), None);
    assert!(!queue.is_current());
}

#[test]
fn closed_thread_queue_rejects_new_work() {
    let queue = ThreadQueue::new("closing");
    queue.close();

    assert!(queue.is_closed());
    let result = queue.dispatch(Box::new(|| {}));
    assert_eq!(
        result,
        Err(QueueError::Closed {
            label: "closing".into()
        })
    );
}

#[test]
fn closing_still_runs_already_queued_jobs() {
    let queue = ThreadQueue::new("draining");
    let log = Arc::new(Mutex::new(Vec::new()));

    let blocker = QueueBlocker::park(&queue).expect("park");
    assert!(blocker.wait_parked(DELIVERY_TIMEOUT));
    let (done_tx, done_rx) = mpsc::channel();
    queue.dispatch(record_into(&log, 7)).expect("dispatch");
    queue
        .dispatch(Box::new(move || {
            let _ = done_tx.send(());
        }))
        .expect("dispatch marker");
    queue.close();
    blocker.release();

    assert!(done_rx.recv_timeout(DELIVERY_TIMEOUT).is_ok());
    assert_eq!(*lock(&log), vec![7]);
}

#[test]
fn panicking_job_does_not_stop_the_queue() {
    let queue = ThreadQueue::new("resilient");
    let log = Arc::new(Mutex::new(Vec::new()));

    queue
        .dispatch(Box::new(|| panic!("delegate blew up")))
        .expect("dispatch");
    queue.dispatch(record_into(&log, 1)).expect("dispatch");

    assert!(flush_queue(&queue, DELIVERY_TIMEOUT));
    assert_eq!(*lock(&log), vec![1]);
}

#[test]
fn task_queue_needs_a_runtime() {
    let result = TaskQueue::new("no-runtime");
    assert!(matches!(result, Err(QueueError::NoRuntime { label }) if label == "no-runtime"));
}

#[test]
fn main_queue_is_shared() {
    let first = main_queue();
    let second = main_queue();
    assert_eq!(first.id(), second.id());
    assert_eq!(first.label(), MAIN_QUEUE_LABEL);
}

#[tokio::test]
async fn task_queue_runs_in_order_with_task_identity() {
    let id = QueueId::random();
    let queue = TaskQueue::with_id("tokio", id).expect("task queue");
    let seen = Arc::new(Mutex::new(Vec::new()));

    for value in 0..16u32 {
        let seen = Arc::clone(&seen);
        queue
            .dispatch(Box::new(move || {
                lock(&seen).push((value, current_queue_id()));
            }))
            .expect("dispatch");
    }

    assert!(wait_until_async(DELIVERY_TIMEOUT, || lock(&seen).len() == 16).await);
    let seen = lock(&seen).clone();
    assert!(seen.iter().all(|(_, queue)| *queue == Some(id)));
    assert_eq!(
        seen.iter().map(|(value, _)| *value).collect::<Vec<_>>(),
        (0..16).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn closed_task_queue_rejects_new_work() {
    let queue = TaskQueue::new("tokio-closing").expect("task queue");
    queue.close();

    assert!(queue.is_closed());
    assert!(matches!(
        queue.dispatch(Box::new(|| {})),
        Err(QueueError::Closed { .. })
    ));
}
