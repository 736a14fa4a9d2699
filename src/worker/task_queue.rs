//! Serial background task queue.
//!
//! One dedicated worker thread runs a fixed work function over queued items
//! in submission order. After each item the completion continuation runs on
//! the worker thread with the original item and the outcome, then the next
//! queued item is picked up without any external trigger.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::error::Error;
use crate::core::types::Result;

/// Why a work item did not complete normally
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("work failed: {0}")]
    Failed(#[source] Error),

    #[error("work panicked: {0}")]
    Panicked(String),
}

/// Outcome handed to a completion continuation
pub type TaskOutcome = std::result::Result<(), TaskError>;

type Completion<T> = Box<dyn FnOnce(T, TaskOutcome) + Send>;

struct WorkItem<T> {
    seq: u64,
    item: T,
    on_complete: Completion<T>,
}

#[derive(Default)]
struct QueueState {
    queued: AtomicUsize,
    busy: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// FIFO queue served by a single worker thread
pub struct TaskQueue<T: Send + 'static> {
    name: String,
    sender: Option<mpsc::UnboundedSender<WorkItem<T>>>,
    state: Arc<QueueState>,
    next_seq: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Spawn the worker thread. `work` runs once per queued item.
    pub fn new<W>(name: impl Into<String>, work: W) -> Result<Self>
    where
        W: FnMut(&mut T) -> Result<()> + Send + 'static,
    {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel::<WorkItem<T>>();
        let state = Arc::new(QueueState::default());

        let worker_state = state.clone();
        let worker_name = name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::worker_loop(worker_name, work, receiver, worker_state))?;

        Ok(Self {
            name,
            sender: Some(sender),
            state,
            next_seq: AtomicU64::new(0),
            worker: Some(worker),
        })
    }

    fn worker_loop<W>(
        name: String,
        mut work: W,
        mut receiver: mpsc::UnboundedReceiver<WorkItem<T>>,
        state: Arc<QueueState>,
    ) where
        W: FnMut(&mut T) -> Result<()>,
    {
        log::info!("Task queue '{}' worker started", name);

        while let Some(WorkItem { seq, mut item, on_complete }) = receiver.blocking_recv() {
            // busy before dequeued so is_idle never sees a gap
            state.busy.store(true, Ordering::SeqCst);
            state.queued.fetch_sub(1, Ordering::SeqCst);
            log::debug!("Task queue '{}' running item #{}", name, seq);

            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| work(&mut item))) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(TaskError::Failed(err)),
                Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
            };

            if let Err(err) = &outcome {
                state.failed.fetch_add(1, Ordering::SeqCst);
                log::error!("Task queue '{}' item #{} failed: {}", name, seq, err);
            }

            if panic::catch_unwind(AssertUnwindSafe(|| on_complete(item, outcome))).is_err() {
                log::error!("Task queue '{}' completion for item #{} panicked", name, seq);
            }

            state.completed.fetch_add(1, Ordering::SeqCst);
            state.busy.store(false, Ordering::SeqCst);
            log::debug!("Task queue '{}' finished item #{}", name, seq);
        }

        log::info!("Task queue '{}' worker stopped", name);
    }

    /// Queue an item. Never blocks; `on_complete` runs on the worker thread
    /// after the work function has processed the item.
    pub fn enqueue<F>(&self, item: T, on_complete: F) -> Result<()>
    where
        F: FnOnce(T, TaskOutcome) + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::WorkerStopped(self.name.clone()))?;

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.state.queued.fetch_add(1, Ordering::SeqCst);
        let work_item = WorkItem {
            seq,
            item,
            on_complete: Box::new(on_complete),
        };

        if sender.send(work_item).is_err() {
            self.state.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::WorkerStopped(self.name.clone()));
        }
        Ok(())
    }

    /// Worker thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items waiting to be picked up (excludes the running one)
    pub fn queued_count(&self) -> usize {
        self.state.queued.load(Ordering::SeqCst)
    }

    /// True while the worker runs an item or its completion
    pub fn is_busy(&self) -> bool {
        self.state.busy.load(Ordering::SeqCst)
    }

    /// True when nothing is queued or running
    pub fn is_idle(&self) -> bool {
        // queued first: the worker raises busy before it decrements queued
        self.queued_count() == 0 && !self.is_busy()
    }

    /// Number of items whose completion has run
    pub fn completed_count(&self) -> u64 {
        self.state.completed.load(Ordering::SeqCst)
    }

    /// Number of items whose work function failed or panicked
    pub fn failed_count(&self) -> u64 {
        self.state.failed.load(Ordering::SeqCst)
    }

    /// Poll until idle or until `timeout` passes. Returns whether idle was reached.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl<T: Send + 'static> Drop for TaskQueue<T> {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit
        self.sender = None;
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                log::error!("Task queue '{}' worker panicked during shutdown", self.name);
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_never_idle_while_item_runs() {
        let queue = TaskQueue::new("test-idle", |_: &mut ()| {
            thread::sleep(Duration::from_millis(1));
            Ok(())
        })
        .unwrap();

        for round in 0..200u64 {
            queue.enqueue((), |_, _| {}).unwrap();
            let deadline = Instant::now() + TIMEOUT;
            while queue.completed_count() <= round {
                if queue.is_idle() {
                    // idle is only allowed once the completion counted
                    assert!(queue.completed_count() > round, "idle during round {}", round);
                }
                assert!(Instant::now() < deadline);
            }
        }
        assert!(queue.wait_idle(TIMEOUT));
    }

    #[test]
    fn test_completions_follow_submission_order() {
        let queue = TaskQueue::new("test-order", |ms: &mut u64| {
            thread::sleep(Duration::from_millis(*ms));
            Ok(())
        })
        .unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        // longer items first, so any reordering would show
        for ms in [20u64, 5, 1, 0, 10] {
            let order = order.clone();
            queue
                .enqueue(ms, move |item, outcome| {
                    assert!(outcome.is_ok());
                    order.lock().unwrap().push(item);
                })
                .unwrap();
        }

        assert!(queue.wait_idle(TIMEOUT));
        assert_eq!(*order.lock().unwrap(), vec![20, 5, 1, 0, 10]);
        assert_eq!(queue.completed_count(), 5);
    }

    #[test]
    fn test_work_runs_before_completion() {
        let queue = TaskQueue::new("test-mutate", |v: &mut Vec<u32>| {
            v.push(1);
            Ok(())
        })
        .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        queue
            .enqueue(vec![0], move |v, _| {
                tx.send(v).unwrap();
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_failure_does_not_stop_queue() {
        let queue = TaskQueue::new("test-failure", |v: &mut i32| {
            if *v < 0 {
                return Err(Error::InvalidField(format!("negative {}", v)));
            }
            if *v == 0 {
                panic!("zero");
            }
            Ok(())
        })
        .unwrap();

        let outcomes = Arc::new(Mutex::new(Vec::new()));
        for v in [-1, 0, 3] {
            let outcomes = outcomes.clone();
            queue
                .enqueue(v, move |item, outcome| {
                    outcomes.lock().unwrap().push((item, outcome));
                })
                .unwrap();
        }

        assert!(queue.wait_idle(TIMEOUT));
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], (-1, Err(TaskError::Failed(_)))));
        assert!(matches!(&outcomes[1], (0, Err(TaskError::Panicked(msg))) if msg == "zero"));
        assert!(matches!(outcomes[2], (3, Ok(()))));
        assert_eq!(queue.failed_count(), 2);
    }

    #[test]
    fn test_panicking_completion_keeps_worker_alive() {
        let queue = TaskQueue::new("test-completion-panic", |_: &mut u8| Ok(())).unwrap();
        queue.enqueue(1, |_, _| panic!("continuation")).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        queue.enqueue(2, move |item, _| tx.send(item).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 2);
    }

    #[test]
    fn test_enqueue_from_other_threads() {
        let queue = Arc::new(TaskQueue::new("test-threads", |_: &mut usize| Ok(())).unwrap());
        let count = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = queue.clone();
                let count = count.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        let count = count.clone();
                        queue
                            .enqueue(t * 100 + i, move |_, _| {
                                count.fetch_add(1, Ordering::SeqCst);
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(queue.wait_idle(TIMEOUT));
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_idle_when_empty() {
        let queue = TaskQueue::new("test-idle", |_: &mut ()| Ok(())).unwrap();
        assert!(queue.is_idle());
        assert_eq!(queue.queued_count(), 0);
        assert_eq!(queue.name(), "test-idle");
    }

    #[test]
    fn test_drop_drains_queued_items() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let queue = TaskQueue::new("test-drop", |_: &mut u8| {
                thread::sleep(Duration::from_millis(2));
                Ok(())
            })
            .unwrap();
            for i in 0..5 {
                let count = count.clone();
                queue
                    .enqueue(i, move |_, _| {
                        count.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
            }
        }
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }
}
