//! Background initializer owned by every scene root.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::core::types::Result;
use crate::worker::{TaskOutcome, TaskQueue};

use super::entity::{Entity, InitContext};
use super::node::SceneNodeId;

/// An entity travelling to the worker thread for initialization.
pub(crate) struct InitJob {
    pub node: SceneNodeId,
    pub entity: Box<dyn Entity>,
    pub ctx: InitContext,
    pub initialized: Arc<AtomicBool>,
}

/// A finished job, posted back for the owning root to drain.
pub(crate) struct InitCompletion {
    pub job: InitJob,
    pub outcome: TaskOutcome,
}

/// One worker thread plus the completion channel drained once per tick.
pub(crate) struct Scheduler {
    queue: TaskQueue<InitJob>,
    completions_tx: mpsc::UnboundedSender<InitCompletion>,
    completions_rx: mpsc::UnboundedReceiver<InitCompletion>,
}

impl Scheduler {
    pub(crate) fn new(name: &str) -> Result<Self> {
        let queue = TaskQueue::new(name, |job: &mut InitJob| {
            job.entity.initialize(&mut job.ctx)?;
            job.initialized.store(true, Ordering::SeqCst);
            job.ctx.progress().set_progress(100)?;
            Ok(())
        })?;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Ok(Self {
            queue,
            completions_tx,
            completions_rx,
        })
    }

    /// Queue a job; completions arrive in submission order.
    pub(crate) fn submit(&self, job: InitJob) -> Result<()> {
        let completions = self.completions_tx.clone();
        self.queue.enqueue(job, move |job, outcome| {
            // receiver lives as long as the scheduler itself
            let _ = completions.send(InitCompletion { job, outcome });
        })
    }

    /// Completions posted since the last drain, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<InitCompletion> {
        let mut completions = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            completions.push(completion);
        }
        completions
    }

    /// Jobs queued or running on the worker.
    pub(crate) fn in_flight(&self) -> usize {
        let queued = self.queue.queued_count();
        queued + usize::from(self.queue.is_busy())
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::ProgressReporter;
    use std::time::Duration;

    struct Slow(u64);
    impl Entity for Slow {
        fn initialize(&mut self, _ctx: &mut InitContext) -> Result<()> {
            std::thread::sleep(Duration::from_millis(self.0));
            Ok(())
        }
    }

    fn job(id: u64, ms: u64) -> InitJob {
        InitJob {
            node: SceneNodeId(id),
            entity: Box::new(Slow(ms)),
            ctx: InitContext::new(SceneNodeId(id), ProgressReporter::new()),
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_drain_in_submission_order() {
        let mut scheduler = Scheduler::new("test-scheduler").unwrap();
        scheduler.submit(job(1, 15)).unwrap();
        scheduler.submit(job(2, 0)).unwrap();
        scheduler.submit(job(3, 5)).unwrap();
        assert!(scheduler.queue.wait_idle(Duration::from_secs(5)));

        let drained = scheduler.drain();
        let ids: Vec<_> = drained.iter().map(|c| c.job.node).collect();
        assert_eq!(ids, vec![SceneNodeId(1), SceneNodeId(2), SceneNodeId(3)]);
        assert!(drained.iter().all(|c| c.outcome.is_ok()));
        assert!(drained.iter().all(|c| c.job.initialized.load(Ordering::SeqCst)));
        assert!(drained.iter().all(|c| c.job.ctx.progress().is_complete()));
        assert_eq!(scheduler.in_flight(), 0);
        assert!(scheduler.drain().is_empty());
    }
}
