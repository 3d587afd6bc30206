//! In-process task queue for sync runs.
//!
//! Jobs go through an unbounded channel to a dispatcher that runs at most
//! `workers` of them at once. A job is queued at most once: enqueueing a job
//! that is already waiting, running or deferred is a no-op. A run returning
//! [`RunOutcome::RetryAfter`] is re-queued after its delay, up to
//! `max_deferrals` times in a row.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;

use super::{RunOutcome, SyncJob, SyncTask};
use crate::source::SourceRegistry;
use crate::sync::SyncProgress;

/// Default number of concurrent runs.
pub const DEFAULT_WORKERS: usize = 4;

/// Default limit on consecutive rate-limit deferrals for one job.
pub const DEFAULT_MAX_DEFERRALS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub workers: usize,
    pub max_deferrals: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_deferrals: DEFAULT_MAX_DEFERRALS,
        }
    }
}

/// Counters over the queue's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: usize,
    /// Enqueue calls ignored because the job was already pending.
    pub duplicates: usize,
    pub completed: usize,
    pub deferred: usize,
    pub failed: usize,
    /// Jobs dropped after too many deferrals, or deferred during shutdown.
    pub abandoned: usize,
}

struct Queued {
    job: SyncJob,
    /// Consecutive deferrals so far.
    attempt: u32,
}

struct Shared {
    task: SyncTask,
    config: QueueConfig,
    tx: mpsc::UnboundedSender<Queued>,
    pending: Mutex<HashSet<SyncJob>>,
    outstanding: AtomicUsize,
    idle: Notify,
    stats: Mutex<QueueStats>,
    shutdown: AtomicBool,
    /// Wakes deferred jobs early on shutdown.
    stopping: Notify,
}

impl Shared {
    fn record(&self, update: impl FnOnce(&mut QueueStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }

    fn finish(&self, job: &SyncJob) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(job);
        }
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Runs [`SyncJob`]s on a bounded pool of tokio tasks.
pub struct TaskQueue {
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
}

impl TaskQueue {
    /// Start a queue. Must be called inside a tokio runtime.
    pub fn start(task: SyncTask, config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            task,
            config,
            tx,
            pending: Mutex::new(HashSet::new()),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
            stats: Mutex::new(QueueStats::default()),
            shutdown: AtomicBool::new(false),
            stopping: Notify::new(),
        });
        let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
        let dispatcher = tokio::spawn(dispatch(Arc::clone(&shared), rx, semaphore));

        Self { shared, dispatcher }
    }

    /// Queue `job`. Returns `false` if it was already pending or the queue is
    /// shutting down.
    pub fn enqueue(&self, job: SyncJob) -> bool {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return false;
        }

        let inserted = match self.shared.pending.lock() {
            Ok(mut pending) => pending.insert(job.clone()),
            Err(_) => false,
        };
        if !inserted {
            tracing::debug!(%job, "Job already pending");
            self.shared.record(|s| s.duplicates += 1);
            return false;
        }

        self.shared.outstanding.fetch_add(1, Ordering::SeqCst);
        self.shared.record(|s| s.enqueued += 1);
        if self.shared.tx.send(Queued { job: job.clone(), attempt: 0 }).is_err() {
            self.shared.finish(&job);
            return false;
        }
        true
    }

    /// Sources the queued task can run.
    pub fn sources(&self) -> &SourceRegistry {
        self.shared.task.sources()
    }

    /// Jobs queued, running or waiting out a deferral.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> QueueStats {
        self.shared
            .stats
            .lock()
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Wait until no job is queued, running or deferred.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting work, let running jobs finish, drop deferred ones.
    pub async fn shutdown(self) -> QueueStats {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.stopping.notify_waiters();
        self.wait_idle().await;
        self.dispatcher.abort();
        self.stats()
    }
}

async fn dispatch(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    semaphore: Arc<Semaphore>,
) {
    while let Some(queued) = rx.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        tokio::spawn(run_one(Arc::clone(&shared), queued, permit));
    }
}

async fn run_one(shared: Arc<Shared>, queued: Queued, permit: OwnedSemaphorePermit) {
    let Queued { job, attempt } = queued;
    let result = shared.task.run(&job).await;
    drop(permit);

    match result {
        Ok(RunOutcome::Done(_)) => {
            shared.record(|s| s.completed += 1);
            shared.finish(&job);
        }
        Ok(RunOutcome::RetryAfter { delay, .. }) => {
            let attempt = attempt + 1;
            if attempt > shared.config.max_deferrals || shared.shutdown.load(Ordering::SeqCst) {
                tracing::warn!(%job, attempt, "Giving up on rate-limited job");
                shared.record(|s| s.abandoned += 1);
                shared.finish(&job);
                return;
            }

            tracing::info!(%job, attempt, delay_secs = delay.as_secs(), "Re-queueing rate-limited job");
            shared.record(|s| s.deferred += 1);
            shared.task.emit(SyncProgress::RetryScheduled {
                member: job.member.clone(),
                source: job.source,
                delay,
                attempt,
            });

            tokio::spawn(async move {
                let stopping = shared.stopping.notified();
                tokio::pin!(stopping);
                stopping.as_mut().enable();
                if !shared.shutdown.load(Ordering::SeqCst) {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = &mut stopping => {}
                    }
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    shared.record(|s| s.abandoned += 1);
                    shared.finish(&job);
                    return;
                }
                if let Err(mpsc::error::SendError(queued)) =
                    shared.tx.send(Queued { job, attempt })
                {
                    shared.finish(&queued.job);
                }
            });
        }
        Err(_) => {
            // Already logged by the task.
            shared.record(|s| s.failed += 1);
            shared.finish(&job);
        }
    }
}
