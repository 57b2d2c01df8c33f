//! Background upload queue.
//!
//! Jobs are processed strictly in FIFO order by a single worker task, so
//! at most one upload (including its retries) is in flight at a time.
//! The queue is unbounded; enqueueing never blocks the caller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::client::{UploadClient, UploadJob, UploadOutcome, UploadPolicy};

/// Called with the terminal outcome of a job.
pub type OutcomeCallback = Arc<dyn Fn(&UploadOutcome) + Send + Sync>;

/// Hooks fired once per job after its last attempt: `on_success` when
/// the upload landed, `on_error` when every attempt failed.
#[derive(Clone, Default)]
pub struct UploadCallbacks {
    pub on_success: Option<OutcomeCallback>,
    pub on_error: Option<OutcomeCallback>,
}

impl UploadCallbacks {
    fn fire(&self, outcome: &UploadOutcome) {
        let callback = if outcome.success {
            &self.on_success
        } else {
            &self.on_error
        };
        if let Some(callback) = callback {
            callback(outcome);
        }
    }
}

/// Counters over the lifetime of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    /// Jobs accepted but not yet resolved.
    pub pending: u64,
}

#[derive(Default)]
struct StatsInner {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    pending: AtomicU64,
}

impl StatsInner {
    fn snapshot(&self) -> UploadStats {
        UploadStats {
            total: self.total.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the background upload task.
pub struct UploadWorker {
    queue_tx: Option<UnboundedSender<UploadJob>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<StatsInner>,
    policy: Arc<RwLock<UploadPolicy>>,
    abandon: Arc<AtomicBool>,
}

impl UploadWorker {
    /// Start the worker task on the current tokio runtime.
    pub fn spawn(policy: UploadPolicy, callbacks: UploadCallbacks) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(StatsInner::default());
        let policy = Arc::new(RwLock::new(policy));
        let abandon = Arc::new(AtomicBool::new(false));

        let worker = tokio::spawn(worker_loop(
            queue_rx,
            Arc::clone(&policy),
            Arc::clone(&stats),
            Arc::clone(&abandon),
            callbacks,
        ));

        Self {
            queue_tx: Some(queue_tx),
            worker: Some(worker),
            stats,
            policy,
            abandon,
        }
    }

    /// Queue a photo for upload. Returns immediately.
    pub fn enqueue(&self, image: Bytes, filename: String) {
        let Some(tx) = &self.queue_tx else {
            log::warn!("Upload queue closed, dropping {filename}");
            return;
        };

        self.stats.total.fetch_add(1, Ordering::Relaxed);
        self.stats.pending.fetch_add(1, Ordering::Relaxed);
        log::debug!("Queued {filename} for upload");

        if tx.send(UploadJob::new(image, filename)).is_err() {
            self.stats.pending.fetch_sub(1, Ordering::Relaxed);
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            log::warn!("Upload worker is gone, job dropped");
        }
    }

    /// Upload one photo on the caller's task, bypassing the queue.
    /// Uses the same endpoint, wire format and retry schedule, and is
    /// counted in the worker's stats.
    pub async fn upload_sync(&self, image: Bytes, filename: String) -> UploadOutcome {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        self.stats.pending.fetch_add(1, Ordering::Relaxed);

        let policy = self.current_policy();
        let mut job = UploadJob::new(image, filename);
        let outcome = run_one(policy, &mut job).await;

        self.stats.pending.fetch_sub(1, Ordering::Relaxed);
        if outcome.success {
            self.stats.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    /// Swap the endpoint parameters. Already-queued jobs are kept and
    /// will be sent with the new policy.
    pub fn reconfigure(&self, policy: UploadPolicy) {
        if let Ok(mut current) = self.policy.write() {
            log::info!("Upload endpoint reconfigured: {}", policy.url);
            *current = policy;
        }
    }

    pub fn stats(&self) -> UploadStats {
        self.stats.snapshot()
    }

    /// Stop the worker.
    ///
    /// With `wait_for_drain` the queue is closed and every remaining job
    /// is processed before this returns. Without it, the job currently
    /// in flight still resolves but queued jobs are abandoned.
    /// Idempotent; a second call returns immediately.
    pub async fn shutdown(&mut self, wait_for_drain: bool) {
        if !wait_for_drain {
            self.abandon.store(true, Ordering::SeqCst);
        }
        // Dropping the sender closes the queue
        self.queue_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    fn current_policy(&self) -> UploadPolicy {
        match self.policy.read() {
            Ok(policy) => policy.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

async fn worker_loop(
    mut queue_rx: UnboundedReceiver<UploadJob>,
    policy: Arc<RwLock<UploadPolicy>>,
    stats: Arc<StatsInner>,
    abandon: Arc<AtomicBool>,
    callbacks: UploadCallbacks,
) {
    while let Some(mut job) = queue_rx.recv().await {
        if abandon.load(Ordering::SeqCst) {
            stats.pending.fetch_sub(1, Ordering::Relaxed);
            stats.failed.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let current = match policy.read() {
            Ok(p) => p.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let outcome = run_one(current, &mut job).await;

        stats.pending.fetch_sub(1, Ordering::Relaxed);
        if outcome.success {
            stats.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        callbacks.fire(&outcome);
    }
    log::debug!("Upload worker exited");
}

async fn run_one(policy: UploadPolicy, job: &mut UploadJob) -> UploadOutcome {
    match UploadClient::new(policy) {
        Ok(client) => client.run_job(job).await,
        Err(e) => UploadOutcome {
            success: false,
            filename: job.filename.clone(),
            status: None,
            error: Some(format!("Upload client setup failed: {e}")),
            elapsed: std::time::Duration::ZERO,
        },
    }
}
