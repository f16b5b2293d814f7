//! Run orchestration: health check, sampling, and the worker pool
//!
//! Every sampled key is an independent unit of work: fetch from the old
//! backend, fetch from the new backend, diff, and write artifacts on a
//! mismatch. A fixed number of workers drain a shared queue of keys. The
//! first fatal error raises a [`CancelSignal`]; idle workers stop pulling
//! keys, in-flight fetches are abandoned, and artifact writes already
//! underway are allowed to finish.

use crate::client::BackendClient;
use crate::compare;
use crate::config::{Mode, RunConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::report::{ArtifactPaths, DiffReporter};
use crate::sampler::{self, ComparisonKey};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Shared stop flag for all workers of a run
#[derive(Clone)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
    notify_tx: broadcast::Sender<()>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (notify_tx, _) = broadcast::channel(1);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify_tx,
        }
    }

    /// Raise the signal; later calls are no-ops
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            let _ = self.notify_tx.send(());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the signal is raised
    pub async fn cancelled(&self) {
        // Subscribe before checking the flag so a concurrent cancel is not missed
        let mut notify_rx = self.notify_tx.subscribe();
        if self.is_cancelled() {
            return;
        }
        let _ = notify_rx.recv().await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to one key
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    /// Both backends returned equivalent documents
    Equivalent,
    /// Documents differ; artifacts were written
    Different(ArtifactPaths),
    /// A backend timed out; the key was not compared
    Skipped,
    /// The run was cancelled before the key finished
    Cancelled,
}

/// Per-run counts, merged from each worker's own tally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sampled: usize,
    pub equivalent: usize,
    pub different: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &KeyOutcome) {
        match outcome {
            KeyOutcome::Equivalent => self.equivalent += 1,
            KeyOutcome::Different(_) => self.different += 1,
            KeyOutcome::Skipped => self.skipped += 1,
            KeyOutcome::Cancelled => self.cancelled += 1,
        }
    }

    fn merge(&mut self, other: &RunSummary) {
        self.equivalent += other.equivalent;
        self.different += other.different;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
    }

    /// Keys that produced a comparison or a timeout
    pub fn processed(&self) -> usize {
        self.equivalent + self.different + self.skipped
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sampled={} equivalent={} different={} skipped={} failed={} cancelled={}",
            self.sampled, self.equivalent, self.different, self.skipped, self.failed, self.cancelled
        )
    }
}

#[derive(Default)]
struct WorkerReport {
    summary: RunSummary,
    error: Option<HarnessError>,
}

type KeyQueue = Arc<Mutex<mpsc::UnboundedReceiver<ComparisonKey>>>;

/// The per-key pipeline shared by every worker
struct KeyPipeline {
    mode: Mode,
    old: BackendClient,
    new: BackendClient,
    reporter: DiffReporter,
}

impl KeyPipeline {
    async fn drain(self: Arc<Self>, worker: usize, queue: KeyQueue, cancel: CancelSignal) -> WorkerReport {
        let mut report = WorkerReport::default();

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let next = queue.lock().await.recv().await;
            let Some(key) = next else {
                break;
            };

            match self.process(&key, &cancel).await {
                Ok(outcome) => report.summary.record(&outcome),
                Err(err) => {
                    error!(worker, key = %key, error = %err, "Fatal error, cancelling run");
                    cancel.cancel();
                    report.summary.failed += 1;
                    report.error = Some(err);
                    break;
                }
            }
        }

        debug!(worker, "Worker finished: {}", report.summary);
        report
    }

    async fn process(&self, key: &ComparisonKey, cancel: &CancelSignal) -> HarnessResult<KeyOutcome> {
        let path = self.mode.request_path(key);

        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Ok(KeyOutcome::Cancelled),
            fetched = self.fetch_pair(key, &path) => fetched?,
        };
        let Some((old, new)) = fetched else {
            return Ok(KeyOutcome::Skipped);
        };

        let result = compare::diff(&old, &new);
        if result.is_equivalent() {
            debug!(key = %key, path = %path, "Responses are equivalent");
            return Ok(KeyOutcome::Equivalent);
        }

        warn!(
            key = %key,
            path = %path,
            "There is a difference between old and new: {}",
            result
        );
        let paths = self.reporter.write(key, &old, &new).await?;
        Ok(KeyOutcome::Different(paths))
    }

    /// Old first, then new. A timeout on either side skips the key.
    async fn fetch_pair(&self, key: &ComparisonKey, path: &str) -> HarnessResult<Option<(Value, Value)>> {
        let Some(old) = Self::fetch(&self.old, key, path).await? else {
            return Ok(None);
        };
        let Some(new) = Self::fetch(&self.new, key, path).await? else {
            return Ok(None);
        };
        Ok(Some((old, new)))
    }

    async fn fetch(client: &BackendClient, key: &ComparisonKey, path: &str) -> HarnessResult<Option<Value>> {
        match client.get_json(path).await {
            Ok(document) => Ok(Some(document)),
            Err(e) if e.is_transient() => {
                warn!(
                    key = %key,
                    path = %path,
                    backend = client.name(),
                    error = %e,
                    "Failed to read response, skipping key"
                );
                Ok(None)
            }
            Err(source) => Err(HarnessError::Fetch {
                key: key.to_string(),
                path: path.to_string(),
                backend: client.name().to_string(),
                source,
            }),
        }
    }
}

/// Drives a complete diff run for one [`RunConfig`]
pub struct DiffHarness {
    config: RunConfig,
    pipeline: Arc<KeyPipeline>,
    cancel: CancelSignal,
}

impl DiffHarness {
    /// Validate the config and build both backend clients
    pub fn new(config: RunConfig) -> HarnessResult<Self> {
        config.validate()?;

        let pipeline = KeyPipeline {
            mode: config.mode,
            old: BackendClient::for_old(&config)?,
            new: BackendClient::for_new(&config)?,
            reporter: DiffReporter::new(&config.diff_dir),
        };

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            cancel: CancelSignal::new(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Handle that stops the run when raised (e.g. from a Ctrl-C handler)
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Health check, load and sample keys, reset the output, compare
    pub async fn run(&self) -> HarnessResult<RunSummary> {
        info!("Start server mode test (mode: {})", self.config.mode);

        self.wait_for_backends().await?;

        let keys = sampler::load_keys(&self.config.list_path)?;
        self.pipeline.reporter.reset().await?;
        let sampled = sampler::sample_seeded(&keys, self.config.sample_rate, self.config.seed);

        self.run_keys(sampled).await
    }

    /// Poll both health endpoints until both succeed or attempts run out
    pub async fn wait_for_backends(&self) -> HarnessResult<()> {
        let policy = &self.config.health;
        let (old, new) = (&self.pipeline.old, &self.pipeline.new);
        info!("Check the communication with the servers");

        let mut last = (false, false);
        for attempt in 1..=policy.attempts {
            last = tokio::join!(old.is_healthy(&policy.path), new.is_healthy(&policy.path));
            if last == (true, true) {
                info!("Communication with the servers has been confirmed");
                return Ok(());
            }
            debug!(attempt, old_ok = last.0, new_ok = last.1, "Backends not ready");
            if attempt < policy.attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        let failing = if last.0 { new } else { old };
        error!("Failed to communicate with {} backend", failing.name());
        Err(HarnessError::HealthCheck {
            backend: failing.name().to_string(),
            url: failing.base_url().to_string(),
            attempts: policy.attempts,
        })
    }

    /// Run the fetch/diff/report pipeline for a single key
    pub async fn diff_key(&self, key: &ComparisonKey) -> HarnessResult<KeyOutcome> {
        self.pipeline.process(key, &self.cancel).await
    }

    /// Compare the given keys with the configured worker count.
    ///
    /// Returns the first fatal error if any worker hit one, and
    /// `HarnessError::Cancelled` if the run was interrupted with keys left
    /// over; otherwise the summary of the run.
    pub async fn run_keys(&self, keys: Vec<ComparisonKey>) -> HarnessResult<RunSummary> {
        let total = keys.len();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        for key in keys {
            // Receiver is alive until the workers are spawned below
            let _ = queue_tx.send(key);
        }
        drop(queue_tx);
        let queue: KeyQueue = Arc::new(Mutex::new(queue_rx));

        let worker_count = self.config.workers.min(total).max(1);
        info!(keys = total, workers = worker_count, "Comparing responses");

        let mut workers = JoinSet::new();
        for worker in 0..worker_count {
            let pipeline = self.pipeline.clone();
            workers.spawn(pipeline.drain(worker, queue.clone(), self.cancel.clone()));
        }

        let mut summary = RunSummary {
            sampled: total,
            ..RunSummary::default()
        };
        let mut first_error = None;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => {
                    summary.merge(&report.summary);
                    if first_error.is_none() {
                        first_error = report.error;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Worker task failed, cancelling run");
                    self.cancel.cancel();
                    if first_error.is_none() {
                        first_error = Some(HarnessError::Worker(e.to_string()));
                    }
                }
            }
        }

        // Keys never taken from the queue
        summary.cancelled = total - summary.processed() - summary.failed;

        match first_error {
            Some(err) => {
                error!("Run aborted: {}", summary);
                Err(err)
            }
            None if summary.cancelled > 0 => {
                warn!("Run cancelled: {}", summary);
                Err(HarnessError::Cancelled {
                    cancelled: summary.cancelled,
                    sampled: summary.sampled,
                })
            }
            None => {
                info!("Run finished: {}", summary);
                Ok(summary)
            }
        }
    }
}
