use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::codec::JobCodec;
use crate::config::{Config, QueueType};
use crate::counters::JobCounters;
use crate::durable::{DurableJobQueue, SpoolOpener};
use crate::error::QueueError;
use crate::memory::MemoryJobQueue;
use crate::queue::{JobQueue, PutError};
use crate::sink::BadJobSink;
use crate::strobe::{spawn_strobe, StrobeContext};
use crate::types::BoxedJob;
use crate::worker::{spawn_workers, WorkerContext};

/// The immutable scalars a scheduler is constructed with.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub thread_count: usize,
    pub strobe_interval: Duration,
    pub error_limit: u32,
    pub flush_limit: usize,
    pub jitter_rate: f64,
    pub error_delay: Duration,
    pub poll_interval: Duration,
    pub strobe_while_paused: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_count: 4,
            strobe_interval: Duration::from_millis(1000),
            error_limit: 10,
            flush_limit: 100,
            jitter_rate: 0.0,
            error_delay: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
            strobe_while_paused: true,
        }
    }
}

/// The injected collaborators a scheduler is wired up with. The opener and
/// codec are only consulted for durable queues.
#[derive(Clone)]
pub struct EngineContext {
    pub opener: Option<Arc<dyn SpoolOpener>>,
    pub codec: Option<Arc<dyn JobCodec>>,
    pub bad_jobs: Option<Arc<dyn BadJobSink>>,
    pub counters: Arc<JobCounters>,
}

/// Scheduler lifecycle state. `Shutdown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fresh,
    Running,
    Paused,
    Shutdown,
}

/// Everything mutated by lifecycle transitions, behind one mutex so the
/// lifecycle path is single-writer.
struct Lifecycle {
    state: RunState,
    workers: Vec<JoinHandle<()>>,
    worker_token: CancellationToken,
    strobe: Option<JoinHandle<()>>,
    strobe_token: CancellationToken,
}

/// One priority class worth of machinery: a primary queue polled by a worker
/// pool, a delayed error queue drained back into the primary by the strobe,
/// and an optional bad-job sink for jobs past their error limit.
pub struct JobScheduler {
    name: String,
    config: SchedulerConfig,
    primary: Arc<dyn JobQueue>,
    errors: Arc<dyn JobQueue>,
    bad_jobs: Option<Arc<dyn BadJobSink>>,
    counters: Arc<JobCounters>,
    active_threads: Arc<AtomicUsize>,
    paused: Arc<AtomicBool>,
    running: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

impl JobScheduler {
    /// Wires the drain relation from the error queue back into the primary.
    /// The primary queue knows nothing of the error queue.
    pub fn new(
        name: &str,
        config: SchedulerConfig,
        primary: Arc<dyn JobQueue>,
        errors: Arc<dyn JobQueue>,
        bad_jobs: Option<Arc<dyn BadJobSink>>,
        counters: Arc<JobCounters>,
    ) -> Self {
        errors.drain_to(primary.clone(), config.error_delay);
        Self {
            name: name.to_owned(),
            config,
            primary,
            errors,
            bad_jobs,
            counters,
            active_threads: Arc::new(AtomicUsize::new(0)),
            paused: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle {
                state: RunState::Fresh,
                workers: Vec::new(),
                worker_token: CancellationToken::new(),
                strobe: None,
                strobe_token: CancellationToken::new(),
            }),
        }
    }

    /// Materialize a scheduler for one priority's queue-name prefix, building
    /// both queues from the configured variant.
    pub fn from_config(prefix: &str, config: &Config, ctx: &EngineContext) -> Result<Self, QueueError> {
        let primary = build_queue(&format!("{prefix}_{}", config.job_queue), config, ctx)?;
        let errors = build_queue(&format!("{prefix}_{}", config.error_queue), config, ctx)?;
        Ok(Self::new(
            prefix,
            config.scheduler(),
            primary,
            errors,
            ctx.bad_jobs.clone(),
            ctx.counters.clone(),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The primary queue, exposed for inspection.
    pub fn primary_queue(&self) -> Arc<dyn JobQueue> {
        self.primary.clone()
    }

    /// The error queue, exposed for inspection.
    pub fn error_queue(&self) -> Arc<dyn JobQueue> {
        self.errors.clone()
    }

    /// Enqueue a job. Accepted in every state except shutdown, so producers
    /// may pre-load a scheduler before starting it.
    pub async fn put(&self, job: BoxedJob) -> Result<(), QueueError> {
        Ok(self.primary.put(job).await?)
    }

    pub async fn size(&self) -> usize {
        self.primary.size().await
    }

    pub async fn error_size(&self) -> usize {
        self.errors.size().await
    }

    pub fn active_threads(&self) -> usize {
        self.active_threads.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mirrors the primary queue's shutdown state, so a queue shut down out
    /// from under the scheduler is observable here.
    pub fn is_shutdown(&self) -> bool {
        self.primary.is_shutdown()
    }

    pub async fn state(&self) -> RunState {
        self.lifecycle.lock().await.state
    }

    /// Start queues, workers and the strobe. Idempotent once running; a
    /// no-op after shutdown.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != RunState::Fresh {
            return;
        }

        self.primary.start().await;
        self.errors.start().await;

        let worker_token = CancellationToken::new();
        lifecycle.workers =
            spawn_workers(&self.worker_context(), self.config.thread_count, &worker_token);
        lifecycle.worker_token = worker_token;

        let strobe_token = CancellationToken::new();
        lifecycle.strobe = Some(spawn_strobe(self.strobe_context(), strobe_token.clone()));
        lifecycle.strobe_token = strobe_token;

        lifecycle.state = RunState::Running;
        self.running.store(true, Ordering::SeqCst);
        info!(scheduler = %self.name, threads = self.config.thread_count, "scheduler started");
    }

    /// Pause both queues and tear the worker pool down. The strobe keeps
    /// running so matured errors continue to drain during the quiet period.
    pub async fn pause(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != RunState::Running {
            return;
        }

        self.primary.pause().await;
        self.errors.pause().await;
        Self::stop_workers(&mut lifecycle).await;

        self.paused.store(true, Ordering::SeqCst);
        lifecycle.state = RunState::Paused;
        self.running.store(false, Ordering::SeqCst);
        info!(scheduler = %self.name, "scheduler paused");
    }

    /// Resume both queues and respawn a fresh worker pool of the configured
    /// size.
    pub async fn resume(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != RunState::Paused {
            return;
        }

        self.primary.resume().await;
        self.errors.resume().await;

        let worker_token = CancellationToken::new();
        lifecycle.workers =
            spawn_workers(&self.worker_context(), self.config.thread_count, &worker_token);
        lifecycle.worker_token = worker_token;

        self.paused.store(false, Ordering::SeqCst);
        lifecycle.state = RunState::Running;
        self.running.store(true, Ordering::SeqCst);
        info!(scheduler = %self.name, "scheduler resumed");
    }

    /// Shut down queues, workers and the strobe. Returns once every worker
    /// task has terminated; in-flight jobs run to completion. Idempotent.
    pub async fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state == RunState::Shutdown {
            return;
        }

        self.primary.shutdown().await;
        self.errors.shutdown().await;
        Self::stop_workers(&mut lifecycle).await;

        lifecycle.strobe_token.cancel();
        if let Some(strobe) = lifecycle.strobe.take() {
            let _ = strobe.await;
        }

        lifecycle.state = RunState::Shutdown;
        self.running.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        info!(scheduler = %self.name, "scheduler shut down");
    }

    /// Immediate, unconditional administrative drain of the error queue into
    /// the primary. The loop is bounded by the error-queue size observed at
    /// entry, so concurrent re-erroring cannot keep it alive. Returns the
    /// number of jobs transferred.
    pub async fn retry_errors(&self) -> Result<usize, QueueError> {
        let bound = self.errors.size().await;
        let mut moved = 0;
        for _ in 0..bound {
            match self.errors.get().await? {
                None => break,
                Some(ticket) => {
                    let (job, receipt) = ticket.into_parts();
                    if let Err(put_error) = self.primary.put(job).await {
                        // Hand the job back to the error queue rather than
                        // dropping it with the dequeued entry.
                        let PutError { job, error } = put_error;
                        match self.errors.put(job).await {
                            Ok(()) => {
                                let _ = self.errors.ack(receipt).await;
                            }
                            Err(restore_error) => {
                                warn!(
                                    scheduler = %self.name,
                                    error = %restore_error.error,
                                    "failed to restore a job to the error queue"
                                );
                            }
                        }
                        return Err(error);
                    }
                    self.errors.ack(receipt).await?;
                    moved += 1;
                }
            }
        }
        Ok(moved)
    }

    async fn stop_workers(lifecycle: &mut Lifecycle) {
        lifecycle.worker_token.cancel();
        for worker in lifecycle.workers.drain(..) {
            let _ = worker.await;
        }
    }

    fn worker_context(&self) -> Arc<WorkerContext> {
        Arc::new(WorkerContext {
            scheduler: self.name.clone(),
            primary: self.primary.clone(),
            errors: self.errors.clone(),
            bad_jobs: self.bad_jobs.clone(),
            counters: self.counters.clone(),
            active_threads: self.active_threads.clone(),
            error_limit: self.config.error_limit,
            poll_interval: self.config.poll_interval,
        })
    }

    fn strobe_context(&self) -> StrobeContext {
        StrobeContext {
            scheduler: self.name.clone(),
            errors: self.errors.clone(),
            interval: self.config.strobe_interval,
            jitter_rate: self.config.jitter_rate,
            flush_limit: self.config.flush_limit,
            paused: self.paused.clone(),
            strobe_while_paused: self.config.strobe_while_paused,
        }
    }
}

fn build_queue(
    name: &str,
    config: &Config,
    ctx: &EngineContext,
) -> Result<Arc<dyn JobQueue>, QueueError> {
    match config.queue_type {
        QueueType::Memory => Ok(Arc::new(MemoryJobQueue::new(name, config.size_limit))),
        QueueType::Durable => {
            let opener = ctx.opener.as_ref().ok_or_else(|| {
                QueueError::Config("durable queues need a spool opener".to_owned())
            })?;
            let codec = ctx.codec.as_ref().ok_or_else(|| {
                QueueError::Config("durable queues need a job codec".to_owned())
            })?;
            Ok(Arc::new(DurableJobQueue::new(
                name,
                opener.open(name)?,
                codec.clone(),
            )))
        }
    }
}
