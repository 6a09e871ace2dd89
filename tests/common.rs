use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jobspool::{
    BadJobSink, BoxedJob, Job, JobCounters, JobFailure, JobQueue, JobScheduler, MemoryJobQueue,
    PutError, QueueError, Receipt, SchedulerConfig, Ticket,
};

// Note we are ignoring some warnings in this module.
// This is due to a long-standing cargo bug that reports imports and helper
// functions as unused. See: https://github.com/rust-lang/rust/issues/46379.

/// What a scripted job does on each execution.
#[allow(dead_code)]
#[derive(Clone, Copy)]
pub enum Behavior {
    Succeed,
    /// Sleep, then succeed. Used to observe in-flight jobs across shutdown.
    SucceedSlowly(Duration),
    Blackholed,
    FailAlways,
    /// Raise Rejected for the first n executions, then succeed.
    RejectFirst(usize),
}

/// Shared handles a test keeps after handing the job to a queue.
pub struct JobProbe {
    pub executions: Arc<AtomicUsize>,
    pub error_count: Arc<AtomicU32>,
}

pub struct ScriptedJob {
    tag: String,
    behavior: Behavior,
    executions: Arc<AtomicUsize>,
    error_count: u32,
    error_count_probe: Arc<AtomicU32>,
    error_message: Option<String>,
}

/// Build a job whose execution follows `behavior`, plus the probe observing
/// it from the outside.
pub fn scripted(tag: &str, behavior: Behavior) -> (BoxedJob, JobProbe) {
    let executions = Arc::new(AtomicUsize::new(0));
    let error_count_probe = Arc::new(AtomicU32::new(0));
    let job = Box::new(ScriptedJob {
        tag: tag.to_owned(),
        behavior,
        executions: executions.clone(),
        error_count: 0,
        error_count_probe: error_count_probe.clone(),
        error_message: None,
    });
    (
        job,
        JobProbe {
            executions,
            error_count: error_count_probe,
        },
    )
}

#[async_trait]
impl Job for ScriptedJob {
    async fn execute(&self) -> Result<(), JobFailure> {
        let execution = self.executions.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::SucceedSlowly(pause) => {
                tokio::time::sleep(pause).await;
                Ok(())
            }
            Behavior::Blackholed => Err(JobFailure::Blackholed(format!(
                "{} points at a dead target",
                self.tag
            ))),
            Behavior::FailAlways => {
                Err(JobFailure::Failed(format!("{} cannot be applied", self.tag)))
            }
            Behavior::RejectFirst(rejections) => {
                if execution < rejections {
                    Err(JobFailure::Rejected(format!(
                        "{} target is overloaded",
                        self.tag
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("scripted[{}]", self.tag)
    }

    fn error_count(&self) -> u32 {
        self.error_count
    }

    fn set_error_count(&mut self, count: u32) {
        self.error_count = count;
        self.error_count_probe.store(count, Ordering::SeqCst);
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    fn set_error_message(&mut self, message: String) {
        self.error_message = Some(message);
    }
}

/// Bad-job sink that remembers what it swallowed.
#[derive(Default)]
pub struct RecordingSink {
    jobs: Mutex<Vec<(String, u32)>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn sunk(&self) -> Vec<(String, u32)> {
        self.jobs.lock().expect("poisoned sink lock").clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("poisoned sink lock").len()
    }
}

#[async_trait]
impl BadJobSink for RecordingSink {
    async fn put(&self, job: BoxedJob) -> Result<(), QueueError> {
        self.jobs
            .lock()
            .expect("poisoned sink lock")
            .push((job.describe(), job.error_count()));
        Ok(())
    }
}

/// Bad-job sink that always refuses, for exercising the worker's
/// log-and-continue policy.
#[derive(Default)]
pub struct FailingSink {
    attempts: AtomicUsize,
}

#[allow(dead_code)]
impl FailingSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BadJobSink for FailingSink {
    async fn put(&self, _job: BoxedJob) -> Result<(), QueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(QueueError::Backend("sink unavailable".to_owned()))
    }
}

/// Queue double that refuses the first `failures` puts and delegates
/// everything else to an unbounded memory queue.
pub struct FlakyQueue {
    inner: MemoryJobQueue,
    failures_left: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyQueue {
    pub fn new(name: &str, failures: usize) -> Self {
        Self {
            inner: MemoryJobQueue::new(name, 0),
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl JobQueue for FlakyQueue {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn put(&self, job: BoxedJob) -> Result<(), PutError> {
        let refuse = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refuse {
            return Err(PutError::new(
                job,
                QueueError::Backend("injected put failure".to_owned()),
            ));
        }
        self.inner.put(job).await
    }

    async fn get(&self) -> Result<Option<Ticket>, QueueError> {
        self.inner.get().await
    }

    async fn ack(&self, receipt: Receipt) -> Result<(), QueueError> {
        self.inner.ack(receipt).await
    }

    async fn size(&self) -> usize {
        self.inner.size().await
    }

    async fn start(&self) {
        self.inner.start().await
    }

    async fn pause(&self) {
        self.inner.pause().await
    }

    async fn resume(&self) {
        self.inner.resume().await
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await
    }

    fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }

    fn drain_to(&self, target: Arc<dyn JobQueue>, delay: Duration) {
        self.inner.drain_to(target, delay)
    }

    async fn check_expiration(&self, flush_limit: usize) -> Result<usize, QueueError> {
        self.inner.check_expiration(flush_limit).await
    }
}

/// A scheduler over unbounded memory queues, with injected counters.
#[allow(dead_code)]
pub fn memory_scheduler(
    name: &str,
    config: SchedulerConfig,
    sink: Option<Arc<RecordingSink>>,
) -> (Arc<JobScheduler>, Arc<JobCounters>) {
    let counters = Arc::new(JobCounters::default());
    let primary: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new(&format!("{name}_jobs"), 0));
    let errors: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new(&format!("{name}_errors"), 0));
    let scheduler = JobScheduler::new(
        name,
        config,
        primary,
        errors,
        sink.map(|s| s as Arc<dyn BadJobSink>),
        counters.clone(),
    );
    (Arc::new(scheduler), counters)
}

/// Scheduler scalars scaled down for tests: quick polls, quick strobes.
#[allow(dead_code)]
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        thread_count: 4,
        strobe_interval: Duration::from_millis(20),
        error_limit: 10,
        flush_limit: 100,
        jitter_rate: 0.0,
        error_delay: Duration::from_millis(10),
        poll_interval: Duration::from_millis(5),
        strobe_while_paused: true,
    }
}

#[allow(dead_code)]
pub async fn assert_or_retry<F>(check: F)
where
    F: Fn() -> bool,
{
    assert_or_retry_for_duration(check, Duration::from_secs(5)).await
}

#[allow(dead_code)]
pub async fn assert_or_retry_for_duration<F>(check: F, timeout: Duration)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !check() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(check())
}
