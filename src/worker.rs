use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::counters::JobCounters;
use crate::error::QueueError;
use crate::queue::{JobQueue, Ticket};
use crate::sink::BadJobSink;
use crate::types::JobFailure;

/// Everything a worker task needs, shared across the pool.
pub(crate) struct WorkerContext {
    pub scheduler: String,
    pub primary: Arc<dyn JobQueue>,
    pub errors: Arc<dyn JobQueue>,
    pub bad_jobs: Option<Arc<dyn BadJobSink>>,
    pub counters: Arc<JobCounters>,
    pub active_threads: Arc<AtomicUsize>,
    pub error_limit: u32,
    pub poll_interval: Duration,
}

pub(crate) fn spawn_workers(
    ctx: &Arc<WorkerContext>,
    count: usize,
    token: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| tokio::spawn(run_worker(ctx.clone(), token.clone())))
        .collect()
}

/// Poll the primary queue, draining it in bursts. The cancellation token is
/// observed before every `get`; the job in flight always runs to completion.
async fn run_worker(ctx: Arc<WorkerContext>, token: CancellationToken) {
    let mut interval = tokio::time::interval(ctx.poll_interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = interval.tick() => {}
        }

        while !token.is_cancelled() {
            match ctx.primary.get().await {
                Ok(Some(ticket)) => {
                    if let Err(frame_error) = process_ticket(&ctx, ticket).await {
                        // A failing error queue or sink must not drain the
                        // pool; log and keep polling.
                        error!(
                            scheduler = %ctx.scheduler,
                            error = %frame_error,
                            "failed to settle a job frame"
                        );
                    }
                }
                Ok(None) => break,
                Err(get_error) => {
                    error!(
                        scheduler = %ctx.scheduler,
                        error = %get_error,
                        "failed to poll the primary queue"
                    );
                    break;
                }
            }
        }
    }
}

/// Decrements `active_threads` on every exit path of the job frame.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One job frame: execute, classify, route, then ack the primary entry.
///
/// The ack comes after the classification branch so any error-queue
/// re-enqueue is durable before the primary entry is released.
async fn process_ticket(ctx: &WorkerContext, ticket: Ticket) -> Result<(), QueueError> {
    let _active = ActiveGuard::enter(&ctx.active_threads);
    let (mut job, receipt) = ticket.into_parts();

    match job.execute().await {
        Ok(()) => {
            ctx.counters.record_success(&ctx.scheduler);
        }
        Err(JobFailure::Blackholed(reason)) => {
            ctx.counters.record_blackhole(&ctx.scheduler);
            debug!(
                scheduler = %ctx.scheduler,
                job = %job.describe(),
                %reason,
                "dropping job for a blackholed target"
            );
        }
        Err(JobFailure::Rejected(reason)) => {
            ctx.counters.record_rejection(&ctx.scheduler);
            debug!(
                scheduler = %ctx.scheduler,
                job = %job.describe(),
                %reason,
                "target rejected the job, scheduling a retry"
            );
            ctx.errors.put(job).await?;
        }
        Err(JobFailure::Failed(message)) => {
            ctx.counters.record_failure(&ctx.scheduler);
            let error_count = job.error_count() + 1;
            job.set_error_count(error_count);
            job.set_error_message(message.clone());
            warn!(
                scheduler = %ctx.scheduler,
                job = %job.describe(),
                error = %message,
                error_count,
                "job failed"
            );
            if error_count > ctx.error_limit {
                ctx.counters.record_bad_sink(&ctx.scheduler);
                if let Some(sink) = &ctx.bad_jobs {
                    if let Err(sink_error) = sink.put(job).await {
                        error!(
                            scheduler = %ctx.scheduler,
                            error = %sink_error,
                            "failed to hand a job to the bad job sink"
                        );
                    }
                }
            } else {
                ctx.errors.put(job).await?;
            }
        }
    }

    ctx.primary.ack(receipt).await
}
