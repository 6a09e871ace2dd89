use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::metrics_consts::STROBE_TRANSFERS;
use crate::queue::JobQueue;

pub(crate) struct StrobeContext {
    pub scheduler: String,
    pub errors: Arc<dyn JobQueue>,
    pub interval: Duration,
    pub jitter_rate: f64,
    pub flush_limit: usize,
    pub paused: Arc<AtomicBool>,
    pub strobe_while_paused: bool,
}

pub(crate) fn spawn_strobe(ctx: StrobeContext, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run_strobe(ctx, token))
}

/// Sleep-then-sweep loop. The sweep runs after the sleep completes, so a slow
/// sweep can never overlap the next one. Sweep errors are logged and
/// swallowed; the strobe keeps going.
async fn run_strobe(ctx: StrobeContext, token: CancellationToken) {
    loop {
        let sleep_for = jittered_interval(ctx.interval, ctx.jitter_rate);
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(sleep_for) => {}
        }

        if ctx.paused.load(Ordering::SeqCst) && !ctx.strobe_while_paused {
            continue;
        }

        match ctx.errors.check_expiration(ctx.flush_limit).await {
            Ok(0) => {}
            Ok(moved) => {
                metrics::counter!(STROBE_TRANSFERS, &[("queue", ctx.scheduler.clone())])
                    .increment(moved as u64);
                debug!(
                    scheduler = %ctx.scheduler,
                    moved,
                    "released expired error entries for retry"
                );
            }
            Err(sweep_error) => {
                error!(
                    scheduler = %ctx.scheduler,
                    error = %sweep_error,
                    "error queue expiration sweep failed"
                );
            }
        }
    }
}

fn jittered_interval(interval: Duration, jitter_rate: f64) -> Duration {
    if jitter_rate == 0.0 {
        return interval;
    }
    with_jitter(interval, jitter_rate, standard_normal())
}

/// `interval + round(interval_ms * rate * gauss)`, clamped at zero: the
/// Gaussian tail can push the jitter below the negated interval.
fn with_jitter(interval: Duration, jitter_rate: f64, gauss: f64) -> Duration {
    let interval_ms = interval.as_millis() as f64;
    let jitter_ms = (interval_ms * jitter_rate * gauss).round();
    Duration::from_millis((interval_ms + jitter_ms).max(0.0) as u64)
}

/// Standard-normal sample via the Box-Muller transform.
fn standard_normal() -> f64 {
    let mut rng = rand::thread_rng();
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
