use async_trait::async_trait;
use tracing::error;

use crate::error::QueueError;
use crate::types::BoxedJob;

/// Terminal consumer for jobs whose error count exceeded the limit. Sink
/// failures are logged and swallowed by the worker, so a broken sink cannot
/// take the pool down with it.
#[async_trait]
pub trait BadJobSink: Send + Sync {
    async fn put(&self, job: BoxedJob) -> Result<(), QueueError>;
}

/// The default sink: one error-level log line per permanently-failed job.
pub struct LoggingBadJobSink;

#[async_trait]
impl BadJobSink for LoggingBadJobSink {
    async fn put(&self, job: BoxedJob) -> Result<(), QueueError> {
        error!(
            job = %job.describe(),
            error_count = job.error_count(),
            error = job.error_message().unwrap_or("unknown"),
            "job exceeded its error limit and was dropped"
        );
        Ok(())
    }
}
