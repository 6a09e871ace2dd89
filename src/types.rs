use async_trait::async_trait;
use thiserror::Error;

pub type Bytes = Vec<u8>;

/// Classified failure raised by job execution. The classification decides
/// routing: blackholed jobs are dropped, rejected jobs are retried without
/// touching their error metadata, anything else counts against the job's
/// error limit.
#[derive(Error, Debug)]
pub enum JobFailure {
    /// The job's target has been declared unreachable and further retries
    /// are futile.
    #[error("target is unreachable and retries are futile: {0}")]
    Blackholed(String),
    /// The target is present but currently refusing work.
    #[error("target is refusing work: {0}")]
    Rejected(String),
    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

/// An opaque unit of work plus its mutable error metadata.
///
/// Execution is parameterless and effectful; whoever holds the `Box` owns the
/// job. A queue owns the jobs it stores, and a worker owns a job from the
/// moment it dequeues a ticket until it acks or re-enqueues.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self) -> Result<(), JobFailure>;

    /// A human description of the job, used in log lines and the bad-job
    /// sink. Not required to be unique.
    fn describe(&self) -> String;

    fn error_count(&self) -> u32;
    fn set_error_count(&mut self, count: u32);
    fn error_message(&self) -> Option<&str>;
    fn set_error_message(&mut self, message: String);
}

pub type BoxedJob = Box<dyn Job>;
