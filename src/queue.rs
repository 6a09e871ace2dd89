use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::types::{BoxedJob, Job};

/// Lifecycle state shared by every queue variant. `Shutdown` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    Fresh,
    Running,
    Paused,
    Shutdown,
}

/// A one-shot acknowledgement handle for a dequeued entry.
///
/// Receipts are bound to the queue that emitted them; acking a receipt
/// against any other queue is a programming error. Consuming the receipt via
/// [`JobQueue::ack`] finalizes removal of the entry. A leaked receipt leaves
/// the entry invisible but undrained.
#[derive(Debug)]
pub struct Receipt {
    pub(crate) id: u64,
    pub(crate) queue: String,
}

impl Receipt {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the queue this receipt was emitted by.
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// A dequeued job bound to its pending acknowledgement.
pub struct Ticket {
    pub(crate) job: BoxedJob,
    pub(crate) receipt: Receipt,
}

impl Ticket {
    pub(crate) fn new(job: BoxedJob, id: u64, queue: &str) -> Self {
        Self {
            job,
            receipt: Receipt {
                id,
                queue: queue.to_owned(),
            },
        }
    }

    pub fn job(&self) -> &dyn Job {
        self.job.as_ref()
    }

    /// Split into the owned job and the ack handle. The worker frame takes
    /// ownership of the job here and settles the receipt once the
    /// classification branch has run.
    pub fn into_parts(self) -> (BoxedJob, Receipt) {
        (self.job, self.receipt)
    }
}

/// Error returned by [`JobQueue::put`]. The refused job rides back to the
/// caller, channel-send style, so a failed enqueue is never silently lossy:
/// the caller decides whether to restore, reroute or drop it.
pub struct PutError {
    pub job: BoxedJob,
    pub error: QueueError,
}

impl PutError {
    pub fn new(job: BoxedJob, error: QueueError) -> Self {
        Self { job, error }
    }

    pub fn into_job(self) -> BoxedJob {
        self.job
    }
}

impl fmt::Debug for PutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutError")
            .field("job", &self.job.describe())
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for PutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for PutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Callers that have no use for the returned job drop it by converting.
impl From<PutError> for QueueError {
    fn from(put_error: PutError) -> Self {
        put_error.error
    }
}

/// Registered drain relation: entries at least `delay` old become eligible to
/// be transferred into `target` by `check_expiration`.
pub(crate) struct DrainTarget {
    pub target: Arc<dyn JobQueue>,
    pub delay: Duration,
}

/// A named FIFO holding jobs, with acknowledgement tickets, lifecycle, and an
/// optional one-way drain relation into another queue.
///
/// `get` is non-blocking: `None` means "nothing right now, retry soon" and is
/// also returned while the queue is fresh, paused or shut down. Callers poll.
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Enqueue at the tail. Accepted in every state except `Shutdown`. A
    /// refused put hands the job back inside the error.
    async fn put(&self, job: BoxedJob) -> Result<(), PutError>;

    /// Dequeue the head job as a ticket, or `None`.
    async fn get(&self) -> Result<Option<Ticket>, QueueError>;

    /// Finalize removal of a previously dequeued entry. Double-ack is a
    /// programming error and fails with `UnknownTicket`.
    async fn ack(&self, receipt: Receipt) -> Result<(), QueueError>;

    /// Current pending count. Approximate for the durable variant under
    /// concurrent mutation.
    async fn size(&self) -> usize;

    async fn start(&self);
    async fn pause(&self);
    async fn resume(&self);
    async fn shutdown(&self);
    fn is_shutdown(&self) -> bool;

    /// Register the drain relation. Entries younger than `delay` are
    /// invisible to `check_expiration`.
    fn drain_to(&self, target: Arc<dyn JobQueue>, delay: Duration);

    /// Transfer up to `flush_limit` expired entries into the drain target in
    /// FIFO order, stopping early at the first entry that has not yet
    /// matured. Returns the number of entries transferred.
    async fn check_expiration(&self, flush_limit: usize) -> Result<usize, QueueError>;
}
