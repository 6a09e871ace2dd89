use thiserror::Error;

/// Enumeration of errors for operations on job queues and schedulers.
/// Routing and acknowledgement misuse are programming errors and are raised
/// to the caller rather than recovered.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue {0} is shut down")]
    Shutdown(String),
    #[error("unknown ticket {0}, the entry may already have been acked")]
    UnknownTicket(u64),
    #[error("ticket from queue {actual} cannot be acked against queue {expected}")]
    ForeignTicket { expected: String, actual: String },
    #[error("no scheduler registered for priority {0}")]
    NoSuchPriority(i32),
    #[error("failed to encode or decode a job payload: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("spool backend failure: {0}")]
    Backend(String),
    #[error("configuration error: {0}")]
    Config(String),
}
