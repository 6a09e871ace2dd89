use crate::error::QueueError;
use crate::types::{BoxedJob, Bytes, Job};

/// Opaque transform between jobs and queue payload bytes, used only by the
/// durable queue variant. The engine never inspects the bytes.
pub trait JobCodec: Send + Sync {
    fn encode(&self, job: &dyn Job) -> Result<Bytes, QueueError>;
    fn decode(&self, bytes: Bytes) -> Result<BoxedJob, QueueError>;
}
