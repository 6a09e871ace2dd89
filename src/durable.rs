use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::codec::JobCodec;
use crate::error::QueueError;
use crate::queue::{DrainTarget, JobQueue, PutError, QueueState, Receipt, Ticket};
use crate::types::{BoxedJob, Bytes};

/// The persistent FIFO a durable queue runs on: append-on-put with
/// reserve-then-ack visibility semantics. A reserved record is hidden from
/// other readers until it is acked (removed) or released (re-exposed);
/// records still reserved when the process dies are expected to become
/// visible again on restart.
#[async_trait]
pub trait SpoolBackend: Send + Sync {
    async fn append(&self, record: Bytes) -> Result<(), QueueError>;
    async fn reserve(&self) -> Result<Option<(u64, Bytes)>, QueueError>;
    async fn ack(&self, id: u64) -> Result<(), QueueError>;
    async fn release(&self, id: u64) -> Result<(), QueueError>;
    async fn len(&self) -> Result<usize, QueueError>;
    async fn shutdown(&self) -> Result<(), QueueError>;
}

/// Opens named spools rooted at a configured filesystem path.
pub trait SpoolOpener: Send + Sync {
    fn open(&self, name: &str) -> Result<Arc<dyn SpoolBackend>, QueueError>;
}

/// Envelope persisted around the codec payload so entry age survives
/// restarts.
#[derive(Serialize, Deserialize)]
struct SpoolRecord {
    enqueued_at: DateTime<Utc>,
    payload: Bytes,
}

impl SpoolRecord {
    fn age(&self) -> Duration {
        (Utc::now() - self.enqueued_at).to_std().unwrap_or_default()
    }
}

/// Durable queue variant over an external [`SpoolBackend`], never lossy.
/// Backend failures surface to the caller as queue-level failures.
pub struct DurableJobQueue {
    name: String,
    backend: Arc<dyn SpoolBackend>,
    codec: Arc<dyn JobCodec>,
    state: RwLock<QueueState>,
    drain: Mutex<Option<DrainTarget>>,
}

impl DurableJobQueue {
    pub fn new(name: &str, backend: Arc<dyn SpoolBackend>, codec: Arc<dyn JobCodec>) -> Self {
        Self {
            name: name.to_owned(),
            backend,
            codec,
            state: RwLock::new(QueueState::Fresh),
            drain: Mutex::new(None),
        }
    }

    fn state(&self) -> QueueState {
        *self.state.read().expect("poisoned queue state lock")
    }

    fn transition(&self, from: QueueState, to: QueueState) {
        let mut state = self.state.write().expect("poisoned queue state lock");
        if *state == from {
            *state = to;
        }
    }

    fn drain_target(&self) -> Option<(Arc<dyn JobQueue>, Duration)> {
        self.drain
            .lock()
            .expect("poisoned drain lock")
            .as_ref()
            .map(|d| (d.target.clone(), d.delay))
    }

    /// Decode a reserved record. An undecodable record is acked and dropped
    /// so a corrupt head cannot wedge the queue; `None` tells the caller to
    /// move on to the next record.
    async fn decode_record(&self, id: u64, raw: Bytes) -> Result<Option<SpoolRecord>, QueueError> {
        match serde_json::from_slice::<SpoolRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(parse_error) => {
                warn!(
                    queue = %self.name,
                    record = id,
                    error = %parse_error,
                    "dropping undecodable spool record"
                );
                self.backend.ack(id).await?;
                Ok(None)
            }
        }
    }

    async fn decode_job(&self, id: u64, payload: Bytes) -> Result<Option<BoxedJob>, QueueError> {
        match self.codec.decode(payload) {
            Ok(job) => Ok(Some(job)),
            Err(decode_error) => {
                warn!(
                    queue = %self.name,
                    record = id,
                    error = %decode_error,
                    "dropping job payload the codec cannot decode"
                );
                self.backend.ack(id).await?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl JobQueue for DurableJobQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, job: BoxedJob) -> Result<(), PutError> {
        if self.is_shutdown() {
            return Err(PutError::new(job, QueueError::Shutdown(self.name.clone())));
        }

        let payload = match self.codec.encode(job.as_ref()) {
            Ok(payload) => payload,
            Err(encode_error) => return Err(PutError::new(job, encode_error)),
        };
        let record = SpoolRecord {
            enqueued_at: Utc::now(),
            payload,
        };
        let raw = match serde_json::to_vec(&record) {
            Ok(raw) => raw,
            Err(serialize_error) => return Err(PutError::new(job, serialize_error.into())),
        };
        if let Err(append_error) = self.backend.append(raw).await {
            return Err(PutError::new(job, append_error));
        }
        Ok(())
    }

    async fn get(&self) -> Result<Option<Ticket>, QueueError> {
        if self.state() != QueueState::Running {
            return Ok(None);
        }

        loop {
            let Some((id, raw)) = self.backend.reserve().await? else {
                return Ok(None);
            };
            let Some(record) = self.decode_record(id, raw).await? else {
                continue;
            };
            let Some(job) = self.decode_job(id, record.payload).await? else {
                continue;
            };
            return Ok(Some(Ticket::new(job, id, &self.name)));
        }
    }

    async fn ack(&self, receipt: Receipt) -> Result<(), QueueError> {
        if receipt.queue != self.name {
            return Err(QueueError::ForeignTicket {
                expected: self.name.clone(),
                actual: receipt.queue,
            });
        }
        self.backend.ack(receipt.id).await
    }

    async fn size(&self) -> usize {
        match self.backend.len().await {
            Ok(len) => len,
            Err(backend_error) => {
                error!(queue = %self.name, error = %backend_error, "failed to read spool depth");
                0
            }
        }
    }

    async fn start(&self) {
        self.transition(QueueState::Fresh, QueueState::Running);
    }

    async fn pause(&self) {
        self.transition(QueueState::Running, QueueState::Paused);
    }

    async fn resume(&self) {
        self.transition(QueueState::Paused, QueueState::Running);
    }

    async fn shutdown(&self) {
        {
            let mut state = self.state.write().expect("poisoned queue state lock");
            *state = QueueState::Shutdown;
        }
        if let Err(backend_error) = self.backend.shutdown().await {
            error!(queue = %self.name, error = %backend_error, "spool backend shutdown failed");
        }
    }

    fn is_shutdown(&self) -> bool {
        self.state() == QueueState::Shutdown
    }

    fn drain_to(&self, target: Arc<dyn JobQueue>, delay: Duration) {
        *self.drain.lock().expect("poisoned drain lock") = Some(DrainTarget { target, delay });
    }

    async fn check_expiration(&self, flush_limit: usize) -> Result<usize, QueueError> {
        if self.is_shutdown() {
            return Ok(0);
        }
        let Some((target, delay)) = self.drain_target() else {
            return Ok(0);
        };

        let mut moved = 0;
        while moved < flush_limit {
            let Some((id, raw)) = self.backend.reserve().await? else {
                break;
            };
            let Some(record) = self.decode_record(id, raw).await? else {
                continue;
            };
            if record.age() < delay {
                self.backend.release(id).await?;
                break;
            }
            let Some(job) = self.decode_job(id, record.payload).await? else {
                continue;
            };
            if let Err(put_error) = target.put(job).await {
                // Re-expose the record so the transfer can be retried; the
                // decoded copy inside the error is redundant and dropped.
                let _ = self.backend.release(id).await;
                return Err(put_error.into());
            }
            self.backend.ack(id).await?;
            moved += 1;
        }
        Ok(moved)
    }
}
