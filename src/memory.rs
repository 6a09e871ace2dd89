use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::error::QueueError;
use crate::metrics_consts::JOBS_EVICTED;
use crate::queue::{DrainTarget, JobQueue, PutError, QueueState, Receipt, Ticket};
use crate::types::BoxedJob;

struct Entry {
    id: u64,
    enqueued_at: Instant,
    job: BoxedJob,
}

struct Inner {
    pending: VecDeque<Entry>,
    /// Entry ids handed out as tickets and not yet acked.
    open: HashSet<u64>,
    next_id: u64,
}

/// In-memory queue variant. Bounded queues are lossy under pressure: `put`
/// on a full queue evicts the eldest entry to make room at the tail.
pub struct MemoryJobQueue {
    name: String,
    size_limit: usize,
    state: RwLock<QueueState>,
    inner: AsyncMutex<Inner>,
    drain: Mutex<Option<DrainTarget>>,
}

impl MemoryJobQueue {
    /// `size_limit` of 0 means unbounded.
    pub fn new(name: &str, size_limit: usize) -> Self {
        Self {
            name: name.to_owned(),
            size_limit,
            state: RwLock::new(QueueState::Fresh),
            inner: AsyncMutex::new(Inner {
                pending: VecDeque::new(),
                open: HashSet::new(),
                next_id: 0,
            }),
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
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, job: BoxedJob) -> Result<(), PutError> {
        if self.is_shutdown() {
            return Err(PutError::new(job, QueueError::Shutdown(self.name.clone())));
        }

        let mut inner = self.inner.lock().await;
        if self.size_limit > 0 && inner.pending.len() >= self.size_limit {
            if let Some(evicted) = inner.pending.pop_front() {
                warn!(
                    queue = %self.name,
                    job = %evicted.job.describe(),
                    "queue is full, evicting the eldest entry"
                );
                metrics::counter!(JOBS_EVICTED, &[("queue", self.name.clone())]).increment(1);
            }
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.pending.push_back(Entry {
            id,
            enqueued_at: Instant::now(),
            job,
        });
        Ok(())
    }

    async fn get(&self) -> Result<Option<Ticket>, QueueError> {
        if self.state() != QueueState::Running {
            return Ok(None);
        }

        let mut inner = self.inner.lock().await;
        match inner.pending.pop_front() {
            Some(entry) => {
                inner.open.insert(entry.id);
                Ok(Some(Ticket::new(entry.job, entry.id, &self.name)))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, receipt: Receipt) -> Result<(), QueueError> {
        if receipt.queue != self.name {
            return Err(QueueError::ForeignTicket {
                expected: self.name.clone(),
                actual: receipt.queue,
            });
        }

        let mut inner = self.inner.lock().await;
        if inner.open.remove(&receipt.id) {
            Ok(())
        } else {
            Err(QueueError::UnknownTicket(receipt.id))
        }
    }

    async fn size(&self) -> usize {
        self.inner.lock().await.pending.len()
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
        let mut state = self.state.write().expect("poisoned queue state lock");
        *state = QueueState::Shutdown;
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
            // Pop only once the head is known to have matured, then enqueue
            // outside the lock so the target's own lock is never nested.
            let entry = {
                let mut inner = self.inner.lock().await;
                let matured = inner
                    .pending
                    .front()
                    .is_some_and(|entry| entry.enqueued_at.elapsed() >= delay);
                if matured {
                    inner.pending.pop_front()
                } else {
                    None
                }
            };
            let Some(entry) = entry else { break };
            if let Err(put_error) = target.put(entry.job).await {
                // Restore the entry at the head; overflow eviction is the
                // only path allowed to drop jobs.
                let PutError { job, error } = put_error;
                let mut inner = self.inner.lock().await;
                inner.pending.push_front(Entry {
                    id: entry.id,
                    enqueued_at: entry.enqueued_at,
                    job,
                });
                return Err(error);
            }
            moved += 1;
        }
        Ok(moved)
    }
}
