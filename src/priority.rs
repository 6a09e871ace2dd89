use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::error;

use crate::config::Config;
use crate::error::QueueError;
use crate::scheduler::{EngineContext, JobScheduler};
use crate::types::BoxedJob;

/// Fan-out aggregator over a fixed mapping of priority class to scheduler.
///
/// Priority classes are fully independent: each member runs its own worker
/// pool and strobe, and no class preempts another. Lifecycle operations fan
/// out sequentially and best-effort: every member is invoked, and the first
/// error encountered (for the fallible operations) is returned afterwards.
pub struct PrioritizingJobScheduler {
    schedulers: RwLock<HashMap<i32, Arc<JobScheduler>>>,
}

impl PrioritizingJobScheduler {
    /// The mapping is fixed at construction; see [`Self::replace`] for the
    /// one sanctioned exception.
    pub fn new(schedulers: HashMap<i32, Arc<JobScheduler>>) -> Self {
        Self {
            schedulers: RwLock::new(schedulers),
        }
    }

    /// Materialize one scheduler per `(priority, queue-name prefix)` entry.
    pub fn from_config(
        config: &Config,
        priorities: &[(i32, &str)],
        ctx: &EngineContext,
    ) -> Result<Self, QueueError> {
        let mut schedulers = HashMap::with_capacity(priorities.len());
        for (priority, prefix) in priorities {
            schedulers.insert(
                *priority,
                Arc::new(JobScheduler::from_config(prefix, config, ctx)?),
            );
        }
        Ok(Self::new(schedulers))
    }

    /// Route a job to the scheduler registered at `priority`.
    pub async fn put(&self, priority: i32, job: BoxedJob) -> Result<(), QueueError> {
        let scheduler = self
            .scheduler(priority)
            .await
            .ok_or(QueueError::NoSuchPriority(priority))?;
        scheduler.put(job).await
    }

    /// The member scheduler at `priority`, exposed for inspection.
    pub async fn scheduler(&self, priority: i32) -> Option<Arc<JobScheduler>> {
        self.schedulers.read().await.get(&priority).cloned()
    }

    /// Swap the scheduler registered at `priority` in place. A testing hook:
    /// must not be called while any lifecycle transition is in progress.
    pub async fn replace(&self, priority: i32, scheduler: Arc<JobScheduler>) {
        self.schedulers.write().await.insert(priority, scheduler);
    }

    async fn members(&self) -> Vec<Arc<JobScheduler>> {
        self.schedulers.read().await.values().cloned().collect()
    }

    pub async fn start(&self) {
        for scheduler in self.members().await {
            scheduler.start().await;
        }
    }

    pub async fn pause(&self) {
        for scheduler in self.members().await {
            scheduler.pause().await;
        }
    }

    pub async fn resume(&self) {
        for scheduler in self.members().await {
            scheduler.resume().await;
        }
    }

    /// Returns after every member scheduler has fully shut down.
    pub async fn shutdown(&self) {
        for scheduler in self.members().await {
            scheduler.shutdown().await;
        }
    }

    /// Drain every member's error queue; the total transferred is returned
    /// unless some member failed, in which case the first error is raised
    /// after the remaining members have still been drained.
    pub async fn retry_errors(&self) -> Result<usize, QueueError> {
        let mut moved = 0;
        let mut first_error = None;
        for scheduler in self.members().await {
            match scheduler.retry_errors().await {
                Ok(count) => moved += count,
                Err(retry_error) => {
                    error!(
                        scheduler = %scheduler.name(),
                        error = %retry_error,
                        "failed to drain an error queue"
                    );
                    first_error.get_or_insert(retry_error);
                }
            }
        }
        match first_error {
            Some(retry_error) => Err(retry_error),
            None => Ok(moved),
        }
    }

    /// True when every member reports shutdown.
    pub async fn is_shutdown(&self) -> bool {
        self.members().await.iter().all(|s| s.is_shutdown())
    }

    pub async fn size(&self) -> usize {
        let mut total = 0;
        for scheduler in self.members().await {
            total += scheduler.size().await;
        }
        total
    }

    pub async fn error_size(&self) -> usize {
        let mut total = 0;
        for scheduler in self.members().await {
            total += scheduler.error_size().await;
        }
        total
    }

    pub async fn active_threads(&self) -> usize {
        self.members()
            .await
            .iter()
            .map(|s| s.active_threads())
            .sum()
    }
}
