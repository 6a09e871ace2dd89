use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::error::QueueError;
use crate::scheduler::SchedulerConfig;

/// Which queue variant a scheduler runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueType {
    Durable,
    Memory,
}

/// Allow casting QueueType from strings. An unrecognized value is a fatal
/// configuration error.
impl FromStr for QueueType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "durable" => Ok(QueueType::Durable),
            "memory" => Ok(QueueType::Memory),
            invalid => Err(QueueError::Config(format!(
                "{invalid} is not a valid queue type"
            ))),
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct Config {
    /// Root filesystem directory handed to the spool opener.
    #[envconfig(from = "SPOOL_PATH", default = "/var/spool/kestrel")]
    pub path: String,

    #[envconfig(from = "QUEUE_TYPE", default = "durable")]
    pub queue_type: QueueType,

    /// Worker count per scheduler.
    #[envconfig(from = "WORKER_THREADS", default = "4")]
    pub threads: usize,

    /// Mean period of the retry strobe.
    #[envconfig(from = "STROBE_INTERVAL_MS", default = "1000")]
    pub strobe_interval: EnvMsDuration,

    /// Maximum error count before a job is handed to the bad job sink.
    #[envconfig(from = "ERROR_LIMIT", default = "10")]
    pub error_limit: u32,

    /// Maximum per-strobe transfer count from the error queue.
    #[envconfig(from = "FLUSH_LIMIT", default = "100")]
    pub flush_limit: usize,

    /// Minimum age before an error-queue entry is eligible for drain.
    #[envconfig(from = "ERROR_DELAY_SECS", default = "60")]
    pub error_delay: EnvSecsDuration,

    /// Memory-queue bound, 0 means unbounded.
    #[envconfig(from = "SIZE_LIMIT", default = "0")]
    pub size_limit: usize,

    /// Standard deviation multiplier for the Gaussian strobe jitter.
    #[envconfig(from = "JITTER_RATE", default = "0.0")]
    pub jitter_rate: f64,

    /// Name of the primary queue, suffixed onto each priority's prefix.
    #[envconfig(from = "JOB_QUEUE", default = "jobs")]
    pub job_queue: String,

    /// Name of the error queue, suffixed onto each priority's prefix.
    #[envconfig(from = "ERROR_QUEUE", default = "errors")]
    pub error_queue: String,

    /// The interval workers poll the primary queue at.
    #[envconfig(from = "POLL_INTERVAL_MS", default = "100")]
    pub poll_interval: EnvMsDuration,

    /// Keep the strobe sweeping while the scheduler is paused, so retries
    /// flow during operational quiet.
    #[envconfig(from = "STROBE_WHILE_PAUSED", default = "true")]
    pub strobe_while_paused: bool,
}

impl Config {
    /// The immutable per-scheduler scalars.
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            thread_count: self.threads,
            strobe_interval: self.strobe_interval.0,
            error_limit: self.error_limit,
            flush_limit: self.flush_limit,
            jitter_rate: self.jitter_rate,
            error_delay: self.error_delay.0,
            poll_interval: self.poll_interval.0,
            strobe_while_paused: self.strobe_while_paused,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvSecsDuration(pub time::Duration);

impl FromStr for EnvSecsDuration {
    type Err = ParseEnvDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs = s.parse::<u64>().map_err(|_| ParseEnvDurationError)?;

        Ok(EnvSecsDuration(time::Duration::from_secs(secs)))
    }
}
