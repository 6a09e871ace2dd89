mod metrics_consts;
mod strobe;
mod worker;

// We do this pattern (privately use a module, then re-export parts of it) so
// we can refactor or rename the internals without breaking the public API.

// Jobs and their classified failures
mod types;
pub use types::BoxedJob;
pub use types::Bytes;
pub use types::Job;
pub use types::JobFailure;

// Errors
mod error;
pub use error::QueueError;

// Queues
mod queue;
pub use queue::JobQueue;
pub use queue::PutError;
pub use queue::QueueState;
pub use queue::Receipt;
pub use queue::Ticket;

mod memory;
pub use memory::MemoryJobQueue;

mod durable;
pub use durable::DurableJobQueue;
pub use durable::SpoolBackend;
pub use durable::SpoolOpener;

// The codec seam used by durable queues
mod codec;
pub use codec::JobCodec;

// The terminal consumer for permanently-failing jobs
mod sink;
pub use sink::BadJobSink;
pub use sink::LoggingBadJobSink;

// Injected observability counters
mod counters;
pub use counters::JobCounters;

// Schedulers
mod scheduler;
pub use scheduler::EngineContext;
pub use scheduler::JobScheduler;
pub use scheduler::RunState;
pub use scheduler::SchedulerConfig;

mod priority;
pub use priority::PrioritizingJobScheduler;

// Config
mod config;
pub use config::Config;
pub use config::EnvMsDuration;
pub use config::EnvSecsDuration;
pub use config::QueueType;
