pub const JOBS_SUCCEEDED: &str = "jobspool_jobs_succeeded";
pub const JOBS_FAILED: &str = "jobspool_jobs_failed";
pub const JOBS_BLACKHOLED: &str = "jobspool_jobs_blackholed";
pub const JOBS_REJECTED: &str = "jobspool_jobs_rejected";
pub const JOBS_BAD_SINKED: &str = "jobspool_jobs_bad_sinked";
// Entries dropped by a bounded memory queue to make room at the tail.
pub const JOBS_EVICTED: &str = "jobspool_jobs_evicted";
// Error-queue entries released back into the primary queue by the strobe.
pub const STROBE_TRANSFERS: &str = "jobspool_strobe_transfers";
