//! Default tunables for the reconciliation driver.

/// Default reconciliation tick period.
pub(crate) const T_TICK_MS: u64 = 2_000;
/// Default bounded worker-pool size per connection.
pub(crate) const W: usize = 3;
/// Default consecutive-unclaimed-ticks budget before a record is dropped.
pub(crate) const K_UNCLAIMED: u32 = 10;
/// Default copy-job retry budget before a job is recorded as failed.
pub(crate) const K_COPY_RETRY: u32 = 3;
/// Default number of post-ingest ticks the driver waits before retiring the
/// home-side copy.
pub(crate) const K_POST_INGEST_TICKS: u32 = 2;
/// Default per-call timeout applied to endpoint, manager and transport calls.
pub(crate) const CALL_TIMEOUT_MS: u64 = 30_000;
/// Default minimum interval between progress-view writes.
pub(crate) const PROGRESS_THROTTLE_MS: u64 = 2_000;
