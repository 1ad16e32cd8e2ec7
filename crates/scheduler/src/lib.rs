//! `corebank-scheduler`: background sweeps on independent timers.
//!
//! Each registered sweep runs in its own thread on its own cadence.
//! Sweeps must be idempotent: overlapping or repeated runs select work
//! by current state (still ACTIVE, still past expiry) rather than by a
//! one-shot marker, so a rerun finds nothing left to do.

pub mod sweep;

pub use sweep::{SchedulerHandle, Sweep, SweepHandle, SweepScheduler, SweepStats};
