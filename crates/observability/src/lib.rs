//! Process-wide tracing setup shared by binaries and test harnesses.

pub mod tracing;

pub use tracing::{LogFormat, init, init_with};
