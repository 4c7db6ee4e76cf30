//! Job coordination: deduplication, admission, retries, cancellation, and progress.

#[allow(clippy::module_inception)]
pub mod coordinator;
pub mod job;

pub use coordinator::{CoordinatorStats, JobCoordinator};
pub use job::{JobEvent, JobHandle, JobState, JobStatus};
