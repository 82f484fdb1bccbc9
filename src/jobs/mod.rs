//! Background import jobs
//!
//! Submission registers a `Queued` status and publishes the job; the worker
//! dequeues in order and processes each job in its own supervised task.
//! Status lives for the rest of the process and is read by pollers.

pub mod models;
pub mod processor;
pub mod queue;
pub mod worker;

pub use models::{Job, JobState, JobStatus, JobType};
pub use queue::{InMemoryJobQueue, JobQueue};
pub use worker::ImportWorker;
