//! Shared data models for the vframe pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their owners
//! - The job status state machine
//! - Startup connection retry policy

pub mod job;
pub mod job_status;
pub mod retry;

// Re-export common types
pub use job::{Job, JobId, OwnerId};
pub use job_status::{InvalidTransition, JobStatus, ParseJobStatusError};
pub use retry::{retry_connect, ConnectRetry};
