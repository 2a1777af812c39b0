//! Frame extraction worker.
//!
//! This crate provides:
//! - Job executor consuming the job queue with bounded concurrency
//! - Per-job processing: frame sampling, archive packaging, ledger finalization
//! - Reclaim of messages abandoned by crashed workers
//! - Graceful shutdown with cancellation of running extractions

pub mod archive;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;

pub use archive::{build_archive, ArchiveError, ArchiveReport};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use processor::{JobOutcome, JobProcessor, JobStage, NO_FRAMES_DETAIL};
