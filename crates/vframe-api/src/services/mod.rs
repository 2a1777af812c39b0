//! Business services behind the HTTP handlers.

pub mod retrieval;
pub mod submission;

pub use retrieval::{ArchiveDownload, RetrievalError, RetrievalService};
pub use submission::{SubmissionError, SubmissionReceipt, SubmissionService};
