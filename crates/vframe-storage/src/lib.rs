//! Local filesystem artifact store.
//!
//! This crate provides:
//! - Streaming upload persistence under globally unique names
//! - Per-job output directories for frames and archives
//! - Frame enumeration and cleanup helpers

pub mod error;
pub mod naming;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use naming::{archive_file_name, frame_base, frame_pattern, unique_upload_name};
pub use store::{ArtifactStore, StorageConfig, StoredUpload};
