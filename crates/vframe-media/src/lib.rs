//! FFmpeg CLI wrapper for frame extraction.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A runner with timeout, cancellation and stderr capture
//! - The [`FrameExtractor`] seam used by the worker

pub mod command;
pub mod error;
pub mod frames;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{ExtractRequest, FfmpegFrameExtractor, FrameExtractor, SamplingPolicy};
