//! Frame sampling.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// How frames are sampled from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingPolicy {
    FramesPerSecond(u32),
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        SamplingPolicy::FramesPerSecond(1)
    }
}

impl SamplingPolicy {
    /// FFmpeg video filter expression.
    pub fn filter(&self) -> String {
        match self {
            SamplingPolicy::FramesPerSecond(n) => format!("fps={}", (*n).max(1)),
        }
    }
}

/// One extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub source: PathBuf,
    /// Numbered output pattern, e.g. `<dir>/<base>_%04d.png`
    pub output_pattern: PathBuf,
}

#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Sample `source` into numbered images.
    ///
    /// Success does not guarantee any frames were written.
    async fn extract(&self, request: &ExtractRequest) -> MediaResult<()>;
}

/// Extractor backed by the ffmpeg CLI.
#[derive(Clone)]
pub struct FfmpegFrameExtractor {
    policy: SamplingPolicy,
    timeout: Duration,
    program: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FfmpegFrameExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            policy: SamplingPolicy::default(),
            timeout,
            program: PathBuf::from("ffmpeg"),
            cancel_rx: None,
        }
    }

    pub fn with_policy(mut self, policy: SamplingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Kill running extractions when the flag flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn command(&self, request: &ExtractRequest) -> FfmpegCommand {
        FfmpegCommand::new(&request.source, &request.output_pattern).video_filter(self.policy.filter())
    }

    fn runner(&self) -> FfmpegRunner {
        let runner = FfmpegRunner::new()
            .with_program(&self.program)
            .with_timeout(self.timeout);
        match &self.cancel_rx {
            Some(rx) => runner.with_cancel(rx.clone()),
            None => runner,
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(&self, request: &ExtractRequest) -> MediaResult<()> {
        if !tokio::fs::try_exists(&request.source).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(request.source.clone()));
        }

        info!(
            "Extracting frames from {} ({})",
            request.source.display(),
            self.policy.filter()
        );
        self.runner().run(&self.command(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_one_per_second() {
        assert_eq!(SamplingPolicy::default().filter(), "fps=1");
        assert_eq!(SamplingPolicy::FramesPerSecond(0).filter(), "fps=1");
    }

    #[test]
    fn test_command_shape() {
        let extractor = FfmpegFrameExtractor::new(Duration::from_secs(60));
        let request = ExtractRequest {
            source: PathBuf::from("/uploads/7_1.mp4"),
            output_pattern: PathBuf::from("/out/7/1/clip_%04d.png"),
        };
        assert_eq!(
            extractor.command(&request).build_args(),
            vec!["-y", "-v", "error", "-i", "/uploads/7_1.mp4", "-vf", "fps=1", "/out/7/1/clip_%04d.png"]
        );
    }

    #[test]
    fn test_custom_policy() {
        let extractor = FfmpegFrameExtractor::new(Duration::from_secs(60))
            .with_policy(SamplingPolicy::FramesPerSecond(5));
        let request = ExtractRequest {
            source: PathBuf::from("in.mp4"),
            output_pattern: PathBuf::from("out_%04d.png"),
        };
        assert!(extractor.command(&request).build_args().contains(&"fps=5".to_string()));
    }

    #[tokio::test]
    async fn test_missing_source() {
        let extractor = FfmpegFrameExtractor::new(Duration::from_secs(1));
        let request = ExtractRequest {
            source: PathBuf::from("/nonexistent/video.mp4"),
            output_pattern: PathBuf::from("/tmp/x_%04d.png"),
        };
        let err = extractor.extract(&request).await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
