//! Frame extraction job processing.
//!
//! One call to [`JobProcessor::process`] drives a job through
//! `Received -> Extracting -> Packaging -> Finalized`. Every run starts from
//! Extracting with an emptied output directory, so a redelivered message
//! simply redoes the work. Terminal ledger writes come before cleanup and
//! notification; the caller acknowledges the message only after `Ok`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, Instrument};

use vframe_ledger::{JobLedger, LedgerError, LedgerResult};
use vframe_media::{ExtractRequest, FrameExtractor, MediaError};
use vframe_models::JobStatus;
use vframe_queue::{JobMessage, JobNotification, NotificationSink};
use vframe_storage::{frame_base, ArtifactStore};

use crate::archive::build_archive;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::{JobLogger, FRAME_EXTRACTION};
use crate::metrics;

/// Detail recorded when extraction produced nothing.
pub const NO_FRAMES_DETAIL: &str = "no frames extracted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Received,
    Extracting,
    Packaging,
    Finalized,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Received => "received",
            JobStage::Extracting => "extracting",
            JobStage::Packaging => "packaging",
            JobStage::Finalized => "finalized",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TerminalWrite<'a> {
    Completed(&'a str),
    Failed(&'a str),
}

/// How a message was settled. Every variant means the message may be acked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { archive: PathBuf, frames: usize },
    Failed { detail: String },
    /// The ledger already held a final status; only cleanup was re-run.
    AlreadyTerminal(JobStatus),
    /// No usable ledger row for the message.
    Discarded,
}

impl JobOutcome {
    /// Final ledger status, when the outcome has one.
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            JobOutcome::Completed { .. } => Some(JobStatus::Completed),
            JobOutcome::Failed { .. } => Some(JobStatus::Failed),
            JobOutcome::AlreadyTerminal(status) => Some(*status),
            JobOutcome::Discarded => None,
        }
    }
}

/// Processes frame extraction jobs against injected collaborators.
#[derive(Clone)]
pub struct JobProcessor {
    ledger: Arc<dyn JobLedger>,
    store: ArtifactStore,
    extractor: Arc<dyn FrameExtractor>,
    notifier: Arc<dyn NotificationSink>,
}

impl JobProcessor {
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        store: ArtifactStore,
        extractor: Arc<dyn FrameExtractor>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            ledger,
            store,
            extractor,
            notifier,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run one job to a terminal ledger state.
    ///
    /// `Err` means the message must stay unacknowledged: either the worker
    /// was cancelled mid-job or the ledger could not be read or written.
    pub async fn process(&self, message: &JobMessage) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(message.job_id, message.owner_id, FRAME_EXTRACTION);
        let span = logger.create_span();
        self.run(message, &logger).instrument(span).await
    }

    async fn run(&self, message: &JobMessage, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        logger.log_start(&format!(
            "{} ({})",
            message.original_filename,
            message.source_path.display()
        ));

        let job = match self.ledger.find(message.job_id).await? {
            Some(job) => job,
            None => {
                logger.log_warning("no ledger row for job, discarding message");
                self.remove_source(message, logger).await;
                return Ok(JobOutcome::Discarded);
            }
        };

        if !job.is_owned_by(message.owner_id) {
            logger.log_error(&format!(
                "message owner does not match ledger owner {}, discarding message",
                job.owner_id
            ));
            return Ok(JobOutcome::Discarded);
        }

        if job.is_terminal() {
            return Ok(self.settle_terminal(message, job.status, logger).await);
        }

        match self.ledger.mark_processing(message.job_id).await {
            Ok(_) => {}
            Err(LedgerError::InvalidTransition(rejected)) if rejected.from.is_terminal() => {
                return Ok(self.settle_terminal(message, rejected.from, logger).await);
            }
            Err(e @ LedgerError::InvalidTransition(_)) => return Err(e.into()),
            // The final write re-marks the row if this one was lost.
            Err(e) => logger.log_warning(&format!("failed to mark job processing: {e}")),
        }
        metrics::record_job_started();
        self.notifier
            .notify(JobNotification::processing_started(
                message.job_id,
                message.owner_id,
                &message.original_filename,
            ))
            .await;

        let output_dir = self.store.job_output_dir(message.owner_id, message.job_id);
        let base = frame_base(&message.original_filename);

        if let Err(e) = self.store.reset_dir(&output_dir).await {
            return self
                .fail(
                    message,
                    JobStage::Received,
                    format!("failed to prepare output directory: {e}"),
                    logger,
                )
                .await;
        }

        // Extracting
        let started = Instant::now();
        let request = ExtractRequest {
            source: message.source_path.clone(),
            output_pattern: self.store.frame_pattern(&output_dir, &base),
        };
        match self.extractor.extract(&request).await {
            Ok(()) => {}
            Err(MediaError::Cancelled) => {
                logger.log_warning("extraction cancelled, leaving message for redelivery");
                return Err(WorkerError::Cancelled);
            }
            Err(e) => {
                return self
                    .fail(
                        message,
                        JobStage::Extracting,
                        format!("frame extraction failed: {}", e.detail()),
                        logger,
                    )
                    .await;
            }
        }
        metrics::record_stage_duration(JobStage::Extracting.as_str(), started.elapsed().as_secs_f64());

        // Packaging
        let started = Instant::now();
        let frames = match self.store.list_frames(&output_dir, &base).await {
            Ok(frames) => frames,
            Err(e) => {
                return self
                    .fail(message, JobStage::Packaging, format!("failed to list frames: {e}"), logger)
                    .await;
            }
        };
        if frames.is_empty() {
            return self
                .fail(message, JobStage::Packaging, NO_FRAMES_DETAIL.to_string(), logger)
                .await;
        }
        logger.log_progress(&format!("packaging {} frames", frames.len()));

        let archive_path = self.store.archive_path(&output_dir, message.owner_id, &base);
        let report = match build_archive(archive_path.clone(), frames).await {
            Ok(report) => report,
            Err(e) => {
                if let Err(rm) = self.store.remove_file(&archive_path).await {
                    logger.log_warning(&format!("failed to remove partial archive: {rm}"));
                }
                return self
                    .fail(message, JobStage::Packaging, format!("archive build failed: {e}"), logger)
                    .await;
            }
        };
        for skipped in &report.skipped {
            logger.log_warning(&format!(
                "frame {} left out of archive: {}",
                skipped.path.display(),
                skipped.reason
            ));
        }
        metrics::record_stage_duration(JobStage::Packaging.as_str(), started.elapsed().as_secs_f64());

        // Finalized
        let started = Instant::now();
        let result_path = archive_path.display().to_string();
        if let Some(settled) = self
            .write_terminal(message, TerminalWrite::Completed(&result_path), logger)
            .await?
        {
            return Ok(settled);
        }

        self.cleanup(message, JobStatus::Completed, logger).await;
        self.notifier
            .notify(JobNotification::completed(
                message.job_id,
                message.owner_id,
                &message.original_filename,
                result_path.as_str(),
            ))
            .await;
        metrics::record_stage_duration(JobStage::Finalized.as_str(), started.elapsed().as_secs_f64());
        metrics::record_job_completed(report.entries.len());
        logger.log_completion(&format!("{} frames archived to {}", report.entries.len(), result_path));

        Ok(JobOutcome::Completed {
            archive: archive_path,
            frames: report.entries.len(),
        })
    }

    /// Terminal failure: ledger first, then cleanup and notification.
    async fn fail(
        &self,
        message: &JobMessage,
        stage: JobStage,
        detail: String,
        logger: &JobLogger,
    ) -> WorkerResult<JobOutcome> {
        logger.log_error(&format!("{} stage failed: {}", stage.as_str(), detail));

        if let Some(settled) = self
            .write_terminal(message, TerminalWrite::Failed(&detail), logger)
            .await?
        {
            return Ok(settled);
        }

        self.cleanup(message, JobStatus::Failed, logger).await;
        self.notifier
            .notify(JobNotification::failed(
                message.job_id,
                message.owner_id,
                &message.original_filename,
                &detail,
            ))
            .await;
        metrics::record_job_failed(stage.as_str());

        Ok(JobOutcome::Failed { detail })
    }

    /// Record the final status. `Some` when another delivery already
    /// finished the job and this one only settled it.
    ///
    /// A row still Pending (its Processing mark was lost) is re-marked and
    /// the write retried once; anything else non-terminal is an error so
    /// the message stays pending.
    async fn write_terminal(
        &self,
        message: &JobMessage,
        write: TerminalWrite<'_>,
        logger: &JobLogger,
    ) -> WorkerResult<Option<JobOutcome>> {
        let rejected = match self.apply(message, write).await {
            Ok(()) => return Ok(None),
            Err(LedgerError::InvalidTransition(rejected)) => rejected,
            Err(e) => return Err(e.into()),
        };
        if rejected.from.is_terminal() {
            return Ok(Some(self.settle_terminal(message, rejected.from, logger).await));
        }

        logger.log_warning(&format!(
            "job still {} at final write, marking processing again",
            rejected.from
        ));
        self.ledger.mark_processing(message.job_id).await?;
        match self.apply(message, write).await {
            Ok(()) => Ok(None),
            Err(LedgerError::InvalidTransition(rejected)) if rejected.from.is_terminal() => {
                Ok(Some(self.settle_terminal(message, rejected.from, logger).await))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn apply(&self, message: &JobMessage, write: TerminalWrite<'_>) -> LedgerResult<()> {
        match write {
            TerminalWrite::Completed(result_path) => {
                self.ledger.mark_completed(message.job_id, result_path).await?;
            }
            TerminalWrite::Failed(detail) => {
                self.ledger.mark_failed(message.job_id, detail).await?;
            }
        }
        Ok(())
    }

    /// Redelivered message for a job that already finished.
    async fn settle_terminal(&self, message: &JobMessage, status: JobStatus, logger: &JobLogger) -> JobOutcome {
        logger.log_progress(&format!("job already {}, re-running cleanup", status));
        self.cleanup(message, status, logger).await;
        metrics::record_job_redelivered();
        JobOutcome::AlreadyTerminal(status)
    }

    /// Remove the source and intermediates. Completed jobs keep their archive;
    /// failed jobs lose the whole output directory.
    async fn cleanup(&self, message: &JobMessage, status: JobStatus, logger: &JobLogger) {
        self.remove_source(message, logger).await;

        let output_dir = self.store.job_output_dir(message.owner_id, message.job_id);
        match status {
            JobStatus::Completed => {
                self.remove_frames(&output_dir, &frame_base(&message.original_filename), logger)
                    .await
            }
            JobStatus::Failed => {
                if let Err(e) = self.store.remove_dir(&output_dir).await {
                    logger.log_warning(&format!("failed to remove {}: {}", output_dir.display(), e));
                }
            }
            JobStatus::Pending | JobStatus::Processing => {}
        }
    }

    async fn remove_frames(&self, output_dir: &Path, base: &str, logger: &JobLogger) {
        match self.store.list_frames(output_dir, base).await {
            Ok(frames) => {
                let removed = self.store.remove_files(&frames).await;
                debug!("Removed {} frame files from {}", removed, output_dir.display());
            }
            Err(e) => logger.log_warning(&format!("failed to list frames for cleanup: {e}")),
        }
    }

    async fn remove_source(&self, message: &JobMessage, logger: &JobLogger) {
        if !self.store.owns_upload(&message.source_path) {
            logger.log_warning(&format!(
                "source {} is outside the uploads area, leaving it in place",
                message.source_path.display()
            ));
            return;
        }
        if let Err(e) = self.store.remove_file(&message.source_path).await {
            logger.log_warning(&format!("failed to remove source: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_status() {
        assert_eq!(
            JobOutcome::Failed { detail: NO_FRAMES_DETAIL.into() }.status(),
            Some(JobStatus::Failed)
        );
        assert_eq!(
            JobOutcome::AlreadyTerminal(JobStatus::Completed).status(),
            Some(JobStatus::Completed)
        );
        assert_eq!(JobOutcome::Discarded.status(), None);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(JobStage::Extracting.as_str(), "extracting");
        assert_eq!(JobStage::Packaging.as_str(), "packaging");
        assert_eq!(JobStage::Finalized.as_str(), "finalized");
    }
}
