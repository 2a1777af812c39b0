//! Video API handlers.

use std::sync::atomic::{AtomicU16, Ordering};

use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde::Serialize;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{info, warn};

use vframe_models::{Job, JobId, JobStatus};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the video.
pub const VIDEO_FIELD: &str = "video";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub id: JobId,
    pub original_filename: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            original_filename: job.original_filename,
            status: job.status,
            result_path: job.result_path,
            error_detail: job.error_detail,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("upload exceeds the maximum allowed size".to_string())
    } else {
        ApiError::bad_request(e.body_text())
    }
}

/// Accept a multipart video upload and queue it for frame extraction.
pub async fn upload_video(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                metrics::record_submission_failed("invalid_input");
                ApiError::bad_request("video file must have a filename")
            })?;

        // Status of a body error raised while the stream is being copied
        let body_status = AtomicU16::new(0);
        let stream = field.map_err(|e| {
            body_status.store(e.status().as_u16(), Ordering::Relaxed);
            std::io::Error::other(e)
        });
        let reader = StreamReader::new(stream);
        tokio::pin!(reader);

        let receipt = match state.submissions.submit(user.owner_id, &filename, &mut reader).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if body_status.load(Ordering::Relaxed) == StatusCode::PAYLOAD_TOO_LARGE.as_u16() {
                    metrics::record_submission_failed("too_large");
                    return Err(ApiError::PayloadTooLarge(
                        "upload exceeds the maximum allowed size".to_string(),
                    ));
                }
                warn!(owner_id = %user.owner_id, "Submission of {} failed: {}", filename, e);
                metrics::record_submission_failed("error");
                return Err(e.into());
            }
        };

        metrics::record_job_submitted(receipt.bytes);
        info!(
            owner_id = %user.owner_id,
            job_id = %receipt.job_id,
            "Accepted upload {} ({} bytes)",
            receipt.original_filename,
            receipt.bytes
        );

        return Ok((
            StatusCode::ACCEPTED,
            Json(UploadResponse {
                message: "Video uploaded successfully, processing started".to_string(),
                filename: receipt.original_filename,
                job_id: receipt.job_id,
            }),
        ));
    }

    metrics::record_submission_failed("invalid_input");
    Err(ApiError::bad_request(format!("missing '{}' file field", VIDEO_FIELD)))
}

/// List the caller's jobs, newest first.
pub async fn list_video_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<JobStatusResponse>>> {
    let jobs = state.retrieval.list(user.owner_id).await?;
    Ok(Json(jobs.into_iter().map(JobStatusResponse::from).collect()))
}

/// Stream the frame archive of a completed job.
pub async fn download_archive(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    user: AuthUser,
) -> ApiResult<Response> {
    let download = state.retrieval.open_archive(JobId(job_id), user.owner_id).await?;

    info!(
        owner_id = %user.owner_id,
        job_id = job_id,
        "Serving archive {} ({} bytes)",
        download.path.display(),
        download.len
    );
    metrics::record_archive_downloaded();

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name.replace(['"', '\\'], "_")
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, download.len)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReaderStream::new(download.file)))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
