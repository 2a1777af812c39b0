//! HTTP submission through worker processing to archive download, over
//! in-memory backends.

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vframe_api::{create_router, ApiConfig, AppState, JwtKeys};
use vframe_ledger::{InMemoryJobLedger, JobLedger};
use vframe_media::{ExtractRequest, FrameExtractor, MediaError, MediaResult};
use vframe_models::{JobId, JobStatus};
use vframe_queue::{InMemoryJobQueue, LogNotifier};
use vframe_storage::{ArtifactStore, StorageConfig};
use vframe_worker::{JobExecutor, JobProcessor, WorkerConfig};

const BOUNDARY: &str = "vframe-test-boundary";
const SECRET: &str = "test-secret";
const VIDEO_MAGIC: &[u8] = b"VIDEO";

/// Writes three frames for sources starting with `VIDEO`, fails like ffmpeg
/// on anything else.
struct MagicExtractor;

#[async_trait]
impl FrameExtractor for MagicExtractor {
    async fn extract(&self, request: &ExtractRequest) -> MediaResult<()> {
        let source = tokio::fs::read(&request.source).await?;
        if !source.starts_with(VIDEO_MAGIC) {
            return Err(MediaError::ffmpeg_failed(
                "ffmpeg exited with status 1",
                Some("Invalid data found when processing input".to_string()),
                Some(1),
            ));
        }
        let pattern = request.output_pattern.to_string_lossy().to_string();
        for i in 1..=3 {
            tokio::fs::write(pattern.replace("%04d", &format!("{i:04}")), format!("frame {i}")).await?;
        }
        Ok(())
    }
}

struct App {
    _dir: TempDir,
    router: Router,
    ledger: Arc<InMemoryJobLedger>,
    worker: JobExecutor,
    keys: JwtKeys,
}

impl App {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(StorageConfig::under(dir.path()));
        let ledger = Arc::new(InMemoryJobLedger::new());
        let queue = Arc::new(InMemoryJobQueue::new());

        let config = ApiConfig {
            jwt_secret: SECRET.to_string(),
            ..ApiConfig::default()
        };
        let state = AppState::new(config, ledger.clone(), queue.clone(), store.clone());
        let router = create_router(state, None);

        let processor = JobProcessor::new(ledger.clone(), store, Arc::new(MagicExtractor), Arc::new(LogNotifier));
        let worker_config = WorkerConfig {
            claim_min_idle: Duration::ZERO,
            ..WorkerConfig::default()
        };
        let worker = JobExecutor::new(worker_config, queue, processor);

        Self {
            _dir: dir,
            router,
            ledger,
            worker,
            keys: JwtKeys::new(SECRET),
        }
    }

    fn token(&self, owner: i64) -> String {
        self.keys
            .issue(owner, &format!("user{owner}"), Duration::from_secs(300))
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn upload(&self, owner: i64, filename: &str, content: &[u8]) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{filename}\"\r\n\
                 Content-Type: video/mp4\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::post("/upload")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(owner)))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn get(&self, owner: i64, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let request = Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(owner)))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn statuses(&self, owner: i64) -> Vec<Value> {
        let (status, _, body) = self.get(owner, "/videos/status").await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }
}

fn job_id(upload: &Value) -> i64 {
    upload["job_id"].as_i64().unwrap()
}

fn detail(body: &[u8]) -> String {
    let value: Value = serde_json::from_slice(body).unwrap();
    value["detail"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_upload_process_and_download() {
    let app = App::new();

    let (status, upload) = app.upload(7, "clip.mp4", b"VIDEO and some bytes").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(upload["filename"], "clip.mp4");
    let id = job_id(&upload);

    let listed = app.statuses(7).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["status"], "PENDING");

    assert_eq!(app.worker.drain().await.unwrap(), 1);

    let listed = app.statuses(7).await;
    assert_eq!(listed[0]["status"], "COMPLETED");
    assert!(listed[0]["result_path"]
        .as_str()
        .unwrap()
        .ends_with("7_clip_processed.zip"));
    assert!(listed[0].get("error_detail").is_none());

    let (status, headers, body) = app.get(7, &format!("/videos/{id}/download")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"7_clip_processed.zip\""
    );

    let mut archive = zip::ZipArchive::new(Cursor::new(body)).unwrap();
    assert_eq!(archive.len(), 3);
    let mut first = String::new();
    archive
        .by_name("clip_0001.png")
        .unwrap()
        .read_to_string(&mut first)
        .unwrap();
    assert_eq!(first, "frame 1");
}

#[tokio::test]
async fn test_undecodable_upload_is_never_downloadable() {
    let app = App::new();

    let (status, upload) = app.upload(7, "broken.mp4", b"garbage").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = job_id(&upload);

    app.worker.drain().await.unwrap();

    let job = app.ledger.find(JobId(id)).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_detail
        .as_deref()
        .unwrap()
        .starts_with("frame extraction failed"));
    assert!(job.result_path.is_none());

    let (status, _, body) = app.get(7, &format!("/videos/{id}/download")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(detail(&body), "job not completed");
}

#[tokio::test]
async fn test_other_owner_cannot_tell_job_exists() {
    let app = App::new();

    let (_, upload) = app.upload(7, "clip.mp4", b"VIDEO").await;
    let id = job_id(&upload);
    app.worker.drain().await.unwrap();

    let (foreign_status, _, foreign_body) = app.get(8, &format!("/videos/{id}/download")).await;
    let (missing_status, _, missing_body) = app.get(8, "/videos/9999/download").await;

    assert_eq!(foreign_status, StatusCode::NOT_FOUND);
    assert_eq!(foreign_status, missing_status);
    assert_eq!(foreign_body, missing_body);
    assert_eq!(detail(&foreign_body), "job not found");

    assert!(app.statuses(8).await.is_empty());
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = App::new();

    let request = Request::get("/videos/status").body(Body::empty()).unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::get("/videos/status")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::post("/upload")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(format!("--{BOUNDARY}--\r\n")))
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.ledger.is_empty().await);
}

#[tokio::test]
async fn test_upload_without_video_field_has_no_side_effects() {
    let app = App::new();

    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nholiday\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::post("/upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(7)))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap();
    let (status, _, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(detail(&body).contains("video"));
    assert!(app.ledger.is_empty().await);
    assert_eq!(app.worker.drain().await.unwrap(), 0);
}

#[tokio::test]
async fn test_deleted_archive_is_gone() {
    let app = App::new();

    let (_, upload) = app.upload(7, "clip.mp4", b"VIDEO").await;
    let id = job_id(&upload);
    app.worker.drain().await.unwrap();

    let job = app.ledger.find(JobId(id)).await.unwrap().unwrap();
    std::fs::remove_file(job.result_path.unwrap()).unwrap();

    let (status, _, _) = app.get(7, &format!("/videos/{id}/download")).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_health_reports_components() {
    let app = App::new();

    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, headers, body) = app.send(request).await;
    let value: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "UP");
    assert_eq!(value["database"], "UP");
    assert_eq!(value["queue"], "UP");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_root_banner_is_json() {
    let app = App::new();

    let request = Request::get("/").body(Body::empty()).unwrap();
    let (status, headers, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert!(value["message"].as_str().unwrap().contains("/upload"));
}

#[tokio::test]
async fn test_listing_is_newest_first() {
    let app = App::new();

    let (_, first) = app.upload(7, "a.mp4", b"VIDEO").await;
    let (_, second) = app.upload(7, "b.mp4", b"VIDEO").await;

    let listed = app.statuses(7).await;
    let ids: Vec<i64> = listed.iter().map(|job| job["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![job_id(&second), job_id(&first)]);
    assert!(listed.iter().all(|job| job.get("owner_id").is_none()));
}
