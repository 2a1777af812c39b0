//! Artifact store on the local filesystem.
//!
//! Layout:
//! - `<uploads_dir>/<owner>_<timestamp>_<nanos><ext>` for incoming sources
//! - `<processed_dir>/<owner>/<job_id>/` per job, holding frames and the archive

use std::path::{Path, PathBuf};

use chrono::Utc;
use regex::Regex;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};
use vframe_models::{JobId, OwnerId};

use crate::error::{StorageError, StorageResult};
use crate::naming::{archive_file_name, frame_pattern, unique_upload_name};

/// Attempts at finding a free upload name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub uploads_dir: PathBuf,
    pub processed_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("./uploads"),
            processed_dir: PathBuf::from("./processed_videos"),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uploads_dir: std::env::var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.uploads_dir),
            processed_dir: std::env::var("PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.processed_dir),
        }
    }

    /// Both areas under one root, used by tests and local runs.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            uploads_dir: root.join("uploads"),
            processed_dir: root.join("processed_videos"),
        }
    }
}

/// A fully written upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    config: StorageConfig,
}

impl ArtifactStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(StorageConfig::from_env())
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Create the uploads and processed areas if missing.
    pub async fn ensure_dirs(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.config.uploads_dir).await?;
        fs::create_dir_all(&self.config.processed_dir).await?;
        Ok(())
    }

    /// Stream an upload to a unique path under the uploads area.
    ///
    /// The file is flushed and synced before returning; a partial file is
    /// removed on any write error.
    pub async fn save_upload<R>(
        &self,
        owner_id: OwnerId,
        original_filename: &str,
        reader: &mut R,
    ) -> StorageResult<StoredUpload>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if original_filename.trim().is_empty() {
            return Err(StorageError::invalid_input("filename must not be empty"));
        }
        fs::create_dir_all(&self.config.uploads_dir).await?;

        let (path, mut file) = self.create_unique(owner_id, original_filename).await?;

        let written = async {
            let bytes = tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(bytes)
        }
        .await;

        match written {
            Ok(bytes) => {
                debug!("Stored upload {} ({} bytes)", path.display(), bytes);
                Ok(StoredUpload { path, bytes })
            }
            Err(e) => {
                drop(file);
                self.remove_file(&path).await.ok();
                Err(StorageError::upload_failed(format!("{}: {}", path.display(), e)))
            }
        }
    }

    async fn create_unique(&self, owner_id: OwnerId, original_filename: &str) -> StorageResult<(PathBuf, fs::File)> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self
                .config
                .uploads_dir
                .join(unique_upload_name(owner_id, original_filename, Utc::now()));
            match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::upload_failed("could not allocate a unique upload name"))
    }

    /// True when `path` lies inside the uploads area.
    pub fn owns_upload(&self, path: &Path) -> bool {
        path.strip_prefix(&self.config.uploads_dir)
            .is_ok_and(|rest| rest.components().next().is_some())
            && !path.components().any(|c| matches!(c, std::path::Component::ParentDir))
    }

    /// Output directory owned by one job run.
    pub fn job_output_dir(&self, owner_id: OwnerId, job_id: JobId) -> PathBuf {
        self.config
            .processed_dir
            .join(owner_id.to_string())
            .join(job_id.to_string())
    }

    pub fn frame_pattern(&self, output_dir: &Path, base: &str) -> PathBuf {
        frame_pattern(output_dir, base)
    }

    pub fn archive_path(&self, output_dir: &Path, owner_id: OwnerId, base: &str) -> PathBuf {
        output_dir.join(archive_file_name(owner_id, base))
    }

    /// Empty (or create) a job's output directory.
    pub async fn reset_dir(&self, dir: &Path) -> StorageResult<()> {
        match fs::remove_dir_all(dir).await {
            Ok(()) => debug!("Cleared previous output in {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(dir).await?;
        Ok(())
    }

    /// Frames named `<base>_<digits>.png` in `dir`, sorted by name.
    pub async fn list_frames(&self, dir: &Path, base: &str) -> StorageResult<Vec<PathBuf>> {
        let pattern = Regex::new(&format!(r"^{}_\d+\.png$", regex::escape(base)))
            .map_err(|e| StorageError::invalid_input(e.to_string()))?;

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut frames = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_str().is_some_and(|n| pattern.is_match(n)) {
                frames.push(entry.path());
            }
        }
        frames.sort();
        Ok(frames)
    }

    /// Remove a file; a missing file is not an error. Returns whether it existed.
    pub async fn remove_file(&self, path: &Path) -> StorageResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of many files. Returns how many were deleted.
    pub async fn remove_files(&self, paths: &[PathBuf]) -> usize {
        let mut removed = 0;
        for path in paths {
            match self.remove_file(path).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        removed
    }

    /// Remove a directory tree; a missing directory is not an error.
    pub async fn remove_dir(&self, dir: &Path) -> StorageResult<()> {
        match fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Open a stored artifact for reading.
    pub async fn open(&self, path: &Path) -> StorageResult<(fs::File, u64)> {
        let file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();
        Ok((file, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::new(StorageConfig::under(dir.path()))
    }

    #[tokio::test]
    async fn test_save_upload_streams_whole_body() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let body = vec![42u8; 256 * 1024];

        let stored = store
            .save_upload(OwnerId(7), "clip.mp4", &mut body.as_slice())
            .await
            .unwrap();

        assert_eq!(stored.bytes, body.len() as u64);
        assert!(stored.path.starts_with(&store.config().uploads_dir));
        let name = stored.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("7_"));
        assert!(name.ends_with(".mp4"));
        assert_eq!(fs::read(&stored.path).await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_save_upload_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let a = store.save_upload(OwnerId(7), "same.mp4", &mut &b"a"[..]).await.unwrap();
        let b = store.save_upload(OwnerId(7), "same.mp4", &mut &b"b"[..]).await.unwrap();
        assert_ne!(a.path, b.path);
    }

    #[tokio::test]
    async fn test_save_upload_rejects_empty_filename() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let err = store.save_upload(OwnerId(7), " ", &mut &b"x"[..]).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_job_dirs_are_distinct_per_job() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let a = store.job_output_dir(OwnerId(7), JobId(1));
        let b = store.job_output_dir(OwnerId(7), JobId(2));
        assert_ne!(a, b);
        assert!(a.starts_with(store.config().processed_dir.join("7")));
    }

    #[tokio::test]
    async fn test_list_frames_matches_only_this_base() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let out = store.job_output_dir(OwnerId(7), JobId(1));
        store.reset_dir(&out).await.unwrap();

        for name in ["clip_0002.png", "clip_0001.png", "clip_x.png", "other_0001.png", "clip_0001.jpg"] {
            fs::write(out.join(name), b"png").await.unwrap();
        }

        let frames = store.list_frames(&out, "clip").await.unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["clip_0001.png", "clip_0002.png"]);
    }

    #[tokio::test]
    async fn test_list_frames_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let frames = store.list_frames(&dir.path().join("nope"), "clip").await.unwrap();
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_reset_dir_clears_previous_run() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let out = store.job_output_dir(OwnerId(1), JobId(9));
        store.reset_dir(&out).await.unwrap();
        fs::write(out.join("clip_0001.png"), b"old").await.unwrap();

        store.reset_dir(&out).await.unwrap();
        assert!(store.list_frames(&out, "clip").await.unwrap().is_empty());
        assert!(store.exists(&out).await);
    }

    #[tokio::test]
    async fn test_remove_helpers_tolerate_missing_files() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = dir.path().join("gone.mp4");
        fs::write(&path, b"x").await.unwrap();

        assert!(store.remove_file(&path).await.unwrap());
        assert!(!store.remove_file(&path).await.unwrap());
        assert_eq!(store.remove_files(&[path.clone(), path]).await, 0);
        store.remove_dir(&dir.path().join("missing")).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let err = store.open(&dir.path().join("a.zip")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_owns_upload() {
        let store = ArtifactStore::new(StorageConfig::under("/srv/vframe"));
        assert!(store.owns_upload(Path::new("/srv/vframe/uploads/7_20240101000000_1.mp4")));
        assert!(!store.owns_upload(Path::new("/srv/vframe/uploads")));
        assert!(!store.owns_upload(Path::new("/srv/vframe/uploads/../secrets.txt")));
        assert!(!store.owns_upload(Path::new("/etc/passwd")));
    }
}
