//! Archive builder.
//!
//! Packs extracted frames into one Deflate-compressed ZIP. Frames that cannot
//! be read are skipped; an archive with no entries is an error. The ZIP writer
//! is finalized before the backing file is synced, and both steps are checked.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no frames could be added to the archive")]
    NoFrames,

    #[error("failed to create archive {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write archive entry: {0}")]
    Entry(#[source] zip::result::ZipError),

    #[error("failed to finalize archive: {0}")]
    Finalize(#[source] zip::result::ZipError),

    #[error("failed to flush archive to disk: {0}")]
    Sync(#[source] std::io::Error),

    #[error("archive task failed: {0}")]
    Task(String),
}

/// A frame left out of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFrame {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub path: PathBuf,
    /// Entry names in archive order
    pub entries: Vec<String>,
    pub skipped: Vec<SkippedFrame>,
}

/// Build the archive on the blocking pool.
pub async fn build_archive(archive_path: PathBuf, frames: Vec<PathBuf>) -> Result<ArchiveReport, ArchiveError> {
    tokio::task::spawn_blocking(move || write_archive(&archive_path, &frames))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

/// Write `frames` into a new archive at `archive_path`, each entry named by
/// the frame's file name.
pub fn write_archive(archive_path: &Path, frames: &[PathBuf]) -> Result<ArchiveReport, ArchiveError> {
    let file = File::create(archive_path).map_err(|source| ArchiveError::Create {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut entries = Vec::with_capacity(frames.len());
    let mut skipped = Vec::new();

    for frame in frames {
        let Some(name) = frame.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            skipped.push(SkippedFrame {
                path: frame.clone(),
                reason: "file name is not valid UTF-8".to_string(),
            });
            continue;
        };

        let data = match read_frame(frame) {
            Ok(data) => data,
            Err(e) => {
                warn!("Skipping frame {}: {}", frame.display(), e);
                skipped.push(SkippedFrame {
                    path: frame.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        zip.start_file(name.as_str(), options).map_err(ArchiveError::Entry)?;
        if let Err(e) = zip.write_all(&data) {
            warn!("Skipping frame {}: {}", frame.display(), e);
            zip.abort_file().map_err(ArchiveError::Entry)?;
            skipped.push(SkippedFrame {
                path: frame.clone(),
                reason: e.to_string(),
            });
            continue;
        }
        entries.push(name);
    }

    if entries.is_empty() {
        return Err(ArchiveError::NoFrames);
    }

    let mut file = zip.finish().map_err(ArchiveError::Finalize)?;
    file.flush().map_err(ArchiveError::Sync)?;
    file.sync_all().map_err(ArchiveError::Sync)?;

    debug!(
        "Wrote archive {} with {} entries ({} skipped)",
        archive_path.display(),
        entries.len(),
        skipped.len()
    );

    Ok(ArchiveReport {
        path: archive_path.to_path_buf(),
        entries,
        skipped,
    })
}

/// Open, stat and read one frame. The handle is closed on return.
fn read_frame(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut data = Vec::with_capacity(len as usize);
    file.read_to_end(&mut data)?;
    Ok(data)
}
