//! Deterministic file naming for uploads, frames and archives.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use vframe_models::OwnerId;

/// Longest extension carried over from the original filename.
const MAX_EXTENSION_LEN: usize = 10;

/// Stored upload name: `<owner>_<YYYYmmddHHMMSS>_<nanos><ext>`.
pub fn unique_upload_name(owner_id: OwnerId, original_filename: &str, now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros() * 1000);
    format!(
        "{}_{}_{}{}",
        owner_id,
        now.format("%Y%m%d%H%M%S"),
        nanos,
        extension_of(original_filename)
    )
}

/// Base used for frame and archive names: the filename stem with anything
/// outside `[A-Za-z0-9._-]` replaced by `_`.
pub fn frame_base(original_filename: &str) -> String {
    let name = original_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_filename);
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);

    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = sanitized.trim_matches('.');
    if trimmed.is_empty() {
        "video".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Output pattern handed to the frame extractor: `<dir>/<base>_%04d.png`.
pub fn frame_pattern(output_dir: &Path, base: &str) -> PathBuf {
    output_dir.join(format!("{base}_%04d.png"))
}

/// Archive file name: `<owner>_<base>_processed.zip`.
pub fn archive_file_name(owner_id: OwnerId, base: &str) -> String {
    format!("{owner_id}_{base}_processed.zip")
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= MAX_EXTENSION_LEN)
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unique_upload_name() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 5).unwrap();
        let name = unique_upload_name(OwnerId(7), "holiday.MP4", now);
        assert_eq!(name, format!("7_20240102150405_{}.MP4", now.timestamp_nanos_opt().unwrap()));
    }

    #[test]
    fn test_upload_name_drops_suspicious_extension() {
        let now = Utc::now();
        assert!(!unique_upload_name(OwnerId(1), "x.m p4", now).contains(' '));
        assert!(!unique_upload_name(OwnerId(1), "noext", now).contains('.'));
    }

    #[test]
    fn test_frame_base_strips_paths_and_symbols() {
        assert_eq!(frame_base("holiday.mp4"), "holiday");
        assert_eq!(frame_base("../../etc/passwd.mp4"), "passwd");
        assert_eq!(frame_base("C:\\videos\\my clip!.mov"), "my_clip_");
        assert_eq!(frame_base("archive.tar.gz"), "archive.tar");
        assert_eq!(frame_base("..."), "video");
    }

    #[test]
    fn test_frame_pattern_and_archive_name() {
        let dir = Path::new("/data/processed/7/12");
        assert_eq!(
            frame_pattern(dir, "holiday"),
            PathBuf::from("/data/processed/7/12/holiday_%04d.png")
        );
        assert_eq!(archive_file_name(OwnerId(7), "holiday"), "7_holiday_processed.zip");
    }
}
