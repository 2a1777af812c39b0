//! Frame extraction against a real ffmpeg binary.

use std::time::Duration;

use tempfile::TempDir;
use vframe_media::{ExtractRequest, FfmpegFrameExtractor, FfmpegRunner, FrameExtractor, MediaError};

fn png_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
        .count()
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_ten_second_video_yields_about_ten_frames() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("synthetic.mp4");

    let args: Vec<String> = [
        "-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=duration=10:size=160x120:rate=10",
        "-pix_fmt", "yuv420p",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain([source.to_string_lossy().to_string()])
    .collect();
    FfmpegRunner::new().run_args(&args).await.expect("Failed to generate video");

    let extractor = FfmpegFrameExtractor::new(Duration::from_secs(60));
    extractor
        .extract(&ExtractRequest {
            source,
            output_pattern: dir.path().join("synthetic_%04d.png"),
        })
        .await
        .expect("Extraction failed");

    let frames = png_count(dir.path());
    assert!((9..=11).contains(&frames), "got {frames} frames");
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_undecodable_input_reports_tool_failure() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("garbage.mp4");
    std::fs::write(&source, b"this is not a video").unwrap();

    let err = FfmpegFrameExtractor::new(Duration::from_secs(60))
        .extract(&ExtractRequest {
            source,
            output_pattern: dir.path().join("garbage_%04d.png"),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::FfmpegFailed { .. }));
    assert!(!err.detail().is_empty());
    assert_eq!(png_count(dir.path()), 0);
}
