use std::path::Path;

use vframe_storage::StorageConfig;
use vframe_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    let storage = StorageConfig::from_env();

    println!(
        "worker-selfcheck: starting with uploads_dir={} processed_dir={} extract_timeout={:?}",
        storage.uploads_dir.display(),
        storage.processed_dir.display(),
        config.extract_timeout
    );
    ensure_writable(&storage.uploads_dir).await?;
    ensure_writable(&storage.processed_dir).await?;
    ensure_ffmpeg().await?;
    ensure_env_present(&["REDIS_URL"])?;
    ensure_any_env_present(&["DATABASE_URL", "DB_HOST"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_writable(dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let marker = dir.join(".selfcheck");
    tokio::fs::write(&marker, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", dir.display(), e))?;
    tokio::fs::remove_file(&marker).await?;
    Ok(())
}

async fn ensure_ffmpeg() -> anyhow::Result<()> {
    let path = vframe_media::check_ffmpeg()?;
    vframe_media::FfmpegRunner::new()
        .run_args(&["-version".to_string()])
        .await
        .map_err(|e| anyhow::anyhow!("ffmpeg -version failed: {}", e))?;
    println!("worker-selfcheck: ffmpeg at {}", path.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

fn ensure_any_env_present(vars: &[&str]) -> anyhow::Result<()> {
    if vars.iter().any(|var| std::env::var(var).is_ok()) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("missing env var, expected one of {}", vars.join(", ")))
    }
}
