use crate::logi;
use crate::pipeline::WorkDirs;
use anyhow::{Context, Result};
use tokio::fs;

pub async fn ensure_directories(dirs: &WorkDirs) -> Result<()> {
    for dir in dirs.all() {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

async fn tool_runs(program: &str, version_flag: &str) -> bool {
    match tokio::process::Command::new(program)
        .arg(version_flag)
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

pub async fn check_ffmpeg() -> bool {
    tool_runs("ffmpeg", "-version").await && tool_runs("ffprobe", "-version").await
}

pub async fn check_ytdlp() -> bool {
    tool_runs("yt-dlp", "--version").await
}
