use crate::logi;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Saves the media behind `uri` as `<dest_stem>.<ext>` and returns the
    /// written path.
    async fn fetch(&self, uri: &str, dest_stem: &Path) -> Result<PathBuf>;
}

/// Downloads through `yt-dlp` into an mp4 container, preferring a native mp4
/// stream and remuxing anything else.
pub struct YtDlpFetcher {
    program: String,
    format: String,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            format: "best[ext=mp4]/best".to_string(),
        }
    }
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    fn args(&self, uri: &str, dest_stem: &Path) -> Vec<String> {
        vec![
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--no-simulate".to_string(),
            "-f".to_string(),
            self.format.clone(),
            "--remux-video".to_string(),
            "mp4".to_string(),
            "-o".to_string(),
            format!("{}.%(ext)s", dest_stem.display()),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            uri.to_string(),
        ]
    }
}

/// The last non-empty stdout line is the final file path.
fn printed_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(PathBuf::from)
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, uri: &str, dest_stem: &Path) -> Result<PathBuf> {
        if let Some(parent) = dest_stem.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }

        logi(format!("{} {}", self.program, uri));
        let output = Command::new(&self.program)
            .args(self.args(uri, dest_stem))
            .output()
            .await
            .with_context(|| format!("{} execution failed", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "{} failed for {}: {}",
                self.program,
                uri,
                stderr.trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = printed_path(&stdout)
            .ok_or_else(|| anyhow::anyhow!("{} did not report an output file", self.program))?;
        if !fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(anyhow::anyhow!("Downloaded file missing: {}", path.display()));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_template_keeps_stem() {
        let fetcher = YtDlpFetcher::new();
        let uri = "https://www.youtube.com/watch?v=abc";
        let args = fetcher.args(uri, Path::new("downloads/dune-1"));
        let o = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o + 1], "downloads/dune-1.%(ext)s");
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
        assert!(args.contains(&"best[ext=mp4]/best".to_string()));
    }

    #[test]
    fn non_mp4_downloads_are_remuxed() {
        let args = YtDlpFetcher::new().args("https://vimeo.test/1", Path::new("downloads/heat-2"));
        let r = args.iter().position(|a| a == "--remux-video").unwrap();
        assert_eq!(args[r + 1], "mp4");
    }

    #[test]
    fn takes_last_printed_line() {
        let out = "[info] something\ndownloads/dune-1.mp4\n\n";
        assert_eq!(printed_path(out), Some(PathBuf::from("downloads/dune-1.mp4")));
        assert_eq!(printed_path("\n  \n"), None);
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = YtDlpFetcher::with_program("definitely-not-a-real-downloader-binary");
        let result = fetcher
            .fetch("https://example.invalid/v", &dir.path().join("downloads/x"))
            .await;
        assert!(result.is_err());
        assert!(dir.path().join("downloads").is_dir());
    }
}
