use crate::config::EnhancementConfig;
use crate::ffmpeg;
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

const THUMBNAIL_AT_SECONDS: f64 = 1.0;

#[async_trait]
pub trait MediaEditor: Send + Sync {
    /// Burns `text` over the whole clip into `out_dir/<stem of input>.mp4`.
    async fn caption(&self, input: &Path, text: &str, out_dir: &Path) -> Result<PathBuf>;

    /// Writes `out_dir/<stem of input>.png`, or nothing when no frame can be
    /// read.
    async fn thumbnail(
        &self,
        input: &Path,
        caption: &str,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>>;
}

#[async_trait]
pub trait Enhancer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn enhance(&self, input: &Path, out_dir: &Path) -> Result<PathBuf>;
}

pub fn enhancer_from_config(cfg: &EnhancementConfig) -> Box<dyn Enhancer> {
    match *cfg {
        EnhancementConfig::FrameRate { multiplier } => Box::new(FrameRateBoost { multiplier }),
        EnhancementConfig::Tone {
            brightness,
            contrast,
        } => Box::new(ToneAdjust {
            brightness,
            contrast,
        }),
    }
}

async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create dir {}", path.display()))
}

fn path_with_ext(input: &Path, out_dir: &Path, ext: &str) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .ok_or_else(|| anyhow::anyhow!("No file name in {}", input.display()))?;
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(ext);
    Ok(out_dir.join(name))
}

/// `out_dir/<stem of input>.mp4`. The encode stages always write H.264 in
/// mp4 whatever container came in.
pub fn output_path(input: &Path, out_dir: &Path) -> Result<PathBuf> {
    path_with_ext(input, out_dir, "mp4")
}

pub fn thumbnail_path(input: &Path, out_dir: &Path) -> Result<PathBuf> {
    path_with_ext(input, out_dir, "png")
}

#[derive(Debug, Clone, Default)]
pub struct FfmpegEditor {
    font: Option<PathBuf>,
}

impl FfmpegEditor {
    /// Uses `font` when given, else the first common system font found.
    pub fn new(font: Option<PathBuf>) -> Self {
        let font = font.or_else(ffmpeg::default_font);
        if font.is_none() {
            logw("No caption font found; relying on ffmpeg's fontconfig default.");
        }
        Self { font }
    }
}

#[async_trait]
impl MediaEditor for FfmpegEditor {
    async fn caption(&self, input: &Path, text: &str, out_dir: &Path) -> Result<PathBuf> {
        ensure_dir(out_dir).await?;
        let out = output_path(input, out_dir)?;
        if !ffmpeg::ffmpeg_overlay_caption(input, text, self.font.as_deref(), &out).await? {
            return Err(anyhow::anyhow!("Caption render produced no file: {}", out.display()));
        }
        Ok(out)
    }

    async fn thumbnail(
        &self,
        input: &Path,
        caption: &str,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        ensure_dir(out_dir).await?;
        let out = thumbnail_path(input, out_dir)?;
        let font = self.font.as_deref();

        let at = Some(THUMBNAIL_AT_SECONDS);
        if ffmpeg::ffmpeg_extract_frame_with_caption(input, at, caption, font, &out).await? {
            return Ok(Some(out));
        }
        logi(format!(
            "No frame at {:.0}s in {}; trying the first frame",
            THUMBNAIL_AT_SECONDS,
            input.display()
        ));
        if ffmpeg::ffmpeg_extract_frame_with_caption(input, None, caption, font, &out).await? {
            return Ok(Some(out));
        }
        Ok(None)
    }
}

/// Re-encodes at `multiplier` times the source frame rate. Playback speed
/// is unchanged; frames are duplicated.
#[derive(Debug, Clone, Copy)]
pub struct FrameRateBoost {
    pub multiplier: f64,
}

#[async_trait]
impl Enhancer for FrameRateBoost {
    fn name(&self) -> &'static str {
        "frame-rate"
    }

    async fn enhance(&self, input: &Path, out_dir: &Path) -> Result<PathBuf> {
        if !(self.multiplier > 0.0) {
            return Err(anyhow::anyhow!(
                "Frame-rate multiplier must be positive (got {})",
                self.multiplier
            ));
        }
        ensure_dir(out_dir).await?;
        let out = output_path(input, out_dir)?;
        let fps = ffmpeg::ffprobe_frame_rate(input).await?;
        let target = fps * self.multiplier;
        logi(format!("Frame rate {:.3} -> {:.3}", fps, target));
        if !ffmpeg::ffmpeg_scale_frame_rate(input, target, &out).await? {
            return Err(anyhow::anyhow!("Enhance produced no file: {}", out.display()));
        }
        Ok(out)
    }
}

/// Per-frame `contrast * px + brightness`, 8-bit scale.
#[derive(Debug, Clone, Copy)]
pub struct ToneAdjust {
    pub brightness: f64,
    pub contrast: f64,
}

#[async_trait]
impl Enhancer for ToneAdjust {
    fn name(&self) -> &'static str {
        "tone"
    }

    async fn enhance(&self, input: &Path, out_dir: &Path) -> Result<PathBuf> {
        ensure_dir(out_dir).await?;
        let out = output_path(input, out_dir)?;
        if !ffmpeg::ffmpeg_adjust_tone(input, self.brightness, self.contrast, &out).await? {
            return Err(anyhow::anyhow!("Enhance produced no file: {}", out.display()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_paths_keep_the_input_name() {
        let input = Path::new("downloads/dune-20261016-101500-1.mp4");
        assert_eq!(
            output_path(input, Path::new("edited_videos")).unwrap(),
            PathBuf::from("edited_videos/dune-20261016-101500-1.mp4")
        );
        assert_eq!(
            thumbnail_path(input, Path::new("thumbnails")).unwrap(),
            PathBuf::from("thumbnails/dune-20261016-101500-1.png")
        );
        assert!(output_path(Path::new("/"), Path::new("x")).is_err());
    }

    #[test]
    fn encoded_outputs_are_always_mp4() {
        let input = Path::new("downloads/heat-20261016-101500-2.webm");
        assert_eq!(
            output_path(input, Path::new("edited_videos")).unwrap(),
            PathBuf::from("edited_videos/heat-20261016-101500-2.mp4")
        );
        assert_eq!(
            thumbnail_path(input, Path::new("thumbnails")).unwrap(),
            PathBuf::from("thumbnails/heat-20261016-101500-2.png")
        );
    }

    #[test]
    fn enhancer_follows_config() {
        assert_eq!(enhancer_from_config(&EnhancementConfig::default()).name(), "frame-rate");
        assert_eq!(enhancer_from_config(&EnhancementConfig::tone()).name(), "tone");
    }

    #[tokio::test]
    async fn zero_multiplier_is_rejected_before_reading_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let boost = FrameRateBoost { multiplier: 0.0 };
        let err = boost
            .enhance(&dir.path().join("missing.mp4"), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("multiplier"));
    }
}
