use crate::logw;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

const CAPTION_FONT_SIZE: u32 = 50;
const STDERR_TAIL: usize = 600;

/// Fonts tried when no caption font is configured.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to launch {}", args[0]))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .chars()
            .rev()
            .take(STDERR_TAIL)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return Err(anyhow::anyhow!(
            "{} exited with {}: {}",
            args[0],
            output.status,
            tail.trim()
        ));
    }

    Ok(())
}

fn base_args() -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ]
}

fn h264_args() -> Vec<String> {
    vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
    ]
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed on {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.0 {
        return Err(anyhow::anyhow!("Invalid duration '{}'", text));
    }
    Ok(duration)
}

pub async fn ffprobe_frame_rate(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe frame rate failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed on {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    parse_frame_rate(&text).ok_or_else(|| anyhow::anyhow!("Invalid frame rate '{}'", text))
}

/// Parses ffprobe's `num/den` (or plain decimal) rate notation.
pub fn parse_frame_rate(text: &str) -> Option<f64> {
    let text = text.lines().next()?.trim();
    let rate = match text.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => text.parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn escape_chars(input: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if specials.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escapes a filter option value for use inside an `-vf` graph. Values
/// pass through two unescaping levels: the option parser, then the graph
/// parser.
pub fn escape_filter_value(value: &str) -> String {
    let option_level = escape_chars(value, &['\\', '\'', ':']);
    escape_chars(&option_level, &['\\', '\'', ',', ';', '[', ']'])
}

pub fn default_font() -> Option<PathBuf> {
    FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Builds a `drawtext` filter. `x`/`y` are ffmpeg expressions.
pub fn drawtext_filter(text: &str, font: Option<&Path>, x: &str, y: &str) -> String {
    let mut filter = format!(
        "drawtext=expansion=none:text={}:fontsize={}:fontcolor=white:x={}:y={}",
        escape_filter_value(text),
        CAPTION_FONT_SIZE,
        x,
        y
    );
    if let Some(font) = font {
        filter.push_str(&format!(
            ":fontfile={}",
            escape_filter_value(&font.display().to_string())
        ));
    }
    filter
}

/// Burns `text` bottom-centred over the whole clip. Audio is copied so the
/// output keeps the input duration.
pub async fn ffmpeg_overlay_caption(
    in_mp4: &Path,
    text: &str,
    font: Option<&Path>,
    out_mp4: &Path,
) -> Result<bool> {
    let filter = drawtext_filter(text, font, "(w-text_w)/2", "h-text_h-40");

    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        in_mp4.display().to_string(),
        "-vf".to_string(),
        filter,
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "0:a?".to_string(),
    ]);
    args.extend(h264_args());
    args.extend([
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ]);

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

pub async fn ffmpeg_scale_frame_rate(in_mp4: &Path, fps: f64, out_mp4: &Path) -> Result<bool> {
    if !(fps > 0.0) {
        return Err(anyhow::anyhow!("Frame rate must be positive (got {})", fps));
    }

    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        in_mp4.display().to_string(),
        "-vf".to_string(),
        format!("fps={:.3}", fps),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "0:a?".to_string(),
    ]);
    args.extend(h264_args());
    args.extend([
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ]);

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// `eq` takes brightness in [-1, 1]; the 8-bit offset is normalized first.
pub fn tone_filter(brightness: f64, contrast: f64) -> String {
    let normalized = (brightness / 255.0).clamp(-1.0, 1.0);
    format!("eq=brightness={:.4}:contrast={:.4}", normalized, contrast)
}

pub async fn ffmpeg_adjust_tone(
    in_mp4: &Path,
    brightness: f64,
    contrast: f64,
    out_mp4: &Path,
) -> Result<bool> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        in_mp4.display().to_string(),
        "-vf".to_string(),
        tone_filter(brightness, contrast),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "0:a?".to_string(),
    ]);
    args.extend(h264_args());
    args.extend([
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ]);

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// Writes one frame (at `at_s`, or the first frame) with `caption` drawn at
/// (50, 50). Returns false and leaves nothing behind when no frame decodes.
pub async fn ffmpeg_extract_frame_with_caption(
    in_mp4: &Path,
    at_s: Option<f64>,
    caption: &str,
    font: Option<&Path>,
    out_png: &Path,
) -> Result<bool> {
    let mut args = base_args();
    if let Some(at) = at_s {
        args.extend(["-ss".to_string(), format!("{:.3}", at)]);
    }
    args.extend([
        "-i".to_string(),
        in_mp4.display().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        drawtext_filter(caption, font, "50", "50"),
        "-update".to_string(),
        "1".to_string(),
        out_png.display().to_string(),
    ]);

    if let Err(err) = run_cmd(&args).await {
        logw(format!("Frame extraction failed: {}", err));
        let _ = tokio::fs::remove_file(out_png).await;
        return Ok(false);
    }

    match tokio::fs::metadata(out_png).await {
        Ok(meta) if meta.len() > 0 => Ok(true),
        Ok(_) => {
            let _ = tokio::fs::remove_file(out_png).await;
            Ok(false)
        }
        Err(_) => Ok(false),
    }
}
