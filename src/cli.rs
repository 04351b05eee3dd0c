use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use trailer_uploader::config::{Config, EnhancementConfig, TrailerSourceKind};
use trailer_uploader::init;
use trailer_uploader::pipeline::{self, ItemOutcome, RunOptions};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EnhanceArg {
    FrameRate,
    Tone,
}

/// Find, caption, enhance and upload movie trailers.
#[derive(Debug, Parser)]
#[command(name = "trailer-cli", version, about)]
struct Cli {
    /// Movie titles. Read from --titles-file or stdin when omitted.
    titles: Vec<String>,

    /// File with one movie title per line.
    #[arg(long, value_name = "PATH")]
    titles_file: Option<PathBuf>,

    #[arg(long, default_value = "config.json", value_name = "PATH")]
    config: PathBuf,

    /// Primary trailer source; YouTube search is always tried after it.
    #[arg(long, value_enum)]
    source: Option<TrailerSourceKind>,

    #[arg(long, value_enum)]
    enhance: Option<EnhanceArg>,

    /// Use templated metadata instead of asking the LLM.
    #[arg(long)]
    no_llm: bool,

    /// Run everything except the upload; skips YouTube authorization.
    #[arg(long)]
    dry_run: bool,
}

fn collect_titles(cli: &Cli) -> Result<Vec<String>> {
    let mut titles: Vec<String> = cli
        .titles
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if let Some(path) = &cli.titles_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read titles file {}", path.display()))?;
        titles.extend(pipeline::split_titles(&text));
    }

    if titles.is_empty() && !std::io::stdin().is_terminal() {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read titles from stdin")?;
        titles.extend(pipeline::split_titles(&text));
    }

    Ok(titles)
}

fn apply_overrides(cfg: &mut Config, cli: &Cli) {
    if let Some(source) = cli.source {
        cfg.trailer_source = source;
    }
    match cli.enhance {
        Some(EnhanceArg::Tone) if !matches!(cfg.enhancement, EnhancementConfig::Tone { .. }) => {
            cfg.enhancement = EnhancementConfig::tone();
        }
        Some(EnhanceArg::FrameRate)
            if !matches!(cfg.enhancement, EnhancementConfig::FrameRate { .. }) =>
        {
            cfg.enhancement = EnhancementConfig::default();
        }
        _ => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let titles = collect_titles(&cli)?;
    if titles.is_empty() {
        anyhow::bail!("No movie titles given (pass them as arguments, --titles-file, or stdin)");
    }

    let mut cfg = Config::load(&cli.config).await?;
    apply_overrides(&mut cfg, &cli);

    if !init::check_ffmpeg().await {
        tracing::warn!("FFmpeg not found in PATH. Please install FFmpeg.");
    }
    if !init::check_ytdlp().await {
        tracing::warn!("yt-dlp not found in PATH. Trailer downloads will fail.");
    }

    let options = RunOptions {
        dry_run: cli.dry_run,
        no_llm: cli.no_llm,
    };
    let report = pipeline::run_batch(&cfg, &titles, options).await?;

    for outcome in &report.outcomes {
        match outcome {
            ItemOutcome::Published { title, video_id, .. } => {
                println!("published\t{}\thttps://youtu.be/{}", title, video_id)
            }
            ItemOutcome::Prepared { title, media, .. } => {
                println!("prepared\t{}\t{}", title, media.display())
            }
            ItemOutcome::Skipped { title, reason } => println!("skipped\t{}\t{}", title, reason),
            ItemOutcome::Failed { title, stage, error } => {
                println!("failed\t{}\t{}: {}", title, stage, error)
            }
        }
    }
    println!("{}", report.summary());

    std::process::exit(if report.failed() > 0 { 1 } else { 0 });
}
