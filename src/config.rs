use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("enhancement.multiplier must be positive (got {0})")]
    BadMultiplier(f64),
    #[error("enhancement.contrast must be positive (got {0})")]
    BadContrast(f64),
    #[error("privacy_status must be public, unlisted or private (got '{0}')")]
    BadPrivacy(String),
}

/// Primary trailer lookup. YouTube search is always tried after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TrailerSourceKind {
    #[default]
    RottenTomatoes,
    Imdb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EnhancementConfig {
    FrameRate {
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
    /// `out = contrast * in + brightness` on 8-bit samples.
    Tone {
        #[serde(default = "default_brightness")]
        brightness: f64,
        #[serde(default = "default_contrast")]
        contrast: f64,
    },
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        EnhancementConfig::FrameRate {
            multiplier: default_multiplier(),
        }
    }
}

impl EnhancementConfig {
    pub fn tone() -> Self {
        EnhancementConfig::Tone {
            brightness: default_brightness(),
            contrast: default_contrast(),
        }
    }
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_brightness() -> f64 {
    30.0
}

fn default_contrast() -> f64 {
    1.2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "open_api_key")]
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    /// Extra instructions appended to the metadata prompt.
    pub prompt_hint: Option<String>,
    pub trailer_source: TrailerSourceKind,
    pub enhancement: EnhancementConfig,
    pub work_root: PathBuf,
    pub client_secret_path: PathBuf,
    pub token_cache_path: PathBuf,
    pub privacy_status: String,
    pub caption_font: Option<PathBuf>,
    pub thumbnail_caption: String,
    pub set_thumbnail: bool,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o".to_string(),
            prompt_hint: None,
            trailer_source: TrailerSourceKind::default(),
            enhancement: EnhancementConfig::default(),
            work_root: PathBuf::from("."),
            client_secret_path: PathBuf::from("credentials.json"),
            token_cache_path: PathBuf::from("youtube_token.json"),
            privacy_status: "public".to_string(),
            caption_font: None,
            thumbnail_caption: "Watch Now!".to_string(),
            set_thumbnail: true,
            http_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Reads `path` if it exists (defaults otherwise), then fills the OpenAI
    /// key from the environment when the file does not carry one.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = match fs::read_to_string(path).await {
            Ok(content) => Self::from_json(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("{} not found, using defaults", path.display());
                Config::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if config.openai_key().is_none() {
            config.openai_api_key = std::env::var(OPENAI_KEY_ENV)
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.enhancement {
            EnhancementConfig::FrameRate { multiplier } if !(multiplier > 0.0) => {
                return Err(ConfigError::BadMultiplier(multiplier));
            }
            EnhancementConfig::Tone { contrast, .. } if !(contrast > 0.0) => {
                return Err(ConfigError::BadContrast(contrast));
            }
            _ => {}
        }

        match self.privacy_status.as_str() {
            "public" | "unlisted" | "private" => Ok(()),
            other => Err(ConfigError::BadPrivacy(other.to_string())),
        }
    }

    pub fn openai_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.openai_model, "gpt-4o");
        assert_eq!(cfg.trailer_source, TrailerSourceKind::RottenTomatoes);
        assert_eq!(cfg.enhancement, EnhancementConfig::FrameRate { multiplier: 1.5 });
        assert_eq!(cfg.thumbnail_caption, "Watch Now!");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_tone_enhancement_and_imdb_source() {
        let cfg = Config::from_json(
            r#"{"trailer_source":"imdb","enhancement":{"mode":"tone","brightness":10}}"#,
        )
        .unwrap();
        assert_eq!(cfg.trailer_source, TrailerSourceKind::Imdb);
        assert_eq!(
            cfg.enhancement,
            EnhancementConfig::Tone {
                brightness: 10.0,
                contrast: 1.2
            }
        );
    }

    #[test]
    fn accepts_legacy_key_name() {
        let cfg = Config::from_json(r#"{"open_api_key":"  sk-test "}"#).unwrap();
        assert_eq!(cfg.openai_key(), Some("sk-test"));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let cfg = Config::from_json(r#"{"openai_api_key":"   "}"#).unwrap();
        assert_eq!(cfg.openai_key(), None);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.enhancement = EnhancementConfig::FrameRate { multiplier: 0.0 };
        assert!(matches!(cfg.validate(), Err(ConfigError::BadMultiplier(_))));

        cfg.enhancement = EnhancementConfig::Tone {
            brightness: 0.0,
            contrast: -1.0,
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::BadContrast(_))));

        cfg.enhancement = EnhancementConfig::default();
        cfg.privacy_status = "friends".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::BadPrivacy(_))));
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(dir.path().join("nope.json")).await.unwrap();
        assert_eq!(cfg.privacy_status, "public");
    }

    #[tokio::test]
    async fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load(&path).await,
            Err(ConfigError::Parse { .. })
        ));
    }
}
