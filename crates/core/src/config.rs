//! Runtime configuration.
//!
//! Everything has a default tuned for the current YouTube watch page, so a
//! missing config file is not an error. Durations are stored as milliseconds.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::get_config_dir;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid video URL pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub extractor: ExtractorConfig,
    pub monitor: MonitorConfig,
    pub gemini: GeminiConfig,
}

/// Selectors for the page affordances the extractor drives. The page author
/// does not version these for us, so they are expected to break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub expand_description: String,
    pub show_transcript: String,
    pub transcript_segment: String,
    pub segment_text: String,
    pub close_transcript: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            expand_description: "#description-inline-expander #expand".to_string(),
            show_transcript: "ytd-video-description-transcript-section-renderer button"
                .to_string(),
            transcript_segment: "ytd-transcript-segment-renderer".to_string(),
            segment_text: "ytd-transcript-segment-renderer .segment-text".to_string(),
            close_transcript: "ytd-engagement-panel-section-list-renderer[target-id='engagement-panel-searchable-transcript'] #visibility-button button".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub selectors: Selectors,
    pub poll_interval_ms: u64,
    pub expand_timeout_ms: u64,
    pub transcript_control_timeout_ms: u64,
    pub segment_timeout_ms: u64,
    pub close_timeout_ms: u64,
    pub min_transcript_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            selectors: Selectors::default(),
            poll_interval_ms: 200,
            expand_timeout_ms: 3_000,
            transcript_control_timeout_ms: 10_000,
            segment_timeout_ms: 10_000,
            close_timeout_ms: 2_000,
            min_transcript_chars: 50,
        }
    }
}

impl ExtractorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn expand_timeout(&self) -> Duration {
        Duration::from_millis(self.expand_timeout_ms)
    }

    pub fn transcript_control_timeout(&self) -> Duration {
        Duration::from_millis(self.transcript_control_timeout_ms)
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_millis(self.segment_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub video_url_pattern: String,
    pub settle_delay_ms: u64,
    pub debounce_ms: u64,
    /// Upper bound on how long a burst may keep postponing evaluation.
    pub debounce_max_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            video_url_pattern: r"^https?://(www\.|m\.)?youtube\.com/watch\?(.*&)?v=[\w-]+"
                .to_string(),
            settle_delay_ms: 2_000,
            debounce_ms: 100,
            debounce_max_ms: 1_000,
        }
    }
}

impl MonitorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn debounce_max(&self) -> Duration {
        Duration::from_millis(self.debounce_max_ms.max(self.debounce_ms))
    }

    pub fn video_url_regex(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.video_url_pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: self.video_url_pattern.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-pro".to_string(),
            request_timeout_ms: 120_000,
        }
    }
}

impl GeminiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

impl Config {
    /// Load from `path`, or from the default location when `None`. Only an
    /// explicitly requested file has to exist.
    pub async fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (get_config_path(), false),
        };

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Config::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config: Config =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;
        config.monitor.video_url_regex()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern_matches_watch_pages_only() {
        let re = MonitorConfig::default().video_url_regex().unwrap();
        assert!(re.is_match("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(re.is_match("https://www.youtube.com/watch?app=desktop&v=abc-123"));
        assert!(!re.is_match("https://www.youtube.com/"));
        assert!(!re.is_match("https://www.youtube.com/results?search_query=rust"));
    }

    #[tokio::test]
    async fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "monitor": { "settle_delay_ms": 500 } }"#).unwrap();

        let config = Config::load(Some(&path)).await.unwrap();
        assert_eq!(config.monitor.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.monitor.debounce_ms, 100);
        assert_eq!(config.extractor.min_transcript_chars, 50);
        assert_eq!(config.gemini.model, "gemini-pro");
    }

    #[test]
    fn debounce_max_never_undercuts_debounce() {
        let monitor = MonitorConfig {
            debounce_ms: 500,
            debounce_max_ms: 200,
            ..MonitorConfig::default()
        };
        assert_eq!(monitor.debounce_max(), Duration::from_millis(500));
        assert_eq!(
            MonitorConfig::default().debounce_max(),
            Duration::from_millis(1_000)
        );
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.json")))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[tokio::test]
    async fn bad_pattern_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "monitor": { "video_url_pattern": "(" } }"#).unwrap();

        let err = Config::load(Some(&path)).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
