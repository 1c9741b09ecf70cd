//! Configuration types for media-dl

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for a batch run
///
/// Every field has a default, so `Config::default()` downloads the best
/// overall quality into `./downloads_videos`, one item at a time, with three
/// attempts per item and ledger-based dedup enabled.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Destination directory, created if absent (default: "downloads_videos")
    #[serde(default = "default_destination")]
    pub destination: PathBuf,

    /// Quality/format policy
    #[serde(default)]
    pub quality: QualityPolicy,

    /// Extract audio and convert it to MP3 after download
    #[serde(default)]
    pub convert_audio: bool,

    /// How output files are named
    #[serde(default)]
    pub naming: NamingPolicy,

    /// Entry filter rules
    #[serde(default)]
    pub filters: FilterRules,

    /// Maximum items acquired in parallel (default: 1, sequential)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-item retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Dedup ledger settings
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            quality: QualityPolicy::default(),
            convert_audio: false,
            naming: NamingPolicy::default(),
            filters: FilterRules::default(),
            max_concurrent: default_max_concurrent(),
            retry: RetryConfig::default(),
            ledger: LedgerConfig::default(),
            tools: ToolsConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Path of the ledger file inside the destination directory
    pub fn ledger_path(&self) -> PathBuf {
        self.destination.join(&self.ledger.file_name)
    }

    /// Reject invalid settings before a batch starts
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::config(
                "max_concurrent must be at least 1",
                "max_concurrent",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "retry.max_attempts must be at least 1",
                "retry.max_attempts",
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::config(
                "event_capacity must be at least 1",
                "event_capacity",
            ));
        }
        if let QualityPolicy::Custom(selector) = &self.quality
            && selector.trim().is_empty()
        {
            return Err(Error::config("custom format specifier is empty", "quality"));
        }
        if self.ledger.file_name.trim().is_empty() || self.ledger.file_name.contains(['/', '\\'])
        {
            return Err(Error::config(
                format!("invalid ledger file name '{}'", self.ledger.file_name),
                "ledger.file_name",
            ));
        }
        self.filters.validate()
    }
}

/// Quality/format selection policy
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPolicy {
    /// Best video + best audio, falling back to best single file
    #[default]
    BestOverall,
    /// Best MP4 video + M4A audio, falling back to best MP4 then best
    BestMp4,
    /// Best audio in its native format
    AudioOnly,
    /// Best audio converted to MP3
    AudioMp3,
    /// Explicit format specifier (e.g. "137+140")
    Custom(String),
}

impl QualityPolicy {
    /// Format selector passed to the fetch service
    pub fn selector(&self) -> &str {
        match self {
            QualityPolicy::BestOverall => "bestvideo+bestaudio/best",
            QualityPolicy::BestMp4 => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            QualityPolicy::AudioOnly | QualityPolicy::AudioMp3 => AUDIO_ONLY_SELECTOR,
            QualityPolicy::Custom(selector) => selector.as_str(),
        }
    }
}

/// Selector used whenever audio extraction is requested
pub const AUDIO_ONLY_SELECTOR: &str = "bestaudio/best";

/// Output file naming policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingPolicy {
    /// "Title [id].ext" - unique per item
    #[default]
    EmbedId,
    /// "Title.ext" - items with identical titles may collide
    PreserveTitle,
}

/// Entry filter rules
///
/// Absent bounds are unconstrained.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterRules {
    /// Minimum duration in seconds
    #[serde(default)]
    pub min_duration_secs: Option<u64>,

    /// Maximum duration in seconds
    #[serde(default)]
    pub max_duration_secs: Option<u64>,

    /// Earliest upload date (inclusive)
    #[serde(default)]
    pub date_from: Option<NaiveDate>,

    /// Latest upload date (inclusive)
    #[serde(default)]
    pub date_to: Option<NaiveDate>,

    /// Title pattern; case-insensitive substring unless `match_regex` is set
    #[serde(default)]
    pub match_title: Option<String>,

    /// Interpret `match_title` as a regular expression
    #[serde(default)]
    pub match_regex: bool,

    /// Skip items already recorded in the ledger (default: true)
    #[serde(default = "default_true")]
    pub skip_recorded: bool,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            min_duration_secs: None,
            max_duration_secs: None,
            date_from: None,
            date_to: None,
            match_title: None,
            match_regex: false,
            skip_recorded: true,
        }
    }
}

impl FilterRules {
    /// Check that bounds are ordered
    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min_duration_secs, self.max_duration_secs)
            && min > max
        {
            return Err(Error::config(
                format!("min_duration_secs ({min}) is greater than max_duration_secs ({max})"),
                "filters.max_duration_secs",
            ));
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to)
            && from > to
        {
            return Err(Error::config(
                format!("date_from ({from}) is after date_to ({to})"),
                "filters.date_to",
            ));
        }
        Ok(())
    }
}

/// Retry configuration for item downloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total download attempts per item, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff; the k-th retry waits `backoff_base * k` (default: 3 seconds)
    #[serde(default = "default_backoff_base", with = "duration_serde")]
    pub backoff_base: Duration,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            jitter: false,
        }
    }
}

/// Dedup ledger configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// File name of the ledger inside the destination (default: "downloaded_ids.json")
    #[serde(default = "default_ledger_file_name")]
    pub file_name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            file_name: default_ledger_file_name(),
        }
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,

    /// Path to ffmpeg, passed through for merging and audio conversion
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: None,
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

// Default value functions
fn default_destination() -> PathBuf {
    PathBuf::from("downloads_videos")
}

fn default_max_concurrent() -> usize {
    1
}

fn default_event_capacity() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(3)
}

fn default_ledger_file_name() -> String {
    "downloaded_ids.json".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
