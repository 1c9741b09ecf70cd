//! yt-dlp backed fetch service

use super::MediaFetchService;
use crate::config::ToolsConfig;
use crate::error::{Error, FetchError, ResolutionError};
use crate::request::{AcquisitionRequest, PostProcessor};
use crate::types::ItemDescriptor;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const TOOL_NAME: &str = "yt-dlp";

/// Longest stderr excerpt kept in error messages
const MAX_STDERR_CHARS: usize = 500;

/// Fetch service that runs the external `yt-dlp` binary
///
/// Resolution uses `yt-dlp -J`, which prints one JSON document describing
/// either a single item or a collection with `entries`. Downloads run
/// `yt-dlp` once per request.
///
/// # Examples
///
/// ```no_run
/// use media_dl::fetch::YtDlpService;
/// use std::path::PathBuf;
///
/// // Explicit path
/// let service = YtDlpService::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let service = YtDlpService::from_path().expect("yt-dlp not found in PATH");
/// ```
#[derive(Clone, Debug)]
pub struct YtDlpService {
    binary_path: PathBuf,
    ffmpeg_location: Option<PathBuf>,
}

impl YtDlpService {
    /// Create a service with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            ffmpeg_location: None,
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which(TOOL_NAME).ok().map(Self::new)
    }

    /// Build a service from tool settings
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalTool`] if no path is configured and the binary
    /// cannot be found (or PATH search is disabled).
    pub fn from_config(tools: &ToolsConfig) -> crate::Result<Self> {
        let service = match &tools.yt_dlp_path {
            Some(path) => Self::new(path.clone()),
            None if tools.search_path => Self::from_path().ok_or_else(|| {
                Error::ExternalTool(format!("{TOOL_NAME} not found in PATH"))
            })?,
            None => {
                return Err(Error::ExternalTool(format!(
                    "no {TOOL_NAME} path configured and PATH search is disabled"
                )));
            }
        };

        Ok(match &tools.ffmpeg_path {
            Some(ffmpeg) => service.with_ffmpeg(ffmpeg.clone()),
            None => service,
        })
    }

    /// Point yt-dlp at a specific ffmpeg binary
    pub fn with_ffmpeg(mut self, ffmpeg: PathBuf) -> Self {
        self.ffmpeg_location = Some(ffmpeg);
        self
    }

    /// Path of the yt-dlp binary in use
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn resolve_args(&self, locator: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-J".into(),
            "--no-warnings".into(),
            "--no-check-certificate".into(),
        ];
        self.push_ffmpeg(&mut args);
        args.push(locator.into());
        args
    }

    fn download_args(&self, request: &AcquisitionRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            request.format.clone().into(),
            "-o".into(),
            request.output_template.clone().into_os_string(),
            "--no-playlist".into(),
            "--no-check-certificate".into(),
            "--continue".into(),
        ];

        if let Some(container) = &request.merge_output_format {
            args.push("--merge-output-format".into());
            args.push(container.into());
        }

        for step in &request.post_processors {
            match step {
                PostProcessor::ExtractAudio {
                    codec,
                    bitrate_kbps,
                } => {
                    args.push("-x".into());
                    args.push("--audio-format".into());
                    args.push(codec.into());
                    args.push("--audio-quality".into());
                    args.push(format!("{bitrate_kbps}K").into());
                }
            }
        }

        self.push_ffmpeg(&mut args);
        args.push(request.url.clone().into());
        args
    }

    fn push_ffmpeg(&self, args: &mut Vec<OsString>) {
        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.clone().into_os_string());
        }
    }
}

#[async_trait]
impl MediaFetchService for YtDlpService {
    async fn resolve(&self, locator: &str) -> Result<Vec<ItemDescriptor>, ResolutionError> {
        validate_locator(locator)?;

        tracing::debug!(locator = %locator, "Resolving locator with yt-dlp");
        let output = Command::new(&self.binary_path)
            .args(self.resolve_args(locator))
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ResolutionError::ToolFailed {
                tool: TOOL_NAME.to_string(),
                status: output.status.to_string(),
                stderr: stderr_excerpt(&output.stderr),
            });
        }

        parse_info(&output.stdout)
    }

    async fn download(&self, request: &AcquisitionRequest) -> Result<(), FetchError> {
        let output = Command::new(&self.binary_path)
            .args(self.download_args(request))
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(FetchError::ToolFailed {
                tool: TOOL_NAME.to_string(),
                status: output.status.to_string(),
                stderr: stderr_excerpt(&output.stderr),
            })
        }
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Only absolute http(s) URLs are accepted as locators
fn validate_locator(locator: &str) -> Result<url::Url, ResolutionError> {
    let invalid = |reason: String| ResolutionError::InvalidLocator {
        locator: locator.to_string(),
        reason,
    };

    let parsed = url::Url::parse(locator.trim()).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let char_count = trimmed.chars().count();
    if char_count <= MAX_STDERR_CHARS {
        trimmed.to_string()
    } else {
        // Keep the tail, where yt-dlp prints the actual ERROR line
        trimmed.chars().skip(char_count - MAX_STDERR_CHARS).collect()
    }
}

/// Subset of the yt-dlp info JSON the engine cares about
#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    upload_date: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    entries: Option<Vec<Option<RawInfo>>>,
}

/// Turn a `yt-dlp -J` document into descriptors
///
/// Collections are flattened (including nested collections); `null` entries
/// and entries with neither an identifier nor a URL are dropped.
pub(crate) fn parse_info(bytes: &[u8]) -> Result<Vec<ItemDescriptor>, ResolutionError> {
    let info: RawInfo = serde_json::from_slice(bytes)
        .map_err(|e| ResolutionError::InvalidMetadata(e.to_string()))?;

    let mut items = Vec::new();
    collect_items(info, &mut items);
    Ok(items)
}

fn collect_items(info: RawInfo, items: &mut Vec<ItemDescriptor>) {
    match info.entries {
        Some(entries) => {
            for entry in entries.into_iter().flatten() {
                collect_items(entry, items);
            }
        }
        None => {
            if let Some(item) = into_descriptor(info) {
                items.push(item);
            }
        }
    }
}

fn into_descriptor(raw: RawInfo) -> Option<ItemDescriptor> {
    let id = raw.id.filter(|id| !id.is_empty());
    let url = raw
        .webpage_url
        .or(raw.url)
        .or_else(|| {
            id.as_ref()
                .map(|id| format!("https://www.youtube.com/watch?v={id}"))
        });

    let Some(url) = url else {
        tracing::warn!(title = ?raw.title, "Dropping entry without identifier or URL");
        return None;
    };

    let upload_date = raw.upload_date.as_deref().and_then(|d| {
        NaiveDate::parse_from_str(d, "%Y%m%d")
            .map_err(|e| tracing::debug!(upload_date = %d, error = %e, "Ignoring unparseable upload date"))
            .ok()
    });

    Some(ItemDescriptor {
        id,
        title: raw.title.unwrap_or_default(),
        duration_secs: raw.duration.filter(|d| d.is_finite() && *d >= 0.0),
        upload_date,
        url,
    })
}
