//! Acquisition request builder
//!
//! Turns the batch's quality, naming and conversion settings into a concrete
//! [`AcquisitionRequest`] for one item.

use crate::config::{AUDIO_ONLY_SELECTOR, Config, NamingPolicy, QualityPolicy};
use crate::types::ItemDescriptor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Audio codec used when conversion is requested
pub const CONVERTED_AUDIO_CODEC: &str = "mp3";

/// Bitrate used when conversion is requested
pub const CONVERTED_AUDIO_BITRATE_KBPS: u32 = 192;

/// Container used when separate video and audio streams must be merged
pub const MERGE_CONTAINER: &str = "mp4";

/// Post-processing step attached to a request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostProcessor {
    /// Extract the audio track and transcode it
    ExtractAudio {
        /// Target codec (e.g. "mp3")
        codec: String,
        /// Target bitrate in kbit/s
        bitrate_kbps: u32,
    },
}

/// Everything the fetch service needs to download one item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    /// Item identifier, if known
    pub item_id: Option<String>,
    /// URL to download
    pub url: String,
    /// Format selector
    pub format: String,
    /// Output path template (destination joined with the naming template)
    pub output_template: PathBuf,
    /// Container to merge separate streams into
    pub merge_output_format: Option<String>,
    /// Steps to run after the download
    pub post_processors: Vec<PostProcessor>,
    /// Destination directory
    pub destination: PathBuf,
}

/// Builds requests from a batch's configuration
#[derive(Clone, Debug)]
pub struct RequestBuilder {
    quality: QualityPolicy,
    naming: NamingPolicy,
    convert_audio: bool,
    destination: PathBuf,
}

impl RequestBuilder {
    /// Create a builder
    pub fn new(
        quality: QualityPolicy,
        naming: NamingPolicy,
        convert_audio: bool,
        destination: impl Into<PathBuf>,
    ) -> Self {
        let convert_audio = convert_audio || matches!(quality, QualityPolicy::AudioMp3);
        Self {
            quality,
            naming,
            convert_audio,
            destination: destination.into(),
        }
    }

    /// Create a builder from the batch configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.quality.clone(),
            config.naming,
            config.convert_audio,
            config.destination.clone(),
        )
    }

    /// Output name template for the naming policy
    pub fn name_template(naming: NamingPolicy) -> &'static str {
        match naming {
            NamingPolicy::EmbedId => "%(title)s [%(id)s].%(ext)s",
            NamingPolicy::PreserveTitle => "%(title)s.%(ext)s",
        }
    }

    /// Build the request for `item`
    pub fn build(&self, item: &ItemDescriptor) -> AcquisitionRequest {
        let output_template = self.destination.join(Self::name_template(self.naming));

        let (format, merge_output_format, post_processors) = if self.convert_audio {
            (
                AUDIO_ONLY_SELECTOR.to_string(),
                None,
                vec![PostProcessor::ExtractAudio {
                    codec: CONVERTED_AUDIO_CODEC.to_string(),
                    bitrate_kbps: CONVERTED_AUDIO_BITRATE_KBPS,
                }],
            )
        } else {
            let selector = self.quality.selector();
            let merge = needs_merge(selector).then(|| MERGE_CONTAINER.to_string());
            (selector.to_string(), merge, Vec::new())
        };

        AcquisitionRequest {
            item_id: item.id.clone(),
            url: item.url.clone(),
            format,
            output_template,
            merge_output_format,
            post_processors,
            destination: self.destination.clone(),
        }
    }
}

/// Whether a selector combines separate video and audio streams
fn needs_merge(selector: &str) -> bool {
    selector.contains("bestvideo") || selector.contains('+')
}
