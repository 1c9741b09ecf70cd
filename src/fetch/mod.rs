//! Media fetch service abstraction
//!
//! The batch engine never talks to a media origin directly. It resolves
//! locators and downloads items through a [`MediaFetchService`], which makes
//! the engine testable with scripted services and lets callers plug in other
//! backends.
//!
//! [`YtDlpService`] is the bundled implementation, driving an external
//! `yt-dlp` binary.

mod ytdlp;

pub use ytdlp::YtDlpService;

use crate::error::{FetchError, ResolutionError};
use crate::request::AcquisitionRequest;
use crate::types::ItemDescriptor;
use async_trait::async_trait;

/// Trait for the collaborator that enumerates and downloads media
///
/// # Examples
///
/// ```no_run
/// use media_dl::fetch::{MediaFetchService, YtDlpService};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let service = YtDlpService::from_path().expect("yt-dlp not found in PATH");
/// let items = service
///     .resolve("https://www.youtube.com/playlist?list=PL123")
///     .await?;
/// println!("{} items", items.len());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait MediaFetchService: Send + Sync {
    /// Enumerate the items behind `locator`
    ///
    /// A single-item locator yields a one-element list.
    async fn resolve(&self, locator: &str) -> Result<Vec<ItemDescriptor>, ResolutionError>;

    /// Download one item as described by `request`
    ///
    /// May take arbitrarily long; no timeout is imposed by the caller.
    async fn download(&self, request: &AcquisitionRequest) -> Result<(), FetchError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
