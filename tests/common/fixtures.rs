//! Test fixtures: a fake fetch service that writes files like yt-dlp would

use async_trait::async_trait;
use media_dl::{
    AcquisitionRequest, Config, FetchError, ItemDescriptor, MediaFetchService, ResolutionError,
    RetryConfig,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Fake service backed by a fixed catalogue of collections
///
/// Downloads write an empty file named from the request's output template,
/// so name-collision checks see the same files a real run would produce.
#[derive(Default)]
pub struct FakeService {
    collections: HashMap<String, Vec<ItemDescriptor>>,
    broken_urls: Vec<String>,
    requests: Mutex<Vec<AcquisitionRequest>>,
}

impl FakeService {
    /// Create an empty catalogue
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the items behind `locator`
    pub fn with_collection(mut self, locator: &str, items: Vec<ItemDescriptor>) -> Self {
        self.collections.insert(locator.to_string(), items);
        self
    }

    /// Make every download of `url` fail
    pub fn with_broken(mut self, url: &str) -> Self {
        self.broken_urls.push(url.to_string());
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<AcquisitionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn title_for(&self, url: &str) -> String {
        self.collections
            .values()
            .flatten()
            .find(|item| item.url == url)
            .map(|item| item.title.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MediaFetchService for FakeService {
    async fn resolve(&self, locator: &str) -> Result<Vec<ItemDescriptor>, ResolutionError> {
        self.collections
            .get(locator)
            .cloned()
            .ok_or_else(|| ResolutionError::InvalidLocator {
                locator: locator.to_string(),
                reason: "unknown collection".to_string(),
            })
    }

    async fn download(&self, request: &AcquisitionRequest) -> Result<(), FetchError> {
        self.requests.lock().unwrap().push(request.clone());

        if self.broken_urls.contains(&request.url) {
            return Err(FetchError::Other("HTTP Error 403: Forbidden".to_string()));
        }

        let ext = if request.post_processors.is_empty() {
            "mp4"
        } else {
            "mp3"
        };
        let file_name = render_template(
            &request.output_template,
            &self.title_for(&request.url),
            request.item_id.as_deref().unwrap_or("NA"),
            ext,
        );
        tokio::fs::write(&file_name, b"").await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Expand the output template placeholders the bundled naming policies use
pub fn render_template(template: &Path, title: &str, id: &str, ext: &str) -> PathBuf {
    let rendered = template
        .to_string_lossy()
        .replace("%(title)s", title)
        .replace("%(id)s", id)
        .replace("%(ext)s", ext);
    PathBuf::from(rendered)
}

/// Descriptor with a realistic 11-character identifier
pub fn video(id: &str, title: &str, duration_secs: u32) -> ItemDescriptor {
    ItemDescriptor::new(id, format!("https://www.youtube.com/watch?v={id}"))
        .with_title(title)
        .with_duration(duration_secs)
}

/// Configuration writing into `dir` with instant retries
pub fn config_for(dir: &Path) -> Config {
    Config {
        destination: dir.to_path_buf(),
        retry: RetryConfig {
            max_attempts: 2,
            backoff_base: Duration::ZERO,
            jitter: false,
        },
        ..Default::default()
    }
}
