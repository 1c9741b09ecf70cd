//! # media-dl
//!
//! Batch media acquisition library: give it a locator (a single item, a
//! playlist or a channel), and it resolves the items behind it, filters out
//! what has already been acquired or doesn't match your rules, and downloads
//! the rest with bounded parallelism and per-item retries.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Resumable** - A per-destination ledger remembers what was acquired
//! - **Sensible defaults** - Sequential, 3 attempts, best available quality
//! - **Library-first** - The fetch backend is a trait, `yt-dlp` is bundled
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{BatchScheduler, Config, YtDlpService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         destination: "downloads".into(),
//!         max_concurrent: 3,
//!         ..Default::default()
//!     };
//!
//!     let service = Arc::new(YtDlpService::from_config(&config.tools)?);
//!     let scheduler = BatchScheduler::new(config, service)?;
//!
//!     // Subscribe to events
//!     let mut events = scheduler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = scheduler
//!         .run("https://www.youtube.com/playlist?list=PL123")
//!         .await?;
//!     println!("{} acquired, {} failed", report.succeeded(), report.failed());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batch scheduler (resolve, filter, dispatch, report)
pub mod batch;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Media fetch service abstraction and the yt-dlp backend
pub mod fetch;
/// Entry filter
pub mod filter;
/// Persistent dedup ledger
pub mod ledger;
/// Acquisition request builder
pub mod request;
/// Retry logic with linear backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use batch::BatchScheduler;
pub use config::{
    Config, FilterRules, LedgerConfig, NamingPolicy, QualityPolicy, RetryConfig, ToolsConfig,
};
pub use error::{Error, FetchError, LedgerError, ResolutionError, Result};
pub use fetch::{MediaFetchService, YtDlpService};
pub use filter::{DestinationListing, EntryFilter};
pub use ledger::Ledger;
pub use request::{AcquisitionRequest, PostProcessor, RequestBuilder};
pub use retry::RetryExecutor;
pub use types::{
    BatchReport, BatchState, Decision, Event, ItemDescriptor, ItemOutcome, ItemStatus,
    SkipReason, SkippedItem,
};

/// Helper function to run a batch with graceful signal handling.
///
/// Runs the batch; if a termination signal arrives first, cancels the
/// scheduler so no further items are dispatched, then waits for the items
/// already in flight and returns the (partial) report.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{BatchScheduler, Config, YtDlpService, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let service = Arc::new(YtDlpService::from_config(&config.tools)?);
///     let scheduler = BatchScheduler::new(config, service)?;
///
///     let report = run_with_shutdown(&scheduler, "https://www.youtube.com/@channel").await?;
///     if report.cancelled {
///         println!("{} items were not started", report.not_started());
///     }
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(scheduler: &BatchScheduler, locator: &str) -> Result<BatchReport> {
    let run = scheduler.run(locator);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        signal = wait_for_signal() => {
            tracing::info!(signal, "Stopping batch, waiting for in-flight items to finish");
            scheduler.cancel();
        }
    }

    run.await
}

/// Resolve with the name of the first termination signal received
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        },
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "No SIGINT handler, batch stops on SIGTERM only");
            sigterm.recv().await;
            "SIGTERM"
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "No SIGTERM handler, batch stops on SIGINT only");
            sigint.recv().await;
            "SIGINT"
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "No signal handlers, batch stops on Ctrl+C only");
            ctrl_c_or_never().await;
            "Ctrl+C"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c_or_never().await;
    "Ctrl+C"
}

/// Wait for Ctrl+C; if it can't be listened for, never resolve so the batch
/// isn't cancelled spuriously
async fn ctrl_c_or_never() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C, batch runs to completion");
        std::future::pending::<()>().await;
    }
}
