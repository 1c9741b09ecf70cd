//! Basic batch example
//!
//! This example demonstrates the core functionality of media-dl:
//! - Configuring a destination, quality and filters
//! - Locating the yt-dlp binary
//! - Subscribing to events
//! - Running a batch with Ctrl+C handling
//!
//! ```bash
//! cargo run --example basic_batch -- "https://www.youtube.com/playlist?list=PL123" downloads 10:00
//! ```

use media_dl::config::{Config, FilterRules, QualityPolicy};
use media_dl::utils::parse_duration;
use media_dl::{BatchScheduler, Event, YtDlpService, run_with_shutdown};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_dl=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(locator) = args.next() else {
        eprintln!("usage: basic_batch <locator> [destination] [max-duration]");
        std::process::exit(2);
    };
    let destination = args.next().unwrap_or_else(|| "downloads_videos".to_string());
    let max_duration_secs = args.next().map(|d| parse_duration(&d)).transpose()?;

    // Build configuration
    let config = Config {
        destination: destination.into(),
        quality: QualityPolicy::BestMp4,
        max_concurrent: 2,
        filters: FilterRules {
            max_duration_secs,
            ..Default::default()
        },
        ..Default::default()
    };

    let service = Arc::new(YtDlpService::from_config(&config.tools)?);
    let scheduler = BatchScheduler::new(config, service)?;

    // Subscribe to events
    let mut events = scheduler.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Resolved { count } => println!("Found {} entries", count),
                Event::Skipped { title, reason, .. } => println!("- Skipped {}: {}", title, reason),
                Event::Started { id } => println!("> Starting {}", id.as_deref().unwrap_or("?")),
                Event::AttemptFailed {
                    attempt,
                    max_attempts,
                    error,
                    retry_in_ms,
                    ..
                } => println!(
                    "! Attempt {}/{} failed: {} (retrying in {} ms)",
                    attempt, max_attempts, error, retry_in_ms
                ),
                Event::Completed { title, .. } => println!("+ Done: {}", title),
                Event::Failed { title, error, .. } => println!("x Failed: {}: {}", title, error),
                _ => {}
            }
        }
    });

    let report = run_with_shutdown(&scheduler, &locator).await?;

    println!();
    println!(
        "{} resolved, {} skipped, {} acquired, {} failed, {} not started",
        report.resolved,
        report.skipped.len(),
        report.succeeded(),
        report.failed(),
        report.not_started()
    );
    for (outcome, error) in report.failures() {
        println!("  {}: {}", outcome.title, error);
    }

    Ok(())
}
