//! Batch scheduler: resolve, filter, dispatch and report.
//!
//! A batch walks `Resolving -> Filtering -> Dispatching -> Reporting ->
//! Complete`. Resolution is a single call to the fetch service; if it fails
//! the batch is aborted and nothing is retried at this level. Kept items are
//! run through `buffer_unordered` with `max_concurrent` workers, each running
//! the retry executor and recording successes in the ledger.
//!
//! Split into submodules:
//! - `context` - per-run state shared by all workers
//! - `worker` - processing of a single kept item

mod context;
mod worker;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use context::BatchContext;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::MediaFetchService;
use crate::filter::{DestinationListing, EntryFilter};
use crate::request::RequestBuilder;
use crate::retry::RetryExecutor;
use crate::types::{BatchReport, BatchState, Decision, Event, SkippedItem};
use futures::Stream;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs batches against a fetch service
///
/// Cloning is cheap; clones share the event channel and cancellation token.
#[derive(Clone)]
pub struct BatchScheduler {
    config: Arc<Config>,
    service: Arc<dyn MediaFetchService>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl BatchScheduler {
    /// Create a scheduler
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration is invalid.
    pub fn new(config: Config, service: Arc<dyn MediaFetchService>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(config.event_capacity);
        Ok(Self {
            config: Arc::new(config),
            service,
            event_tx,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// The configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to batch events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Batch events as a stream
    ///
    /// Events missed because the subscriber lagged behind are dropped.
    pub fn events(&self) -> impl Stream<Item = Event> + Send + 'static {
        BroadcastStream::new(self.event_tx.subscribe()).filter_map(|event| async move { event.ok() })
    }

    /// Token that stops dispatching new items when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop dispatching new items
    ///
    /// Items already in flight run to completion. The token stays cancelled,
    /// so later runs on this scheduler dispatch nothing.
    pub fn cancel(&self) {
        info!("Cancellation requested, no new items will be dispatched");
        self.cancel_token.cancel();
    }

    /// Acquire everything behind `locator`
    ///
    /// # Errors
    ///
    /// Fails only if the destination cannot be created or the locator cannot
    /// be resolved. Individual item failures are reported in the returned
    /// [`BatchReport`].
    pub async fn run(&self, locator: &str) -> Result<BatchReport> {
        let ctx = BatchContext::prepare(
            Arc::clone(&self.config),
            self.event_tx.clone(),
            self.cancel_token.clone(),
        )
        .await?;

        ctx.set_state(BatchState::Resolving);
        let items = match self.service.resolve(locator).await {
            Ok(items) => items,
            Err(e) => {
                error!(locator = %locator, error = %e, "Failed to resolve locator");
                ctx.emit(Event::ResolutionFailed {
                    error: e.to_string(),
                });
                ctx.set_state(BatchState::Failed);
                return Err(e.into());
            }
        };
        info!(count = items.len(), service = self.service.name(), "Resolved locator");
        ctx.emit(Event::Resolved { count: items.len() });

        ctx.set_state(BatchState::Filtering);
        let ledger_snapshot = ctx.ledger.snapshot().await;
        let destination = DestinationListing::scan(&ctx.config.destination).await;
        let filter = EntryFilter::new(ctx.config.filters.clone(), ctx.config.naming);

        let mut report = BatchReport {
            resolved: items.len(),
            ..Default::default()
        };
        let mut kept = Vec::new();
        for item in items {
            match filter.decide(&item, &ledger_snapshot, &destination) {
                Decision::Keep => {
                    ctx.emit(Event::Queued {
                        id: item.id.clone(),
                        title: item.title.clone(),
                    });
                    kept.push(item);
                }
                Decision::Skip(reason) => {
                    info!(item = %item.label(), reason = %reason, "Skipping item");
                    ctx.emit(Event::Skipped {
                        id: item.id.clone(),
                        title: item.title.clone(),
                        reason,
                    });
                    report.skipped.push(SkippedItem {
                        id: item.id,
                        title: item.title,
                        reason,
                    });
                }
            }
        }
        report.kept = kept.len();

        ctx.set_state(BatchState::Dispatching);
        let builder = RequestBuilder::from_config(&ctx.config);
        let executor = RetryExecutor::new(Arc::clone(&self.service), ctx.config.retry.clone());
        report.outcomes = stream::iter(kept)
            .map(|item| worker::process_item(&ctx, &builder, &executor, item))
            .buffer_unordered(ctx.config.max_concurrent)
            .collect()
            .await;
        report.cancelled = ctx.cancel_token.is_cancelled();

        ctx.set_state(BatchState::Reporting);
        info!(
            resolved = report.resolved,
            kept = report.kept,
            skipped = report.skipped.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            not_started = report.not_started(),
            "Batch finished"
        );
        for (outcome, error) in report.failures() {
            warn!(
                item_id = outcome.id.as_deref().unwrap_or("-"),
                title = %outcome.title,
                error = %error,
                "Item failed"
            );
        }

        ctx.emit(Event::Finished {
            report: report.clone(),
        });
        ctx.set_state(BatchState::Complete);
        Ok(report)
    }
}
