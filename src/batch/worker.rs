//! Processing of a single kept item

use super::BatchContext;
use crate::request::RequestBuilder;
use crate::retry::RetryExecutor;
use crate::types::{Event, ItemDescriptor, ItemOutcome, ItemStatus};
use tracing::{error, info, warn};

/// Build, download with retries and record one item
pub(crate) async fn process_item(
    ctx: &BatchContext,
    builder: &RequestBuilder,
    executor: &RetryExecutor,
    item: ItemDescriptor,
) -> ItemOutcome {
    if ctx.cancel_token.is_cancelled() {
        return not_started(&item);
    }

    ctx.emit(Event::Started {
        id: item.id.clone(),
    });
    info!(item = %item.label(), url = %item.url, "Starting acquisition");

    let request = builder.build(&item);
    let outcome = executor
        .attempt_with(&request, &item.title, |notice| {
            ctx.emit(Event::AttemptFailed {
                id: item.id.clone(),
                attempt: notice.attempt,
                max_attempts: notice.max_attempts,
                error: notice.error.to_string(),
                retry_in_ms: notice.delay.as_millis() as u64,
            });
        })
        .await;

    match &outcome.status {
        ItemStatus::Succeeded => {
            // Items without an identifier can't be deduplicated later
            if let Some(id) = item.id.as_deref() {
                if let Err(e) = ctx.ledger.record(id).await {
                    error!(item_id = %id, error = %e, "Failed to record item in ledger");
                    ctx.emit(Event::LedgerWriteFailed {
                        id: id.to_string(),
                        error: e.to_string(),
                    });
                }
            } else {
                warn!(item = %item.label(), "Item has no identifier, not recording in ledger");
            }
            info!(item = %item.label(), attempts = outcome.attempts, "Acquired item");
            ctx.emit(Event::Completed {
                id: item.id.clone(),
                title: item.title.clone(),
            });
        }
        ItemStatus::Failed { error } => {
            warn!(item = %item.label(), attempts = outcome.attempts, error = %error, "Giving up on item");
            ctx.emit(Event::Failed {
                id: item.id.clone(),
                title: item.title.clone(),
                error: error.clone(),
            });
        }
        ItemStatus::NotStarted => {}
    }

    outcome
}

/// Outcome for an item that cancellation kept from starting
fn not_started(item: &ItemDescriptor) -> ItemOutcome {
    ItemOutcome {
        id: item.id.clone(),
        title: item.title.clone(),
        status: ItemStatus::NotStarted,
        attempts: 0,
    }
}
