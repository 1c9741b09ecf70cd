//! Per-run batch state

use crate::config::Config;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::types::{BatchState, Event};
use crate::utils::ensure_destination;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// State shared by every worker of one batch run
///
/// Replaces process-wide globals: the configuration, the destination's
/// ledger, the event sender and the cancellation token all travel together.
/// Cloning is cheap.
#[derive(Clone)]
pub(crate) struct BatchContext {
    /// Configuration (shared, read-only)
    pub(crate) config: Arc<Config>,
    /// Ledger of the destination directory
    pub(crate) ledger: Arc<Ledger>,
    /// Event broadcast sender
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Stops dispatch of new items
    pub(crate) cancel_token: CancellationToken,
}

impl BatchContext {
    /// Create the destination directory and open its ledger
    pub(crate) async fn prepare(
        config: Arc<Config>,
        event_tx: broadcast::Sender<Event>,
        cancel_token: CancellationToken,
    ) -> Result<Self> {
        ensure_destination(&config.destination).await?;
        let ledger = Ledger::open(config.ledger_path()).await;

        Ok(Self {
            config,
            ledger: Arc::new(ledger),
            event_tx,
            cancel_token,
        })
    }

    /// Emit an event (ignored if there are no subscribers)
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Emit a state transition
    pub(crate) fn set_state(&self, state: BatchState) {
        tracing::debug!(state = ?state, "Batch state changed");
        self.emit(Event::StateChanged { state });
    }
}
