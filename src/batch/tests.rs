use super::*;
use crate::config::{FilterRules, RetryConfig};
use crate::error::{Error, FetchError, ResolutionError};
use crate::ledger::Ledger;
use crate::request::AcquisitionRequest;
use crate::types::{ItemDescriptor, SkipReason};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Fetch service that replays a fixed script instead of touching the network
#[derive(Default)]
struct ScriptedService {
    items: Vec<ItemDescriptor>,
    resolve_error: Option<String>,
    /// url -> number of leading download calls that fail
    failures: HashMap<String, u32>,
    delay: Duration,
    cancel_on_download: Option<CancellationToken>,
    calls: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedService {
    fn new(items: Vec<ItemDescriptor>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    fn unresolvable(reason: &str) -> Self {
        Self {
            resolve_error: Some(reason.to_string()),
            ..Default::default()
        }
    }

    fn failing(mut self, url: &str, times: u32) -> Self {
        self.failures.insert(url.to_string(), times);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_download = Some(token);
        self
    }

    fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl MediaFetchService for ScriptedService {
    async fn resolve(&self, locator: &str) -> std::result::Result<Vec<ItemDescriptor>, ResolutionError> {
        if let Some(reason) = &self.resolve_error {
            return Err(ResolutionError::InvalidLocator {
                locator: locator.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self.items.clone())
    }

    async fn download(&self, request: &AcquisitionRequest) -> std::result::Result<(), FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(request.url.clone()).or_default();
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(token) = &self.cancel_on_download {
            token.cancel();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.failures.get(&request.url) {
            Some(&failing) if call <= failing => {
                Err(FetchError::Other(format!("scripted failure {call}")))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn item(id: &str) -> ItemDescriptor {
    ItemDescriptor::new(id, format!("https://media.test/{id}")).with_title(format!("Title {id}"))
}

fn test_config(dir: &Path) -> Config {
    Config {
        destination: dir.to_path_buf(),
        retry: RetryConfig {
            max_attempts: 3,
            backoff_base: Duration::ZERO,
            jitter: false,
        },
        ..Default::default()
    }
}

fn scheduler(config: Config, service: &Arc<ScriptedService>) -> BatchScheduler {
    BatchScheduler::new(config, service.clone()).unwrap()
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn states(events: &[Event]) -> Vec<BatchState> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StateChanged { state } => Some(*state),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn duration_and_ledger_filtering_scenario() {
    let temp = TempDir::new().unwrap();
    Ledger::open(temp.path().join("downloaded_ids.json"))
        .await
        .record("clip_c")
        .await
        .unwrap();

    let service = Arc::new(ScriptedService::new(vec![
        item("clip_a").with_duration(50),
        item("clip_b").with_duration(200),
        item("clip_c").with_duration(80),
    ]));
    let mut config = test_config(temp.path());
    config.filters = FilterRules {
        max_duration_secs: Some(100),
        ..Default::default()
    };

    let report = scheduler(config, &service)
        .run("https://media.test/list")
        .await
        .unwrap();

    assert_eq!(report.resolved, 3);
    assert_eq!(report.kept, 1);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.outcomes[0].id.as_deref(), Some("clip_a"));

    let reasons: HashMap<_, _> = report
        .skipped
        .iter()
        .map(|s| (s.id.clone().unwrap(), s.reason))
        .collect();
    assert_eq!(reasons["clip_b"], SkipReason::DurationOutOfRange);
    assert_eq!(reasons["clip_c"], SkipReason::AlreadyRecorded);

    assert_eq!(service.calls("https://media.test/clip_a"), 1);
    assert_eq!(service.total_calls(), 1);

    let ledger = Ledger::open(temp.path().join("downloaded_ids.json")).await;
    assert!(ledger.contains("clip_a").await);
    assert!(ledger.contains("clip_c").await);
    assert!(!ledger.contains("clip_b").await);
}

#[tokio::test]
async fn second_run_skips_everything_recorded() {
    let temp = TempDir::new().unwrap();
    let service = Arc::new(ScriptedService::new(vec![item("x"), item("y")]));

    let first = scheduler(test_config(temp.path()), &service)
        .run("https://media.test/list")
        .await
        .unwrap();
    assert_eq!(first.succeeded(), 2);

    let second = scheduler(test_config(temp.path()), &service)
        .run("https://media.test/list")
        .await
        .unwrap();
    assert_eq!(second.kept, 0);
    assert!(second.outcomes.is_empty());
    assert!(
        second
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::AlreadyRecorded)
    );
    assert_eq!(service.total_calls(), 2);
}

#[tokio::test]
async fn recording_disabled_still_records_but_does_not_skip() {
    let temp = TempDir::new().unwrap();
    let service = Arc::new(ScriptedService::new(vec![item("x")]));

    scheduler(test_config(temp.path()), &service)
        .run("https://media.test/x")
        .await
        .unwrap();

    let mut config = test_config(temp.path());
    config.filters.skip_recorded = false;
    let report = scheduler(config, &service)
        .run("https://media.test/x")
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(service.calls("https://media.test/x"), 2);
}

#[tokio::test]
async fn existing_file_is_skipped() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("Title f1 [f1].mp4"), b"").unwrap();
    let service = Arc::new(ScriptedService::new(vec![item("f1"), item("f2")]));

    let report = scheduler(test_config(temp.path()), &service)
        .run("https://media.test/list")
        .await
        .unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::FileExists);
    assert_eq!(report.skipped[0].id.as_deref(), Some("f1"));
    assert_eq!(service.calls("https://media.test/f1"), 0);
    assert_eq!(service.calls("https://media.test/f2"), 1);
}

#[tokio::test]
async fn resolution_failure_aborts_batch() {
    let temp = TempDir::new().unwrap();
    let service = Arc::new(ScriptedService::unresolvable("unsupported"));
    let scheduler = scheduler(test_config(temp.path()), &service);
    let mut rx = scheduler.subscribe();

    let result = scheduler.run("ftp://nowhere").await;

    assert!(matches!(result, Err(Error::Resolution(_))));
    assert_eq!(service.total_calls(), 0);

    let events = drain(&mut rx);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::ResolutionFailed { .. }))
    );
    assert_eq!(states(&events), vec![BatchState::Resolving, BatchState::Failed]);
    assert!(!events.iter().any(|e| matches!(e, Event::Finished { .. })));
}

#[tokio::test]
async fn failing_item_does_not_abort_siblings() {
    let temp = TempDir::new().unwrap();
    let service = Arc::new(
        ScriptedService::new(vec![item("ok1"), item("bad"), item("ok2")])
            .failing("https://media.test/bad", u32::MAX),
    );
    let mut config = test_config(temp.path());
    config.retry.max_attempts = 2;

    let report = scheduler(config, &service)
        .run("https://media.test/list")
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    let (failed, error) = report.failures().next().unwrap();
    assert_eq!(failed.id.as_deref(), Some("bad"));
    assert_eq!(failed.attempts, 2);
    assert!(error.contains("scripted failure 2"));
    assert_eq!(service.calls("https://media.test/bad"), 2);

    let ledger = Ledger::open(temp.path().join("downloaded_ids.json")).await;
    assert!(ledger.contains("ok1").await);
    assert!(ledger.contains("ok2").await);
    assert!(!ledger.contains("bad").await);
}

#[tokio::test]
async fn flaky_item_emits_attempt_failed_then_completes() {
    let temp = TempDir::new().unwrap();
    let service = Arc::new(
        ScriptedService::new(vec![item("flaky")]).failing("https://media.test/flaky", 1),
    );
    let scheduler = scheduler(test_config(temp.path()), &service);
    let mut rx = scheduler.subscribe();

    let report = scheduler.run("https://media.test/flaky").await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcomes[0].is_success());
    assert_eq!(report.outcomes[0].attempts, 2);

    let events = drain(&mut rx);
    let retries: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::AttemptFailed {
                attempt,
                max_attempts,
                ..
            } => Some((*attempt, *max_attempts)),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![(1, 3)]);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::Completed { id: Some(id), .. } if id == "flaky"))
    );
}

#[tokio::test]
async fn item_without_id_is_acquired_but_not_recorded() {
    let temp = TempDir::new().unwrap();
    let mut anonymous = item("anon");
    anonymous.id = None;
    let service = Arc::new(ScriptedService::new(vec![anonymous]));

    let report = scheduler(test_config(temp.path()), &service)
        .run("https://media.test/list")
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    let ledger = Ledger::open(temp.path().join("downloaded_ids.json")).await;
    assert!(ledger.is_empty().await);
}

#[tokio::test]
async fn events_follow_state_machine() {
    let temp = TempDir::new().unwrap();
    let service = Arc::new(ScriptedService::new(vec![item("e1")]));
    let scheduler = scheduler(test_config(temp.path()), &service);
    let mut rx = scheduler.subscribe();

    scheduler.run("https://media.test/e1").await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(
        states(&events),
        vec![
            BatchState::Resolving,
            BatchState::Filtering,
            BatchState::Dispatching,
            BatchState::Reporting,
            BatchState::Complete,
        ]
    );
    assert!(matches!(events[1], Event::Resolved { count: 1 }));

    let position = |pred: fn(&Event) -> bool| events.iter().position(pred).unwrap();
    let queued = position(|e| matches!(e, Event::Queued { .. }));
    let started = position(|e| matches!(e, Event::Started { .. }));
    let completed = position(|e| matches!(e, Event::Completed { .. }));
    let finished = position(|e| matches!(e, Event::Finished { .. }));
    assert!(queued < started && started < completed && completed < finished);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_is_bounded() {
    for limit in [1usize, 2, 3] {
        let temp = TempDir::new().unwrap();
        let items = (0..6).map(|i| item(&format!("c{i}"))).collect();
        let service =
            Arc::new(ScriptedService::new(items).with_delay(Duration::from_millis(50)));
        let mut config = test_config(temp.path());
        config.max_concurrent = limit;

        let report = scheduler(config, &service)
            .run("https://media.test/list")
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 6);
        assert_eq!(service.max_in_flight.load(Ordering::SeqCst), limit);

        let ledger = Ledger::open(temp.path().join("downloaded_ids.json")).await;
        assert_eq!(ledger.len().await, 6);
    }
}

#[tokio::test]
async fn cancellation_leaves_remaining_items_unstarted() {
    let temp = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let service = Arc::new(
        ScriptedService::new(vec![item("k1"), item("k2"), item("k3")])
            .cancelling(token.clone()),
    );

    let report = scheduler(test_config(temp.path()), &service)
        .with_cancellation(token)
        .run("https://media.test/list")
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.not_started(), 2);
    assert_eq!(service.total_calls(), 1);
}

#[tokio::test]
async fn cancelled_before_run_dispatches_nothing() {
    let temp = TempDir::new().unwrap();
    let service = Arc::new(ScriptedService::new(vec![item("p1"), item("p2")]));
    let scheduler = scheduler(test_config(temp.path()), &service);
    scheduler.cancel();

    let report = scheduler.run("https://media.test/list").await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.not_started(), 2);
    assert_eq!(service.total_calls(), 0);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let service = Arc::new(ScriptedService::new(Vec::new()));
    let mut config = test_config(temp.path());
    config.max_concurrent = 0;

    let result = BatchScheduler::new(config, service);
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[tokio::test]
async fn destination_is_created() {
    let temp = TempDir::new().unwrap();
    let destination = temp.path().join("nested").join("media");
    let service = Arc::new(ScriptedService::new(vec![item("d1")]));

    scheduler(test_config(&destination), &service)
        .run("https://media.test/d1")
        .await
        .unwrap();

    assert!(destination.is_dir());
    assert!(destination.join("downloaded_ids.json").is_file());
}

#[tokio::test]
async fn event_stream_yields_events() {
    let temp = TempDir::new().unwrap();
    let service = Arc::new(ScriptedService::new(vec![item("s1")]));
    let scheduler = scheduler(test_config(temp.path()), &service);
    let stream = scheduler.events();

    scheduler.run("https://media.test/s1").await.unwrap();
    drop(scheduler);

    let events: Vec<Event> = stream.collect().await;
    assert!(matches!(
        events.last(),
        Some(Event::StateChanged {
            state: BatchState::Complete
        })
    ));
}
