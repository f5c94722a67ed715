//! Periodic refresh of the citation feed.
//!
//! A cycle fetches every officer's latest citation and the daily totals
//! concurrently, then aggregates and selects markers. A cycle is all or
//! nothing: if any read fails, nothing from it reaches the view. Cycles run
//! one at a time inside a single task, so they never overlap.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{FailurePolicy, FeedConfig};
use crate::error::FeedError;
use crate::feed::aggregate;
use crate::location::CoordinateTable;
use crate::models::{CitationRecord, FeedSnapshot};
use crate::recency::select_active;
use crate::source::{CitationSource, Clock, SystemClock};

pub async fn run_cycle(
    source: &dyn CitationSource,
    config: &FeedConfig,
    table: &CoordinateTable,
    clock: &dyn Clock,
) -> Result<FeedSnapshot, FeedError> {
    let window = config.recency_window()?;
    log::debug!(
        "Refreshing citation feed for {} officers",
        config.officer_prefixes.len()
    );

    let lookups = try_join_all(
        config
            .officer_prefixes
            .iter()
            .map(|prefix| source.latest_citation(prefix)),
    );
    let (citations, totals) = tokio::try_join!(lookups, source.daily_totals())?;
    let citations: Vec<CitationRecord> = citations.into_iter().flatten().collect();

    let now = clock.now();
    let entries = aggregate(&citations, &totals, config, table, now);
    let markers = select_active(&entries, now, window);
    log::debug!(
        "Refresh produced {} entries and {} active markers",
        entries.len(),
        markers.len()
    );

    Ok(FeedSnapshot {
        entries,
        markers,
        computed_at: now,
    })
}

/// What the view should display. Replaced wholesale after every cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub snapshot: Option<Arc<FeedSnapshot>>,
    pub error: Option<String>,
    pub generation: u64,
}

impl ViewState {
    pub fn apply(&self, outcome: Result<FeedSnapshot, FeedError>, policy: FailurePolicy) -> Self {
        let generation = self.generation + 1;
        match outcome {
            Ok(snapshot) => Self {
                snapshot: Some(Arc::new(snapshot)),
                error: None,
                generation,
            },
            Err(e) => Self {
                snapshot: match policy {
                    FailurePolicy::Retain => self.snapshot.clone(),
                    FailurePolicy::Clear => None,
                },
                error: Some(e.to_string()),
                generation,
            },
        }
    }
}

pub struct RefreshScheduler {
    source: Arc<dyn CitationSource>,
    config: FeedConfig,
    table: CoordinateTable,
    clock: Arc<dyn Clock>,
}

impl RefreshScheduler {
    pub fn new(source: Arc<dyn CitationSource>, config: FeedConfig) -> Result<Self, FeedError> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            table: CoordinateTable::default(),
            clock: Arc::new(SystemClock),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: CoordinateTable) -> Self {
        self.table = table;
        self
    }

    /// Starts the refresh task. The first cycle runs immediately.
    pub fn spawn(self) -> RefreshHandle {
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(Arc::new(ViewState::default()));

        let task = tokio::spawn(self.run(refresh_rx, shutdown_rx, state_tx));

        RefreshHandle {
            refresh_tx,
            shutdown_tx: Some(shutdown_tx),
            state_rx,
            task,
        }
    }

    async fn run(
        self,
        mut refresh_rx: mpsc::Receiver<()>,
        mut shutdown_rx: oneshot::Receiver<()>,
        state_tx: watch::Sender<Arc<ViewState>>,
    ) {
        let mut interval = tokio::time::interval(self.config.refresh_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                _ = interval.tick() => {}
                Some(()) = refresh_rx.recv() => interval.reset(),
            }

            let cycle = run_cycle(
                self.source.as_ref(),
                &self.config,
                &self.table,
                self.clock.as_ref(),
            );
            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                outcome = cycle => outcome,
            };

            if let Err(e) = &outcome {
                log::error!("Citation feed refresh failed: {e}");
            }
            let next = state_tx.borrow().apply(outcome, self.config.failure_policy);
            state_tx.send_replace(Arc::new(next));
        }

        log::info!("Citation feed scheduler stopped");
    }
}

pub struct RefreshHandle {
    refresh_tx: mpsc::Sender<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    state_rx: watch::Receiver<Arc<ViewState>>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Requests a cycle now. Requests made while one is pending are merged.
    pub fn refresh(&self) {
        let _ = self.refresh_tx.try_send(());
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewState>> {
        self.state_rx.clone()
    }

    pub fn current(&self) -> Arc<ViewState> {
        self.state_rx.borrow().clone()
    }

    /// Stops the task, abandoning any fetch still in flight.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            log::error!("Citation feed scheduler task failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyTotal;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 23, 22, 5, 0).unwrap()
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[derive(Default)]
    struct FakeSource {
        citations: Mutex<HashMap<String, CitationRecord>>,
        totals: Mutex<Vec<DailyTotal>>,
        failing_prefix: Mutex<Option<String>>,
        totals_down: AtomicBool,
        hang: AtomicBool,
    }

    impl FakeSource {
        fn add_citation(&self, prefix: &str, minutes_ago: i64, location: &str) {
            self.citations.lock().unwrap().insert(
                prefix.to_string(),
                CitationRecord {
                    officer_prefix: prefix.to_string(),
                    citation_timestamp: (now() - Duration::minutes(minutes_ago))
                        .to_rfc3339_opts(SecondsFormat::Secs, true),
                    location_descriptor: location.to_string(),
                },
            );
        }
    }

    #[async_trait]
    impl CitationSource for FakeSource {
        async fn latest_citation(&self, prefix: &str) -> Result<Option<CitationRecord>, FeedError> {
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.failing_prefix.lock().unwrap().as_deref() == Some(prefix) {
                return Err(FeedError::query(format!("latest_citation({prefix})"), "boom"));
            }
            Ok(self.citations.lock().unwrap().get(prefix).cloned())
        }

        async fn daily_totals(&self) -> Result<Vec<DailyTotal>, FeedError> {
            if self.totals_down.load(Ordering::SeqCst) {
                return Err(FeedError::Connection("refused".to_string()));
            }
            Ok(self.totals.lock().unwrap().clone())
        }
    }

    /// Holds every cycle at `daily_totals` until a permit is released.
    struct GatedSource {
        gate: tokio::sync::Semaphore,
        cycles: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl GatedSource {
        fn closed() -> Self {
            Self {
                gate: tokio::sync::Semaphore::new(0),
                cycles: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CitationSource for GatedSource {
        async fn latest_citation(&self, _prefix: &str) -> Result<Option<CitationRecord>, FeedError> {
            Ok(None)
        }

        async fn daily_totals(&self) -> Result<Vec<DailyTotal>, FeedError> {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(active, Ordering::SeqCst);

            self.gate.acquire().await.unwrap().forget();

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn slow_config() -> FeedConfig {
        FeedConfig {
            refresh_interval_ms: 3_600_000,
            ..FeedConfig::default()
        }
    }

    async fn wait_for_generation(
        rx: &mut watch::Receiver<Arc<ViewState>>,
        generation: u64,
    ) -> Arc<ViewState> {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let state = rx.borrow_and_update().clone();
                if state.generation >= generation {
                    return state;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("scheduler did not publish in time")
    }

    #[tokio::test]
    async fn cycle_builds_feed_and_markers() {
        let source = FakeSource::default();
        source.add_citation("11", 5, "LOT3: east of book store");
        source.add_citation("73", 45, "PG1: gold garage");
        source.totals.lock().unwrap().push(DailyTotal {
            officer_prefix: "73".to_string(),
            total_amount: 110.0,
        });

        let snapshot = run_cycle(
            &source,
            &FeedConfig::default(),
            &CoordinateTable::default(),
            &FixedClock(now()),
        )
        .await
        .unwrap();

        let order: Vec<_> = snapshot.entries.iter().map(|e| e.officer_prefix.as_str()).collect();
        assert_eq!(order, vec!["11", "73", "04"]);
        assert_eq!(snapshot.entries[1].today_total, 110.0);
        assert_eq!(snapshot.markers.len(), 1);
        assert_eq!(snapshot.markers[0].officer_prefix, "11");
        assert_eq!(snapshot.computed_at, now());
    }

    #[tokio::test]
    async fn one_failed_prefix_fails_the_whole_cycle() {
        let source = FakeSource::default();
        source.add_citation("11", 5, "PG1: gold garage");
        *source.failing_prefix.lock().unwrap() = Some("04".to_string());

        let result = run_cycle(
            &source,
            &FeedConfig::default(),
            &CoordinateTable::default(),
            &FixedClock(now()),
        )
        .await;
        assert!(matches!(result, Err(FeedError::Query { .. })));
    }

    #[tokio::test]
    async fn failed_cycle_retains_previous_feed() {
        let source = FakeSource::default();
        source.add_citation("11", 5, "PG1: gold garage");
        let config = FeedConfig::default();
        let table = CoordinateTable::default();
        let clock = FixedClock(now());

        let first = ViewState::default().apply(
            run_cycle(&source, &config, &table, &clock).await,
            FailurePolicy::Retain,
        );
        source.totals_down.store(true, Ordering::SeqCst);
        let second = first.apply(
            run_cycle(&source, &config, &table, &clock).await,
            FailurePolicy::Retain,
        );

        assert_eq!(second.snapshot, first.snapshot);
        assert!(second.error.as_deref().unwrap().contains("refused"));
        assert_eq!(second.generation, 2);
    }

    #[test]
    fn clear_policy_drops_feed_on_failure() {
        let good = ViewState::default().apply(
            Ok(FeedSnapshot {
                entries: Vec::new(),
                markers: Vec::new(),
                computed_at: now(),
            }),
            FailurePolicy::Clear,
        );
        assert!(good.snapshot.is_some());

        let failed = good.apply(
            Err(FeedError::Connection("down".to_string())),
            FailurePolicy::Clear,
        );
        assert!(failed.snapshot.is_none());
        assert!(failed.error.is_some());
    }

    #[tokio::test]
    async fn scheduler_publishes_then_keeps_last_good_feed() {
        let source = Arc::new(FakeSource::default());
        source.add_citation("73", 3, "PG2: blue garage");

        let handle = RefreshScheduler::new(source.clone(), slow_config())
            .unwrap()
            .with_clock(Arc::new(FixedClock(now())))
            .spawn();
        let mut rx = handle.subscribe();

        let first = wait_for_generation(&mut rx, 1).await;
        assert!(first.error.is_none());
        assert_eq!(first.snapshot.as_ref().unwrap().markers.len(), 1);

        source.totals_down.store(true, Ordering::SeqCst);
        handle.refresh();
        let second = wait_for_generation(&mut rx, 2).await;
        assert!(second.error.is_some());
        assert_eq!(second.snapshot, first.snapshot);

        source.totals_down.store(false, Ordering::SeqCst);
        handle.refresh();
        let third = wait_for_generation(&mut rx, 3).await;
        assert!(third.error.is_none());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_abandons_in_flight_cycle() {
        let source = Arc::new(FakeSource::default());
        source.hang.store(true, Ordering::SeqCst);

        let handle = RefreshScheduler::new(source, slow_config())
            .unwrap()
            .spawn();
        tokio::task::yield_now().await;

        let before = handle.current();
        let rx = handle.subscribe();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown should not wait for the hung fetch");

        assert_eq!(*rx.borrow().clone(), *before);
        assert_eq!(rx.borrow().generation, 0);
    }

    #[tokio::test]
    async fn refreshes_during_a_cycle_coalesce_into_one() {
        let source = Arc::new(GatedSource::closed());
        let handle = RefreshScheduler::new(source.clone(), slow_config())
            .unwrap()
            .with_clock(Arc::new(FixedClock(now())))
            .spawn();
        let mut rx = handle.subscribe();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while source.cycles.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("first cycle never started");

        for _ in 0..5 {
            handle.refresh();
        }
        source.gate.add_permits(10);

        let state = wait_for_generation(&mut rx, 2).await;
        assert_eq!(state.generation, 2);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(source.cycles.load(Ordering::SeqCst), 2);
        assert_eq!(handle.current().generation, 2);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);

        handle.shutdown().await;
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = FeedConfig {
            officer_prefixes: Vec::new(),
            ..FeedConfig::default()
        };
        assert!(RefreshScheduler::new(Arc::new(FakeSource::default()), config).is_err());
    }
}
