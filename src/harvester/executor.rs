//! Harvest executor: the guarded call and the single worker loop

use chrono::Utc;
use indicatif::ProgressBar;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::config::HarvestConfig;
use super::job::{HarvesterState, Lifecycle, RunSummary};
use super::progress::RunProgress;
use super::rate_limit::{BudgetTracker, EndpointClass};
use super::retry::{CallState, ErrorClass, GiveUpReason, RetryContext, RetryDecision, RetryPolicy};
use super::HarvestError;
use crate::fetcher::{FetcherError, FetcherResult, MatchSource};
use crate::filter::{AcceptAll, CategoryFilter};
use crate::metrics::{self, RequestMetrics};
use crate::output::RecordSink;
use crate::resume::{Counters, Cursor, ProgressSnapshot, ProgressStore, SnapshotOrigin};
use crate::shutdown::{self, SharedShutdown, ShutdownCoordinator};
use crate::{MatchId, UnitRef};

/// Runs one remote call under budget admission, a per-call timeout and the
/// retry policy.
///
/// Every attempt is admitted by the [`BudgetTracker`] first and counted in
/// the caller's [`Counters`]. Only rate-limit waits can be cut short by a
/// stop signal; transient backoffs and in-flight calls always complete.
pub struct CallGuard<'a> {
    budget: &'a mut BudgetTracker,
    policy: RetryPolicy,
    call_timeout: Duration,
    lifecycle: Option<&'a Lifecycle>,
    shutdown: Option<&'a ShutdownCoordinator>,
}

impl<'a> CallGuard<'a> {
    /// Guard drawing admissions from `budget`
    pub fn new(budget: &'a mut BudgetTracker, policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            budget,
            policy,
            call_timeout,
            lifecycle: None,
            shutdown: None,
        }
    }

    /// Publish Paused/Running around rate-limit waits
    pub fn with_lifecycle(mut self, lifecycle: &'a Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Allow a stop signal to abort rate-limit waits
    pub fn with_shutdown(mut self, shutdown: Option<&'a ShutdownCoordinator>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Drive `attempt` to a terminal [`CallState`].
    ///
    /// Returns either `Success` or `GiveUp`.
    pub async fn call<T, F, Fut>(
        &mut self,
        class: EndpointClass,
        operation: &str,
        counters: &mut Counters,
        mut attempt: F,
    ) -> CallState<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetcherResult<T>>,
    {
        let mut ctx = RetryContext::new(operation, self.policy.max_transient_attempts);
        let mut state = CallState::Attempting;
        loop {
            state = match state {
                CallState::Attempting => {
                    let waited = self.budget.acquire(class).await;
                    if !waited.is_zero() {
                        metrics::record_budget_wait(class, waited);
                    }

                    ctx.attempt += 1;
                    counters.record_sent();
                    let call_metrics = RequestMetrics::start(class, operation, ctx.attempt);
                    let result = match tokio::time::timeout(self.call_timeout, attempt()).await {
                        Ok(result) => result,
                        Err(_) => Err(FetcherError::Timeout),
                    };

                    match result {
                        Ok(value) => {
                            counters.record_success();
                            call_metrics.record_success();
                            CallState::Success(value)
                        }
                        Err(err) => {
                            let error_class = err.class();
                            call_metrics.record_failure(error_class);
                            self.on_failure(class, &mut ctx, counters, err)
                        }
                    }
                }
                CallState::Retry(wait) => self.wait_before_retry(wait, &ctx).await,
                terminal => return terminal,
            };
        }
    }

    fn on_failure<T>(
        &mut self,
        class: EndpointClass,
        ctx: &mut RetryContext,
        counters: &mut Counters,
        err: FetcherError,
    ) -> CallState<T> {
        let error_class = err.class();
        let server_wait = match error_class {
            ErrorClass::RateLimited => {
                counters.record_rate_limited();
                self.budget.on_rate_limit_response(class, err.retry_after())
            }
            ErrorClass::Transient | ErrorClass::Fatal => {
                counters.record_error();
                None
            }
        };

        let streak = ctx.record_failure(error_class, err.to_string());
        match self.policy.next_action(error_class, streak, server_wait) {
            RetryDecision::Retry(wait) => {
                ctx.next_delay = wait;
                metrics::record_retry_wait(error_class, wait);
                warn!(
                    class = %class,
                    error_class = error_class.as_str(),
                    wait_ms = wait.as_millis() as u64,
                    "{}",
                    ctx.format_retry()
                );
                CallState::Retry(wait)
            }
            RetryDecision::GiveUp(reason) => {
                warn!(class = %class, "{}", ctx.format_failure(reason));
                CallState::GiveUp(reason)
            }
        }
    }

    async fn wait_before_retry<T>(&mut self, wait: Duration, ctx: &RetryContext) -> CallState<T> {
        if ctx.last_class != Some(ErrorClass::RateLimited) {
            tokio::time::sleep(wait).await;
            return CallState::Attempting;
        }

        if let Some(lifecycle) = self.lifecycle {
            lifecycle.pause();
        }
        let completed = match self.shutdown {
            Some(shutdown) => shutdown.sleep_unless_shutdown(wait).await,
            None => {
                tokio::time::sleep(wait).await;
                true
            }
        };
        if !completed {
            info!("{}", ctx.format_failure(GiveUpReason::Aborted));
            return CallState::GiveUp(GiveUpReason::Aborted);
        }
        if let Some(lifecycle) = self.lifecycle {
            lifecycle.resume();
        }
        CallState::Attempting
    }
}

/// How a batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchOutcome {
    /// `units_per_batch` units processed
    Full,
    /// An empty page was listed: the sweep is over
    SweepComplete,
    /// A page could not be listed; the cursor stays put
    ListingFailed,
    /// Stop signal observed
    Stopped,
}

/// Per-unit tallies
#[derive(Debug, Clone, Copy, Default)]
struct UnitReport {
    appended: usize,
    filtered: usize,
    skipped: usize,
}

enum UnitOutcome {
    Completed(UnitReport),
    /// A stop signal cut a rate-limit wait short; the unit stays unprocessed
    Aborted,
}

/// One harvester instance: a source, a sink, a progress file and a budget.
///
/// All remote calls of an instance are issued sequentially from
/// [`run`](Self::run). Independent instances share nothing and can run
/// side by side on distinct partitions.
pub struct Harvester {
    source: Arc<dyn MatchSource>,
    sink: Box<dyn RecordSink>,
    store: ProgressStore,
    config: HarvestConfig,
    filter: Arc<dyn CategoryFilter>,
    budget: BudgetTracker,
    policy: RetryPolicy,
    lifecycle: Lifecycle,
    shutdown: Option<SharedShutdown>,
    progress_bar: Option<ProgressBar>,
    snapshot: ProgressSnapshot,
    units_since_snapshot: usize,
}

impl Harvester {
    /// Create a harvester.
    ///
    /// # Errors
    /// Returns [`HarvestError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        source: Arc<dyn MatchSource>,
        sink: Box<dyn RecordSink>,
        store: ProgressStore,
        config: HarvestConfig,
    ) -> Result<Self, HarvestError> {
        config.validate().map_err(HarvestError::InvalidConfig)?;
        Ok(Self {
            source,
            sink,
            store,
            config,
            filter: Arc::new(AcceptAll),
            budget: BudgetTracker::for_keys(1),
            policy: RetryPolicy::default(),
            lifecycle: Lifecycle::new(),
            shutdown: shutdown::get_global_shutdown(),
            progress_bar: None,
            snapshot: ProgressSnapshot::new(),
            units_since_snapshot: 0,
        })
    }

    /// Keep only records `filter` wants (default: everything)
    pub fn with_filter(mut self, filter: Arc<dyn CategoryFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Use a specific request budget
    pub fn with_budget(mut self, budget: BudgetTracker) -> Self {
        self.budget = budget;
        self
    }

    /// Override backoff and attempt limits
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Tick `bar` once per processed unit
    pub fn with_progress_bar(mut self, bar: ProgressBar) -> Self {
        self.progress_bar = Some(bar);
        self
    }

    /// Handle for observing state transitions
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> HarvesterState {
        self.lifecycle.current()
    }

    /// In-memory progress (restored by `run`)
    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// The record sink
    pub fn sink(&self) -> &dyn RecordSink {
        self.sink.as_ref()
    }

    /// Tunables in use
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Restore progress, harvest until the sweep ends (or forever in
    /// continuous mode) or a stop signal arrives, then persist and stop.
    ///
    /// # Errors
    /// Storage failures abort the run after a last attempt to persist
    /// progress. Calling `run` on an instance that already ran returns
    /// [`HarvestError::InvalidTransition`].
    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        let span = info_span!(
            "harvest",
            source = %self.source.describe(),
            progress = %self.store.path().display()
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> Result<RunSummary, HarvestError> {
        let current = self.lifecycle.current();
        if current != HarvesterState::Idle {
            return Err(HarvestError::InvalidTransition {
                from: current,
                to: HarvesterState::Running,
            });
        }

        let started = Instant::now();
        let loaded = self.store.load()?;
        if let SnapshotOrigin::Quarantined { moved_to, reason } = &loaded.origin {
            error!(
                quarantined = %moved_to.display(),
                reason = %reason,
                "Starting a new lineage after corrupt progress"
            );
        }
        self.snapshot = loaded.snapshot;
        self.units_since_snapshot = 0;
        info!(
            processed = self.snapshot.processed().len(),
            collected = self.snapshot.collected().len(),
            stored = self.sink.len(),
            cursor = %self.snapshot.cursor(),
            filter = %self.filter.describe(),
            "Harvest starting"
        );

        self.lifecycle.transition(HarvesterState::Running)?;
        let mut summary = RunSummary {
            batches: 0,
            units_processed: 0,
            records_appended: 0,
            records_filtered: 0,
            interrupted: false,
            counters: *self.snapshot.counters(),
            elapsed: Duration::ZERO,
        };

        let result = self.sweep(&mut summary).await;
        self.lifecycle.transition(HarvesterState::Draining)?;

        if let Err(err) = result {
            if let Err(save_err) = self.persist() {
                error!(error = %save_err, "Final snapshot could not be saved");
            }
            self.lifecycle.transition(HarvesterState::Stopped)?;
            error!(error = %err, "Harvest aborted");
            return Err(err);
        }

        self.persist()?;
        self.lifecycle.transition(HarvesterState::Stopped)?;
        if let Some(bar) = &self.progress_bar {
            bar.finish_and_clear();
        }

        summary.counters = *self.snapshot.counters();
        summary.elapsed = started.elapsed();
        info!(
            discovery = %self.snapshot.discovery_counters(),
            "{} [{}]",
            summary.format_summary(),
            summary.counters
        );
        Ok(summary)
    }

    async fn sweep(&mut self, summary: &mut RunSummary) -> Result<(), HarvestError> {
        // Auto-reset only trusts a sweep it watched from the first page
        let mut sweep_from_start = self.snapshot.cursor().is_start();
        let mut sweep_units = 0usize;

        loop {
            summary.batches += 1;
            let span = info_span!("batch", batch = summary.batches);
            let outcome = self
                .run_batch(summary, &mut sweep_units)
                .instrument(span)
                .await?;

            match outcome {
                BatchOutcome::Stopped => {
                    summary.interrupted = true;
                    return Ok(());
                }
                BatchOutcome::SweepComplete => {
                    if self.config.continuous && sweep_from_start && sweep_units == 0 {
                        info!("Full sweep found no unit to process, clearing processed units");
                        self.snapshot.reset_progress();
                    } else {
                        info!(units = sweep_units, "Sweep complete");
                        self.snapshot.set_cursor(Cursor::start());
                    }
                    self.persist()?;
                    sweep_from_start = true;
                    sweep_units = 0;
                }
                BatchOutcome::Full | BatchOutcome::ListingFailed => {}
            }

            if !self.config.continuous {
                return Ok(());
            }
            if self.stop_requested() {
                summary.interrupted = true;
                return Ok(());
            }

            debug!(pause_ms = self.config.batch_pause.as_millis() as u64, "Pausing between batches");
            let completed = match &self.shutdown {
                Some(shutdown) => shutdown.sleep_unless_shutdown(self.config.batch_pause).await,
                None => {
                    tokio::time::sleep(self.config.batch_pause).await;
                    true
                }
            };
            if !completed {
                summary.interrupted = true;
                return Ok(());
            }
        }
    }

    async fn run_batch(
        &mut self,
        summary: &mut RunSummary,
        sweep_units: &mut usize,
    ) -> Result<BatchOutcome, HarvestError> {
        let mut processed = 0usize;
        let mut progress = RunProgress::new(self.config.units_per_batch as u64);

        loop {
            if self.stop_requested() {
                return Ok(BatchOutcome::Stopped);
            }

            let cursor = self.snapshot.cursor();
            progress.set_phase(Some(format!("page {}", cursor.page)));
            let units = match self.list_page(cursor.page).await {
                CallState::Success(units) => units,
                CallState::GiveUp(GiveUpReason::Aborted) => return Ok(BatchOutcome::Stopped),
                CallState::GiveUp(GiveUpReason::Fatal) => {
                    warn!(page = cursor.page, "Skipping discovery page after fatal error");
                    self.snapshot.set_cursor(cursor.next_page());
                    continue;
                }
                _ => {
                    warn!(page = cursor.page, "Discovery page unavailable, ending batch");
                    return Ok(BatchOutcome::ListingFailed);
                }
            };

            if units.is_empty() {
                return Ok(BatchOutcome::SweepComplete);
            }
            debug!(page = cursor.page, units = units.len(), from = cursor.unit_index, "Discovery page listed");

            for (index, unit) in units.iter().enumerate().skip(cursor.unit_index) {
                if self.stop_requested() {
                    return Ok(BatchOutcome::Stopped);
                }
                if processed >= self.config.units_per_batch {
                    return Ok(BatchOutcome::Full);
                }

                let key = unit.key().unwrap_or_else(|| {
                    warn!(page = cursor.page, index, "Discovery unit carries no identifier");
                    format!("anonymous:{}:{index}", cursor.page)
                });
                if self
                    .snapshot
                    .is_fresh(&key, self.config.refresh_hours, Utc::now())
                {
                    debug!(unit = %unit.label(), "Unit already processed, skipping");
                    self.snapshot.set_cursor(Cursor::new(cursor.page, index + 1));
                    continue;
                }

                let span = info_span!(
                    "unit",
                    unit = %unit.label(),
                    tier = unit.tier.as_deref().unwrap_or("-")
                );
                let report = match self.process_unit(unit).instrument(span).await? {
                    UnitOutcome::Completed(report) => report,
                    UnitOutcome::Aborted => return Ok(BatchOutcome::Stopped),
                };

                self.snapshot.mark_processed(key, unit.tier.clone(), Utc::now());
                self.snapshot.set_cursor(Cursor::new(cursor.page, index + 1));
                processed += 1;
                *sweep_units += 1;
                summary.units_processed += 1;
                summary.records_appended += report.appended;
                summary.records_filtered += report.filtered;
                metrics::record_unit_processed(report.appended);

                info!(
                    unit = %unit.label(),
                    new = report.appended,
                    filtered = report.filtered,
                    skipped = report.skipped,
                    "Unit processed"
                );

                progress.unit_done(report.appended as u64);
                if let Some(bar) = &self.progress_bar {
                    bar.inc(1);
                    bar.set_message(format!("{} new records", summary.records_appended));
                }
                if progress.should_emit_update() {
                    info!("{}", progress.format_progress());
                    progress.mark_emitted();
                }

                self.units_since_snapshot += 1;
                if self.units_since_snapshot >= self.config.snapshot_every {
                    self.persist()?;
                }
            }

            self.snapshot.set_cursor(cursor.next_page());
        }
    }

    async fn list_page(&mut self, page: u32) -> CallState<Vec<UnitRef>> {
        let source = Arc::clone(&self.source);
        let operation = format!("discovery page {page}");
        let mut guard = CallGuard::new(&mut self.budget, self.policy, self.config.call_timeout)
            .with_lifecycle(&self.lifecycle)
            .with_shutdown(self.shutdown.as_deref());
        let state = guard
            .call(
                EndpointClass::League,
                &operation,
                self.snapshot.discovery_counters_mut(),
                || source.list_discovery_units(page),
            )
            .await;

        match state {
            CallState::Success(units) => {
                // Cursor indices must stay stable: keep the first of any repeated unit
                let mut seen = std::collections::HashSet::new();
                let units = units
                    .into_iter()
                    .filter(|u| u.key().map_or(true, |k| seen.insert(k)))
                    .collect();
                CallState::Success(units)
            }
            other => other,
        }
    }

    async fn process_unit(&mut self, unit: &UnitRef) -> Result<UnitOutcome, HarvestError> {
        let source = Arc::clone(&self.source);
        let mut report = UnitReport::default();

        let resolved = if unit.needs_resolution() {
            let operation = format!("resolve {}", unit.label());
            let mut guard = CallGuard::new(&mut self.budget, self.policy, self.config.call_timeout)
                .with_lifecycle(&self.lifecycle)
                .with_shutdown(self.shutdown.as_deref());
            match guard
                .call(
                    EndpointClass::Account,
                    &operation,
                    self.snapshot.discovery_counters_mut(),
                    || source.resolve_unit(unit),
                )
                .await
            {
                CallState::Success(resolved) => resolved,
                CallState::GiveUp(GiveUpReason::Aborted) => return Ok(UnitOutcome::Aborted),
                _ => return Ok(UnitOutcome::Completed(report)),
            }
        } else {
            unit.clone()
        };

        let operation = format!("match ids of {}", resolved.label());
        let count = self.config.ids_per_unit;
        let candidates = {
            let mut guard = CallGuard::new(&mut self.budget, self.policy, self.config.call_timeout)
                .with_lifecycle(&self.lifecycle)
                .with_shutdown(self.shutdown.as_deref());
            match guard
                .call(
                    EndpointClass::Match,
                    &operation,
                    self.snapshot.discovery_counters_mut(),
                    || source.list_candidate_identifiers(&resolved, count),
                )
                .await
            {
                CallState::Success(ids) => ids,
                CallState::GiveUp(GiveUpReason::Aborted) => return Ok(UnitOutcome::Aborted),
                _ => return Ok(UnitOutcome::Completed(report)),
            }
        };

        let mut seen = std::collections::HashSet::new();
        let fresh: Vec<MatchId> = candidates
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .filter(|id| !self.snapshot.is_collected(id) && !self.sink.contains(id))
            .collect();
        debug!(candidates = seen.len(), new = fresh.len(), "Candidate ids listed");

        for id in fresh {
            let operation = format!("match {id}");
            let mut guard = CallGuard::new(&mut self.budget, self.policy, self.config.call_timeout)
                .with_lifecycle(&self.lifecycle)
                .with_shutdown(self.shutdown.as_deref());
            let state = guard
                .call(
                    EndpointClass::Match,
                    &operation,
                    self.snapshot.counters_mut(),
                    || source.fetch_detail(&id),
                )
                .await;

            match state {
                CallState::Success(record) => {
                    if self.filter.is_wanted(&record) {
                        // Durable before the id counts as collected
                        if self.sink.append(&record)? {
                            report.appended += 1;
                        }
                    } else {
                        debug!(id = %id, queue = ?record.queue_id, "Record filtered out");
                        report.filtered += 1;
                    }
                    self.snapshot.collect(id);
                }
                CallState::GiveUp(GiveUpReason::Aborted) => return Ok(UnitOutcome::Aborted),
                _ => report.skipped += 1,
            }
        }

        Ok(UnitOutcome::Completed(report))
    }

    fn persist(&mut self) -> Result<(), HarvestError> {
        self.store.save(&self.snapshot)?;
        self.units_since_snapshot = 0;
        metrics::record_snapshot_saved();
        info!(
            processed = self.snapshot.processed().len(),
            collected = self.snapshot.collected().len(),
            cursor = %self.snapshot.cursor(),
            "Snapshot saved [{}]",
            self.snapshot.counters()
        );
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }
}
