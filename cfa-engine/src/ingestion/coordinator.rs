//! Ingestion cycle coordinator
//!
//! One cycle: load active sources and unresolved events, fetch every
//! (event, source) pair that has an external id, append what came back, and
//! refresh each event's consensus snapshot.
//!
//! # Isolation
//! - A failed or timed-out fetch affects only that (event, source) pair.
//! - A failed event pipeline affects only that event.
//! - Only failing to load sources or events fails the cycle.
//!
//! # Concurrency
//! Events run through `buffer_unordered(event_concurrency)`; within an event
//! every source is fetched concurrently and joined before anything is
//! written. The write gate is held only for the per-event transaction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cfa_common::config::EngineConfig;
use cfa_common::db::{Event, NewObservation, Source};
use cfa_common::time::now;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::adapters::{AdapterRegistry, ErrorKind, SourceAdapter};
use crate::consensus::{compute_consensus, select_latest, BootstrapSettings};
use crate::db::{self, SnapshotUpdate};

/// Cycle-level failure; nothing further in the cycle can run
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to load active sources: {0}")]
    LoadSources(#[source] cfa_common::Error),

    #[error("Failed to load unresolved events: {0}")]
    LoadEvents(#[source] cfa_common::Error),
}

/// Tunables for one coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    pub adapter_timeout: Duration,
    pub cycle_ceiling: Duration,
    pub event_concurrency: usize,
    pub bootstrap: BootstrapSettings,
    /// Fixed seed for reproducible intervals; entropy when `None`
    pub bootstrap_seed: Option<u64>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for CoordinatorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            adapter_timeout: Duration::from_secs(config.adapter_timeout_secs),
            cycle_ceiling: Duration::from_secs(config.cycle_ceiling_secs),
            event_concurrency: config.event_concurrency.max(1),
            bootstrap: BootstrapSettings {
                confidence: config.confidence_level,
                resamples: config.bootstrap_resamples,
            },
            bootstrap_seed: config.bootstrap_seed,
        }
    }
}

/// Summary of a completed cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub sources_active: usize,
    pub events_considered: usize,
    pub events_updated: usize,
    pub events_without_data: usize,
    pub events_failed: usize,
    /// Events not started because the cycle ceiling was reached
    pub events_skipped: usize,
    pub observations_written: usize,
    pub fetch_failures: usize,
}

/// Result of asking for a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle held the single-flight guard; nothing was done
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventResult {
    Updated,
    NoData,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy)]
struct EventOutcome {
    result: EventResult,
    observations_written: usize,
    fetch_failures: usize,
}

impl EventOutcome {
    fn skipped() -> Self {
        Self {
            result: EventResult::Skipped,
            observations_written: 0,
            fetch_failures: 0,
        }
    }
}

/// Active source with a usable adapter
struct SourceBinding {
    source: Source,
    adapter: Arc<dyn SourceAdapter>,
}

/// Per-cycle data shared by every event task
struct CycleContext {
    bindings: Vec<SourceBinding>,
    active_ids: HashSet<i64>,
    weights: HashMap<i64, f64>,
    started: Instant,
    ceiling: Duration,
}

enum FetchResult {
    Observed(NewObservation),
    Absent,
    Failed,
}

pub struct IngestionCoordinator {
    db: SqlitePool,
    registry: AdapterRegistry,
    settings: CoordinatorSettings,
    write_gate: Mutex<()>,
    cycle_guard: Mutex<()>,
}

impl IngestionCoordinator {
    pub fn new(db: SqlitePool, registry: AdapterRegistry, settings: CoordinatorSettings) -> Self {
        Self {
            db,
            registry,
            settings,
            write_gate: Mutex::new(()),
            cycle_guard: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Run one ingestion cycle
    ///
    /// Returns [`CycleOutcome::AlreadyRunning`] immediately if a cycle is in
    /// progress.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            info!("Ingestion cycle already running, request ignored");
            return Ok(CycleOutcome::AlreadyRunning);
        };

        let started = Instant::now();
        let started_at = now();
        info!("Ingestion cycle started");

        let (sources, events) = match self.load_cycle_inputs().await {
            Ok(inputs) => inputs,
            Err(e) => {
                error!(error = %e, "Ingestion cycle failed");
                return Err(e);
            }
        };

        let ctx = self.build_context(sources, started);
        let sources_active = ctx.active_ids.len();
        let events_considered = events.len();

        let ctx = &ctx;
        let outcomes: Vec<EventOutcome> = stream::iter(events)
            .map(|event| async move {
                if ctx.started.elapsed() >= ctx.ceiling {
                    return EventOutcome::skipped();
                }
                self.process_event(ctx, &event).await
            })
            .buffer_unordered(self.settings.event_concurrency.max(1))
            .collect()
            .await;

        let mut report = CycleReport {
            started_at: Some(started_at),
            sources_active,
            events_considered,
            ..Default::default()
        };
        for outcome in &outcomes {
            report.observations_written += outcome.observations_written;
            report.fetch_failures += outcome.fetch_failures;
            match outcome.result {
                EventResult::Updated => report.events_updated += 1,
                EventResult::NoData => report.events_without_data += 1,
                EventResult::Failed => report.events_failed += 1,
                EventResult::Skipped => report.events_skipped += 1,
            }
        }
        report.duration_ms = started.elapsed().as_millis() as u64;

        if report.events_skipped > 0 {
            warn!(
                events_skipped = report.events_skipped,
                ceiling_secs = self.settings.cycle_ceiling.as_secs(),
                "Cycle ceiling reached, remaining events not started"
            );
        }

        info!(
            observations_written = report.observations_written,
            events_updated = report.events_updated,
            events_failed = report.events_failed,
            fetch_failures = report.fetch_failures,
            duration_ms = report.duration_ms,
            "Ingestion cycle completed"
        );

        Ok(CycleOutcome::Completed(report))
    }

    async fn load_cycle_inputs(&self) -> Result<(Vec<Source>, Vec<Event>), CycleError> {
        let mut conn = self
            .db
            .acquire()
            .await
            .map_err(|e| CycleError::LoadSources(e.into()))?;

        let sources = db::get_active_sources(&mut *conn)
            .await
            .map_err(CycleError::LoadSources)?;
        let events = db::get_unresolved_events(&mut *conn)
            .await
            .map_err(CycleError::LoadEvents)?;

        debug!(sources = sources.len(), events = events.len(), "Cycle inputs loaded");
        Ok((sources, events))
    }

    /// Resolve adapters once per cycle
    fn build_context(&self, sources: Vec<Source>, started: Instant) -> CycleContext {
        let active_ids = sources.iter().map(|s| s.id).collect();
        let weights = sources.iter().map(|s| (s.id, s.weight)).collect();

        let mut bindings = Vec::with_capacity(sources.len());
        for source in sources {
            let Some(adapter) = self.registry.get(&source.key) else {
                warn!(source = %source.key, "No adapter registered for source, skipping");
                continue;
            };
            if !adapter.is_available() {
                info!(source = %source.key, "Adapter unavailable (credentials missing), treating as absent");
                continue;
            }
            bindings.push(SourceBinding { source, adapter });
        }

        CycleContext {
            bindings,
            active_ids,
            weights,
            started,
            ceiling: self.settings.cycle_ceiling,
        }
    }

    async fn process_event(&self, ctx: &CycleContext, event: &Event) -> EventOutcome {
        let fetches = ctx.bindings.iter().filter_map(|binding| {
            let external_id = event.external_ids.get(&binding.source.id)?;
            Some(self.fetch_one(binding, event.id, external_id))
        });
        let results = join_all(fetches).await;

        let mut observations = Vec::new();
        let mut fetch_failures = 0;
        for result in results {
            match result {
                FetchResult::Observed(obs) => observations.push(obs),
                FetchResult::Absent => {}
                FetchResult::Failed => fetch_failures += 1,
            }
        }

        let observations_written = observations.len();
        let result = match self.commit_event(ctx, event.id, &observations).await {
            Ok(result) => result,
            Err(e) => {
                warn!(event_id = event.id, error = %e, "Event pipeline failed, continuing");
                return EventOutcome {
                    result: EventResult::Failed,
                    observations_written: 0,
                    fetch_failures,
                };
            }
        };

        EventOutcome {
            result,
            observations_written,
            fetch_failures,
        }
    }

    async fn fetch_one(&self, binding: &SourceBinding, event_id: i64, external_id: &str) -> FetchResult {
        let source = &binding.source;
        let timeout = self.settings.adapter_timeout;

        match tokio::time::timeout(timeout, binding.adapter.fetch_probability(external_id)).await {
            Ok(Ok(Some(fetched))) => {
                debug!(
                    event_id,
                    source = %source.key,
                    probability = fetched.probability,
                    "Fetched probability"
                );
                FetchResult::Observed(NewObservation {
                    event_id,
                    source_id: source.id,
                    probability: fetched.probability,
                    observed_at: now(),
                    raw_payload: fetched.raw_payload.map(|v| v.to_string()),
                })
            }
            Ok(Ok(None)) => {
                debug!(event_id, source = %source.key, external_id, "No data from source");
                FetchResult::Absent
            }
            Ok(Err(e)) if e.kind() == ErrorKind::Unavailable => {
                debug!(event_id, source = %source.key, error = %e, "Source unavailable");
                FetchResult::Absent
            }
            Ok(Err(e)) => {
                warn!(event_id, source = %source.key, error = %e, "Source fetch failed");
                FetchResult::Failed
            }
            Err(_) => {
                warn!(
                    event_id,
                    source = %source.key,
                    timeout_secs = timeout.as_secs_f64(),
                    "Source fetch timed out"
                );
                FetchResult::Failed
            }
        }
    }

    /// Append observations and refresh the snapshot in one transaction
    ///
    /// An aggregation fault leaves the snapshot untouched but still commits
    /// the observations.
    async fn commit_event(
        &self,
        ctx: &CycleContext,
        event_id: i64,
        observations: &[NewObservation],
    ) -> cfa_common::Result<EventResult> {
        let mut rng = match self.settings.bootstrap_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(event_id as u64)),
            None => StdRng::from_entropy(),
        };

        let _gate = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        for obs in observations {
            db::append_observation(&mut *tx, obs).await?;
        }

        let newest = db::get_latest_observations(&mut *tx, event_id).await?;
        let latest = select_latest(&newest, &ctx.active_ids);

        let result = match compute_consensus(&latest, &ctx.weights, &self.settings.bootstrap, &mut rng) {
            Ok(Some(estimate)) => {
                let update = SnapshotUpdate::from(&estimate);
                let snapshot = db::upsert_snapshot(&mut *tx, event_id, &update).await?;
                debug!(
                    event_id,
                    probability = snapshot.probability,
                    disagreement = %snapshot.disagreement_label,
                    sources = snapshot.source_count,
                    "Consensus updated"
                );
                EventResult::Updated
            }
            Ok(None) => {
                debug!(event_id, "No active-source data, consensus not computed");
                EventResult::NoData
            }
            Err(fault) => {
                warn!(event_id, error = %fault, "Aggregation fault, snapshot left unchanged");
                EventResult::Failed
            }
        };

        tx.commit().await?;
        Ok(result)
    }
}
