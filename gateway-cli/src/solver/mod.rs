//! Reconciliation scheduler
//!
//! [`solve`] drives a full run: it walks the dependency levels (deletes
//! descending, then creates/updates ascending), diffs each level against the
//! live current state, and executes the level's events concurrently with a
//! bounded pool. A level is a hard barrier: nothing from the next level is
//! submitted until every event of this one has finished and its result has
//! been folded back into the current state, so later levels resolve parents
//! created moments earlier.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::StreamExt;
use futures::stream;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::crud::{ExecError, ExecutionContext, Registry, RegistryError};
use crate::diff::{self, Event, EventOp, order};
use crate::state::GatewayState;
use crate::state::types::{Kind, Payload};

/// Cooperative cancellation token.
///
/// Once triggered, no new event is submitted; events already in flight run
/// to completion and their results are still applied.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one reconciliation run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum events in flight within a level.
    pub parallelism: usize,
    pub stop: StopSignal,
    /// Trigger the stop signal when a delete fails, instead of pressing on
    /// with the remaining destructive work.
    pub stop_on_delete_failure: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            parallelism: 10,
            stop: StopSignal::new(),
            stop_on_delete_failure: false,
        }
    }
}

/// Per-operation counters, updated as events succeed.
#[derive(Debug, Default)]
pub struct Stats {
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl Stats {
    pub fn record(&self, op: EventOp) {
        let counter = match op {
            EventOp::Create => &self.creates,
            EventOp::Update => &self.updates,
            EventOp::Delete => &self.deletes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            creates: self.creates.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub creates: u64,
    pub updates: u64,
    pub deletes: u64,
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.creates + self.updates + self.deletes
    }
}

/// One successfully executed event, for reporting.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub op: EventOp,
    pub kind: Kind,
    pub name: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Result of a full run.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub stats: StatsSnapshot,
    pub records: Vec<EventRecord>,
    pub errors: Vec<ExecError>,
    pub stopped: bool,
}

impl SyncOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.stopped
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    Deletes,
    Applies,
}

fn record_for(event: &Event, payload: &Payload) -> EventRecord {
    let (old, new) = match event.op {
        EventOp::Create => (None, Some(payload.to_value())),
        EventOp::Update => (
            event.old_obj.as_ref().map(Payload::to_value),
            Some(payload.to_value()),
        ),
        EventOp::Delete => (Some(event.obj.to_value()), None),
    };
    EventRecord {
        op: event.op,
        kind: event.kind,
        name: event.obj.display_name(),
        old,
        new,
    }
}

/// Diff and execute one dependency level, then fold results back into the
/// current state before returning.
async fn run_level(
    registry: &Registry,
    ctx: &ExecutionContext,
    target: &GatewayState,
    kinds: &[Kind],
    phase: Phase,
    options: &SyncOptions,
    stats: &Stats,
    outcome: &mut SyncOutcome,
    sink: &mut dyn FnMut(&EventRecord),
) {
    if options.stop.is_stopped() {
        return;
    }

    let mut events = Vec::new();
    {
        let current = ctx.current.read().await;
        for kind in kinds {
            let (evs, errs) = diff::events_for(*kind, &current, target);
            match phase {
                Phase::Deletes => {
                    events.extend(evs.into_iter().filter(|e| e.op == EventOp::Delete));
                }
                Phase::Applies => {
                    events.extend(evs.into_iter().filter(|e| e.op != EventOp::Delete));
                    outcome.errors.extend(errs.into_iter().map(ExecError::from));
                }
            }
        }
    }
    if events.is_empty() {
        return;
    }
    debug!("level {:?}: {} events", kinds, events.len());

    let stop = &options.stop;
    let results: Vec<(Event, Option<Result<Payload, ExecError>>)> = stream::iter(events)
        .map(|event| async move {
            if stop.is_stopped() {
                return (event, None);
            }
            let result = registry.do_event(ctx, &event).await;
            (event, Some(result))
        })
        .buffer_unordered(options.parallelism.max(1))
        .collect()
        .await;

    // Barrier: fold results into the current state sequentially.
    let mut current = ctx.current.write().await;
    for (event, result) in results {
        match result {
            None => {}
            Some(Ok(payload)) => {
                stats.record(event.op);
                let record = record_for(&event, &payload);
                sink(&record);
                outcome.records.push(record);
                let applied = match event.op {
                    EventOp::Create => current.apply_create(payload),
                    EventOp::Update => current.apply_update(payload),
                    EventOp::Delete => current.apply_delete(&payload),
                };
                if let Err(err) = applied {
                    warn!("state bookkeeping after {}: {}", event.describe(), err);
                }
            }
            Some(Err(err)) => {
                warn!("{} failed: {}", event.describe(), err);
                outcome.errors.push(err);
                if phase == Phase::Deletes && options.stop_on_delete_failure {
                    options.stop.trigger();
                }
            }
        }
    }
}

/// Run a full reconciliation: every kind, every level, both phases.
///
/// Each executed event is handed to `sink` as it lands, for progress
/// display. Event failures are aggregated in the outcome rather than
/// aborting the run; a missing executor for any known kind fails before
/// anything is submitted.
pub async fn solve(
    registry: &Registry,
    ctx: &ExecutionContext,
    target: &GatewayState,
    options: &SyncOptions,
    mut sink: impl FnMut(&EventRecord),
) -> Result<SyncOutcome, RegistryError> {
    registry.validate(Kind::all())?;

    let stats = Stats::default();
    let mut outcome = SyncOutcome::default();

    for kinds in order::delete_order() {
        run_level(
            registry,
            ctx,
            target,
            kinds,
            Phase::Deletes,
            options,
            &stats,
            &mut outcome,
            &mut sink,
        )
        .await;
    }
    for kinds in order::insert_order() {
        run_level(
            registry,
            ctx,
            target,
            kinds,
            Phase::Applies,
            options,
            &stats,
            &mut outcome,
            &mut sink,
        )
        .await;
    }

    outcome.stats = stats.snapshot();
    outcome.stopped = options.stop.is_stopped();
    info!(
        "done: {} created, {} updated, {} deleted, {} errors",
        outcome.stats.creates,
        outcome.stats.updates,
        outcome.stats.deletes,
        outcome.errors.len()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crud::dry;
    use crate::state::types::{Consumer, KeyAuth, Reference, Route, Service};

    fn dry_registry() -> Registry {
        let mut registry = Registry::new();
        dry::register_all(&mut registry).unwrap();
        registry
    }

    fn service(id: Option<&str>, name: &str, port: u32) -> Service {
        Service {
            id: id.map(str::to_string),
            name: name.to_string(),
            port: Some(port),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_update_and_dependent_create() {
        let mut current = GatewayState::new();
        current.services.add(service(Some("s-1"), "svc-a", 80)).unwrap();

        let mut target = GatewayState::new();
        target.services.add(service(None, "svc-a", 443)).unwrap();
        target
            .routes
            .add(Route {
                name: "r1".to_string(),
                service: Some(Reference::by_name("svc-a")),
                ..Default::default()
            })
            .unwrap();

        let registry = dry_registry();
        let ctx = ExecutionContext::new(None, current);
        let outcome = solve(&registry, &ctx, &target, &SyncOptions::default(), |_| {})
            .await
            .unwrap();

        assert!(outcome.is_clean());
        assert_eq!(outcome.stats.updates, 1);
        assert_eq!(outcome.stats.creates, 1);

        let current = ctx.current.read().await;
        let route = current.routes.get("r1").unwrap();
        assert_eq!(
            route.service.as_ref().unwrap().id.as_deref(),
            Some("s-1"),
            "route must point at the existing service id"
        );
    }

    #[tokio::test]
    async fn test_credential_deleted_before_consumer() {
        let mut current = GatewayState::new();
        current
            .consumers
            .add(Consumer {
                id: Some("u1".to_string()),
                username: Some("alice".to_string()),
                ..Default::default()
            })
            .unwrap();
        current
            .key_auths
            .add(KeyAuth {
                id: Some("k1".to_string()),
                key: "secret".to_string(),
                consumer: Some(Reference::by_name("alice")),
                ..Default::default()
            })
            .unwrap();

        let registry = dry_registry();
        let ctx = ExecutionContext::new(None, current);
        let outcome = solve(&registry, &ctx, &GatewayState::new(), &SyncOptions::default(), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.stats.deletes, 2);
        let kinds: Vec<Kind> = outcome.records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![Kind::KeyAuth, Kind::Consumer]);
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let mut target = GatewayState::new();
        target.services.add(service(None, "svc-a", 80)).unwrap();

        let registry = dry_registry();
        let ctx = ExecutionContext::new(None, GatewayState::new());
        let first = solve(&registry, &ctx, &target, &SyncOptions::default(), |_| {})
            .await
            .unwrap();
        assert_eq!(first.stats.creates, 1);

        let second = solve(&registry, &ctx, &target, &SyncOptions::default(), |_| {})
            .await
            .unwrap();
        assert_eq!(second.stats.total(), 0, "second run must be a no-op");
    }

    #[tokio::test]
    async fn test_dry_run_converges_with_synthesized_parents() {
        let mut target = GatewayState::new();
        target.services.add(service(None, "svc-a", 80)).unwrap();
        target
            .routes
            .add(Route {
                name: "r1".to_string(),
                service: Some(Reference::by_name("svc-a")),
                ..Default::default()
            })
            .unwrap();

        let registry = dry_registry();
        let ctx = ExecutionContext::new(None, GatewayState::new());
        let outcome = solve(&registry, &ctx, &target, &SyncOptions::default(), |_| {})
            .await
            .unwrap();

        assert!(outcome.is_clean());
        assert_eq!(outcome.stats.creates, 2);
        let current = ctx.current.read().await;
        let service_id = current.services.get("svc-a").unwrap().id.clone().unwrap();
        let route = current.routes.get("r1").unwrap();
        assert_eq!(route.service.as_ref().unwrap().id.as_deref(), Some(service_id.as_str()));
    }

    #[tokio::test]
    async fn test_outcome_invariant_under_parallelism() {
        let mut target = GatewayState::new();
        for i in 0..20 {
            target
                .services
                .add(service(None, &format!("svc-{i}"), 80))
                .unwrap();
        }

        let mut totals = Vec::new();
        for parallelism in [1usize, 8] {
            let registry = dry_registry();
            let ctx = ExecutionContext::new(None, GatewayState::new());
            let options = SyncOptions {
                parallelism,
                ..Default::default()
            };
            let outcome = solve(&registry, &ctx, &target, &options, |_| {}).await.unwrap();
            assert!(outcome.is_clean());
            totals.push(outcome.stats);
            assert_eq!(ctx.current.read().await.total(), 20);
        }
        assert_eq!(totals[0], totals[1]);
    }

    #[tokio::test]
    async fn test_stop_signal_submits_nothing() {
        let mut target = GatewayState::new();
        target.services.add(service(None, "svc-a", 80)).unwrap();

        let registry = dry_registry();
        let ctx = ExecutionContext::new(None, GatewayState::new());
        let options = SyncOptions::default();
        options.stop.trigger();

        let outcome = solve(&registry, &ctx, &target, &options, |_| {}).await.unwrap();
        assert!(outcome.stopped);
        assert_eq!(outcome.stats.total(), 0);
    }

    #[tokio::test]
    async fn test_event_failures_are_aggregated() {
        // Remote executors without a client fail each event individually.
        let mut registry = Registry::new();
        crate::crud::remote::register_all(&mut registry).unwrap();

        let mut target = GatewayState::new();
        target.services.add(service(None, "svc-a", 80)).unwrap();
        target.services.add(service(None, "svc-b", 80)).unwrap();

        let ctx = ExecutionContext::new(None, GatewayState::new());
        let outcome = solve(&registry, &ctx, &target, &SyncOptions::default(), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.stats.total(), 0);
    }
}
