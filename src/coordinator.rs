//! Entry point the rest of the application talks to.
//!
//! The coordinator owns the live position map. Each new snapshot is
//! fingerprinted and resolved from the displayed layout, the cache, or a
//! layout worker, in that order. Worker requests carry a strictly increasing
//! id and only the response to the latest one is ever applied, so a burst of
//! mutations settles on the layout of the last one.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{CacheLookup, LayoutCache, LoadState, PendingLoad, filter_to_snapshot};
use crate::config::{Config, LayoutConfig};
use crate::fingerprint::{Fingerprint, fingerprint};
use crate::ir::{Position, PositionMap, Snapshot};
use crate::layout::{LayoutOutcome, LayoutRequest, LayoutResponse, fill_missing, pack_fallback};
use crate::worker::LayoutWorkerPool;

pub type SubscriptionId = u64;

type Listener = Box<dyn FnMut(&PositionMap) + Send>;

/// Non-fatal conditions reported out of band. Nothing here ever reaches the
/// rendering path as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    WorkerUnavailable { request_id: u64 },
    WorkerFailed { request_id: u64, message: String },
    CacheUnavailable { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Same graph as the one displayed; positions kept as they are.
    Unchanged,
    CacheHit,
    AwaitingCache { request_id: u64 },
    Dispatched { request_id: u64 },
    /// No worker could take the request; grid placement was applied inline.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    Applied,
    Stale,
    Degraded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub dispatched: u64,
    pub applied: u64,
    pub stale: u64,
    pub cache_hits: u64,
    pub degraded: u64,
}

enum Stage {
    CacheLoad(PendingLoad),
    Worker,
}

struct Pending {
    request_id: u64,
    fingerprint: Fingerprint,
    snapshot: Arc<Snapshot>,
    stage: Stage,
}

struct Current {
    fingerprint: Fingerprint,
    snapshot: Arc<Snapshot>,
}

pub struct LayoutCoordinator {
    config: LayoutConfig,
    cache: Arc<LayoutCache>,
    workers: LayoutWorkerPool,
    latest_request_id: u64,
    current: Option<Current>,
    pending: Option<Pending>,
    positions: PositionMap,
    /// Nodes the user placed by hand; worker results never move them.
    pinned: BTreeSet<String>,
    dragging: Option<String>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
    diagnostics_tx: Sender<Diagnostic>,
    diagnostics_rx: Receiver<Diagnostic>,
    stats: CoordinatorStats,
}

impl LayoutCoordinator {
    /// Builds the cache and worker pool from `config`. Failures degrade (memory
    /// only cache, inline fallback layout) and are reported as diagnostics.
    pub fn new(config: &Config) -> Self {
        let (cache, cache_error) = LayoutCache::open_or_memory(&config.cache);
        let (workers, worker_error) =
            match LayoutWorkerPool::spawn(config.worker.count, config.layout.clone()) {
                Ok(pool) => (pool, None),
                Err(err) => {
                    tracing::warn!(error = %err, "layout workers unavailable");
                    (LayoutWorkerPool::unavailable(), Some(err))
                }
            };
        let coordinator = Self::with_parts(config.layout.clone(), Arc::new(cache), workers);
        if let Some(err) = cache_error {
            coordinator.report(Diagnostic::CacheUnavailable {
                message: err.to_string(),
            });
        }
        if worker_error.is_some() {
            coordinator.report(Diagnostic::WorkerUnavailable { request_id: 0 });
        }
        coordinator
    }

    /// Shares `cache` with other coordinators (one per open graph view).
    pub fn with_parts(
        config: LayoutConfig,
        cache: Arc<LayoutCache>,
        workers: LayoutWorkerPool,
    ) -> Self {
        let (diagnostics_tx, diagnostics_rx) = unbounded();
        Self {
            config,
            cache,
            workers,
            latest_request_id: 0,
            current: None,
            pending: None,
            positions: PositionMap::new(),
            pinned: BTreeSet::new(),
            dragging: None,
            listeners: Vec::new(),
            next_subscription: 1,
            diagnostics_tx,
            diagnostics_rx,
            stats: CoordinatorStats::default(),
        }
    }

    pub fn set_snapshot(&mut self, snapshot: Snapshot) -> SnapshotOutcome {
        let fingerprint = fingerprint(&snapshot);
        let snapshot = Arc::new(snapshot);

        if self
            .current
            .as_ref()
            .is_some_and(|current| current.fingerprint == fingerprint)
        {
            if self.pending.is_some() {
                tracing::trace!(%fingerprint, "snapshot unchanged, layout still pending");
                return SnapshotOutcome::Unchanged;
            }
            if let Some(mut kept) = filter_to_snapshot(&self.positions, &snapshot) {
                fill_missing(&snapshot, &mut kept, &self.config);
                let changed = kept != self.positions;
                self.positions = kept;
                self.current = Some(Current {
                    fingerprint,
                    snapshot,
                });
                if changed {
                    self.notify();
                }
                tracing::trace!(%fingerprint, "snapshot unchanged");
                return SnapshotOutcome::Unchanged;
            }
        }

        // Anything still in flight belongs to an older snapshot now.
        self.pending = None;
        self.latest_request_id += 1;
        let request_id = self.latest_request_id;
        let seeds = self.seeds_for(&snapshot);
        self.current = Some(Current {
            fingerprint,
            snapshot: Arc::clone(&snapshot),
        });

        match self.cache.lookup(fingerprint) {
            CacheLookup::Hit(cached) => {
                if let Some(cached) = filter_to_snapshot(&cached, &snapshot) {
                    tracing::debug!(%fingerprint, "layout served from memory cache");
                    self.apply_cached(&snapshot, cached);
                    return SnapshotOutcome::CacheHit;
                }
            }
            CacheLookup::Pending(load) => {
                tracing::debug!(%fingerprint, request_id, "waiting on durable layout cache");
                self.positions = seeds;
                self.pending = Some(Pending {
                    request_id,
                    fingerprint,
                    snapshot,
                    stage: Stage::CacheLoad(load),
                });
                self.notify();
                return SnapshotOutcome::AwaitingCache { request_id };
            }
            CacheLookup::Miss => {}
        }

        self.dispatch(request_id, fingerprint, snapshot, seeds)
    }

    /// Live positions narrowed to `snapshot`; empty for a first layout.
    fn seeds_for(&mut self, snapshot: &Snapshot) -> PositionMap {
        let ids: HashSet<&str> = snapshot.nodes.iter().map(|node| node.id.as_str()).collect();
        self.pinned.retain(|id| ids.contains(id.as_str()));
        if self
            .dragging
            .as_deref()
            .is_some_and(|id| !ids.contains(id))
        {
            self.dragging = None;
        }
        filter_to_snapshot(&self.positions, snapshot).unwrap_or_default()
    }

    fn dispatch(
        &mut self,
        request_id: u64,
        fingerprint: Fingerprint,
        snapshot: Arc<Snapshot>,
        seeds: PositionMap,
    ) -> SnapshotOutcome {
        let request = LayoutRequest {
            request_id,
            fingerprint,
            snapshot: Arc::clone(&snapshot),
            seeds: seeds.clone(),
        };
        match self.workers.dispatch(request) {
            Ok(()) => {
                tracing::debug!(
                    %fingerprint,
                    request_id,
                    nodes = snapshot.nodes.len(),
                    "layout request dispatched"
                );
                self.stats.dispatched += 1;
                self.positions = seeds;
                self.pending = Some(Pending {
                    request_id,
                    fingerprint,
                    snapshot,
                    stage: Stage::Worker,
                });
                self.notify();
                SnapshotOutcome::Dispatched { request_id }
            }
            Err(err) => {
                tracing::warn!(request_id, error = %err, "falling back to inline grid layout");
                self.report(Diagnostic::WorkerUnavailable { request_id });
                self.apply_fallback(&snapshot, &seeds);
                SnapshotOutcome::Degraded
            }
        }
    }

    /// Processes whatever cache reads and worker responses have completed.
    /// Never blocks. Returns the number of worker responses handled.
    pub fn pump(&mut self) -> usize {
        self.poll_cache_load(None);
        let mut handled = 0;
        while let Some(response) = self.workers.try_recv() {
            self.handle_response(response);
            handled += 1;
        }
        handled
    }

    /// Pumps until no work is pending or `timeout` elapses. Returns whether the
    /// coordinator settled. Meant for non-interactive callers.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            let Some(pending) = &self.pending else {
                return true;
            };
            let waiting_on_cache = matches!(pending.stage, Stage::CacheLoad(_));
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wait = (deadline - now).min(Duration::from_millis(50));
            if waiting_on_cache {
                self.poll_cache_load(Some(wait));
            } else if let Some(response) = self.workers.recv_timeout(wait) {
                self.handle_response(response);
            }
        }
    }

    fn poll_cache_load(&mut self, wait: Option<Duration>) -> bool {
        let Some(Pending {
            stage: Stage::CacheLoad(load),
            ..
        }) = &self.pending
        else {
            return false;
        };
        let state = match wait {
            Some(timeout) => load.wait_timeout(timeout),
            None => load.poll(),
        };
        let LoadState::Ready(loaded) = state else {
            return false;
        };
        let Some(pending) = self.pending.take() else {
            return false;
        };
        let cached = self
            .cache
            .resolve_load(pending.fingerprint, loaded)
            .and_then(|cached| filter_to_snapshot(&cached, &pending.snapshot));
        match cached {
            Some(cached) => {
                tracing::debug!(
                    fingerprint = %pending.fingerprint,
                    "layout served from durable cache"
                );
                self.apply_cached(&pending.snapshot, cached);
            }
            None => {
                // Seed from the live map so drags made while waiting survive.
                let seeds = filter_to_snapshot(&self.positions, &pending.snapshot)
                    .unwrap_or_default();
                self.dispatch(
                    pending.request_id,
                    pending.fingerprint,
                    pending.snapshot,
                    seeds,
                );
            }
        }
        true
    }

    /// Applies a worker response if it answers the latest request; anything
    /// older is dropped.
    pub fn handle_response(&mut self, response: LayoutResponse) -> ResponseDisposition {
        let matches_pending = matches!(
            &self.pending,
            Some(Pending {
                request_id,
                stage: Stage::Worker,
                ..
            }) if *request_id == response.request_id
        );
        if response.request_id != self.latest_request_id || !matches_pending {
            tracing::debug!(
                request_id = response.request_id,
                latest = self.latest_request_id,
                "discarding stale layout response"
            );
            self.stats.stale += 1;
            return ResponseDisposition::Stale;
        }
        let Some(pending) = self.pending.take() else {
            return ResponseDisposition::Stale;
        };

        match response.outcome {
            LayoutOutcome::Positions(positions) => {
                let mut merged =
                    filter_to_snapshot(&positions, &pending.snapshot).unwrap_or_default();
                self.keep_pinned(&mut merged);
                fill_missing(&pending.snapshot, &mut merged, &self.config);
                self.positions = merged;
                self.cache.put(response.fingerprint, self.positions.clone());
                self.stats.applied += 1;
                tracing::debug!(
                    request_id = response.request_id,
                    fingerprint = %response.fingerprint,
                    "layout applied"
                );
                self.notify();
                ResponseDisposition::Applied
            }
            LayoutOutcome::Failed(message) => {
                tracing::warn!(
                    request_id = response.request_id,
                    error = %message,
                    "layout worker failed"
                );
                self.report(Diagnostic::WorkerFailed {
                    request_id: response.request_id,
                    message,
                });
                let seeds = filter_to_snapshot(&self.positions, &pending.snapshot)
                    .unwrap_or_default();
                self.apply_fallback(&pending.snapshot, &seeds);
                ResponseDisposition::Degraded
            }
        }
    }

    /// Overwrites pinned nodes in `incoming` with their live positions.
    fn keep_pinned(&self, incoming: &mut PositionMap) {
        for id in &self.pinned {
            if let Some(position) = self.positions.get(id)
                && let Some(slot) = incoming.get_mut(id)
            {
                *slot = *position;
            }
        }
    }

    fn apply_cached(&mut self, snapshot: &Snapshot, mut cached: PositionMap) {
        fill_missing(snapshot, &mut cached, &self.config);
        self.positions = cached;
        self.pending = None;
        self.stats.cache_hits += 1;
        self.notify();
    }

    /// Grid placement on the calling thread. Not cached.
    fn apply_fallback(&mut self, snapshot: &Snapshot, seeds: &PositionMap) {
        let mut placed = pack_fallback(snapshot, seeds, &self.config);
        self.keep_pinned(&mut placed);
        self.positions = placed;
        self.pending = None;
        self.stats.degraded += 1;
        self.notify();
    }

    pub fn begin_drag(&mut self, node_id: &str) -> bool {
        let known = self
            .current
            .as_ref()
            .is_some_and(|current| current.snapshot.contains(node_id));
        if known {
            self.dragging = Some(node_id.to_string());
        }
        known
    }

    pub fn update_drag(&mut self, node_id: &str, x: f32, y: f32) -> bool {
        let position = Position::new(x, y);
        if self.dragging.as_deref() != Some(node_id) || !position.is_finite() {
            return false;
        }
        self.positions.insert(node_id.to_string(), position);
        self.pinned.insert(node_id.to_string());
        self.notify();
        true
    }

    /// Ends the drag and records the adjusted map under the current
    /// fingerprint, so this exact graph shape comes back with the manual
    /// placement.
    pub fn end_drag(&mut self, node_id: &str) -> bool {
        if self.dragging.as_deref() != Some(node_id) {
            return false;
        }
        self.dragging = None;
        if let Some(current) = &self.current {
            self.cache.put(current.fingerprint, self.positions.clone());
        }
        true
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&PositionMap) + Send + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn notify(&mut self) {
        for (_, listener) in &mut self.listeners {
            listener(&self.positions);
        }
    }

    fn report(&self, diagnostic: Diagnostic) {
        let _ = self.diagnostics_tx.send(diagnostic);
    }

    pub fn get_position(&self, node_id: &str) -> Option<Position> {
        self.positions.get(node_id).copied()
    }

    pub fn positions(&self) -> &PositionMap {
        &self.positions
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.current.as_ref().map(|current| current.fingerprint)
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.current.as_ref().map(|current| current.snapshot.as_ref())
    }

    pub fn latest_request_id(&self) -> u64 {
        self.latest_request_id
    }

    pub fn is_settled(&self) -> bool {
        self.pending.is_none()
    }

    pub fn is_pinned(&self, node_id: &str) -> bool {
        self.pinned.contains(node_id)
    }

    pub fn diagnostics(&self) -> Receiver<Diagnostic> {
        self.diagnostics_rx.clone()
    }

    pub fn cache(&self) -> &Arc<LayoutCache> {
        &self.cache
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }
}
