//! Collection orchestration.
//!
//! [`Collector`] sequences minor and major cycles over a
//! [`GenerationalHeap`]. It is a small non-reentrant state machine:
//!
//! ```text
//! Idle --eden exhausted / request--> MinorActive --done--> Idle
//! Idle --request / old pressure / interval--> MajorActive --done--> Idle
//! ```
//!
//! Requests that arrive while a cycle runs are queued. At most one minor
//! and one major request are remembered; duplicates are dropped.

use crate::config::GcConfig;
use crate::error::{GcError, GcResult};
use crate::heap::{GenerationalHeap, MajorOutcome, MinorOutcome};
use crate::object::{ObjectId, RootProvider};
use crate::policy::{FixedPromotion, PromotionPolicy};
use crate::region::align_size;
use crate::telemetry::{CollectorStats, CycleKind, CycleReport, GcEvent, TelemetrySink};
use crate::tracer::TriColorTracer;
use crossbeam::atomic::AtomicCell;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Instant;

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectorState {
    /// No cycle running; the mutator may allocate
    #[default]
    Idle,
    /// Young generation being collected
    MinorActive,
    /// Whole heap being collected
    MajorActive,
}

/// Coalescing queue of collection requests.
#[derive(Debug, Default)]
pub struct PendingRequests {
    minor: bool,
    major: bool,
    dropped: u64,
}

impl PendingRequests {
    /// Queues `kind`. Returns false if it was already pending.
    pub fn push(&mut self, kind: CycleKind) -> bool {
        let slot = match kind {
            CycleKind::Minor => &mut self.minor,
            CycleKind::Major => &mut self.major,
        };
        if *slot {
            self.dropped += 1;
            return false;
        }
        *slot = true;
        true
    }

    /// Removes the next request to serve; minor before major.
    pub fn take(&mut self) -> Option<CycleKind> {
        if std::mem::take(&mut self.minor) {
            Some(CycleKind::Minor)
        } else if std::mem::take(&mut self.major) {
            Some(CycleKind::Major)
        } else {
            None
        }
    }

    /// Drops a pending request of `kind`, if any.
    pub fn clear(&mut self, kind: CycleKind) {
        match kind {
            CycleKind::Minor => self.minor = false,
            CycleKind::Major => self.major = false,
        }
    }

    pub fn contains(&self, kind: CycleKind) -> bool {
        match kind {
            CycleKind::Minor => self.minor,
            CycleKind::Major => self.major,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.minor && !self.major
    }

    /// Duplicate requests dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Thread-safe view of a collector's state and request queue.
///
/// Usable without holding the collector itself, including from telemetry
/// sinks while a cycle is running.
#[derive(Debug, Clone, Default)]
pub struct CollectorHandle {
    state: Arc<AtomicCell<CollectorState>>,
    requests: Arc<Mutex<PendingRequests>>,
}

impl CollectorHandle {
    pub fn state(&self) -> CollectorState {
        self.state.load()
    }

    /// Queues a collection request. Returns false if an identical request
    /// was already pending.
    pub fn request(&self, kind: CycleKind) -> bool {
        let queued = self.requests.lock().push(kind);
        if queued {
            debug!("{:?} collection requested while {:?}", kind, self.state());
        }
        queued
    }

    pub fn is_pending(&self, kind: CycleKind) -> bool {
        self.requests.lock().contains(kind)
    }

    fn take(&self) -> Option<CycleKind> {
        self.requests.lock().take()
    }

    fn clear(&self, kind: CycleKind) {
        self.requests.lock().clear(kind);
    }

    fn dropped(&self) -> u64 {
        self.requests.lock().dropped()
    }

    fn enter(&self, state: CollectorState) {
        debug_assert_eq!(self.state.load(), CollectorState::Idle);
        self.state.store(state);
    }

    fn leave(&self) {
        self.state.store(CollectorState::Idle);
    }
}

/// Owns the heap and drives its collection cycles.
pub struct Collector {
    heap: GenerationalHeap,
    tracer: TriColorTracer,
    policy: Box<dyn PromotionPolicy>,
    sinks: Vec<Box<dyn TelemetrySink>>,
    handle: CollectorHandle,
    /// Minor cycles since the last major cycle
    minors_since_major: usize,
    cycle: u64,
    stats: CollectorStats,
    /// Set by a fatal cycle error; every later operation returns it
    poisoned: Option<GcError>,
}

impl Collector {
    /// Creates a collector over a fresh heap with a fixed promotion policy.
    pub fn new(config: GcConfig) -> GcResult<Self> {
        Ok(Self::with_heap(GenerationalHeap::new(config)?))
    }

    pub fn with_heap(heap: GenerationalHeap) -> Self {
        Collector {
            heap,
            tracer: TriColorTracer::new(),
            policy: Box::new(FixedPromotion),
            sinks: Vec::new(),
            handle: CollectorHandle::default(),
            minors_since_major: 0,
            cycle: 0,
            stats: CollectorStats::default(),
            poisoned: None,
        }
    }

    /// Replaces the promotion policy.
    pub fn with_policy(mut self, policy: impl PromotionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Registers a telemetry sink.
    pub fn add_sink(&mut self, sink: impl TelemetrySink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn state(&self) -> CollectorState {
        self.handle.state()
    }

    pub fn handle(&self) -> CollectorHandle {
        self.handle.clone()
    }

    pub fn heap(&self) -> &GenerationalHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut GenerationalHeap {
        &mut self.heap
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> CollectorStats {
        let mut stats = self.stats.clone();
        stats.coalesced_requests = self.handle.dropped();
        stats
    }

    // -----------------------------------------------------------------------
    // Mutator interface
    // -----------------------------------------------------------------------

    /// Allocates an object with `field_count` null reference fields.
    ///
    /// When Eden is exhausted this runs a minor cycle and retries, then a
    /// major cycle and retries once more, and then gives up with
    /// [`GcError::AllocationFailure`]. A major request queued by the minor
    /// cycle is left for [`Collector::run_pending`] if the first retry
    /// succeeds.
    pub fn allocate<R>(&mut self, roots: &R, size: usize, field_count: usize) -> GcResult<ObjectId>
    where
        R: RootProvider + ?Sized,
    {
        self.check_poisoned()?;
        if let Some(id) = self.heap.try_allocate(size, field_count) {
            return Ok(id);
        }

        debug!("eden exhausted allocating {} bytes; running minor cycle", size);
        self.collect_minor(roots)?;
        if let Some(id) = self.heap.try_allocate(size, field_count) {
            return Ok(id);
        }

        debug!("eden still exhausted after minor cycle; running major cycle");
        self.collect_major(roots)?;
        if let Some(id) = self.heap.try_allocate(size, field_count) {
            return Ok(id);
        }

        self.stats.allocation_failures += 1;
        let err = GcError::AllocationFailure {
            requested: align_size(size),
            eden_free: self.heap.eden_free(),
            old_free: self.heap.old_free(),
        };
        warn!("{}", err);
        Err(err)
    }

    /// Stores a reference through the write barrier.
    pub fn store(&mut self, holder: ObjectId, index: usize, value: Option<ObjectId>) -> GcResult<()> {
        self.heap.store(holder, index, value)
    }

    pub fn load(&self, holder: ObjectId, index: usize) -> GcResult<Option<ObjectId>> {
        self.heap.load(holder, index)
    }

    // -----------------------------------------------------------------------
    // Cycles
    // -----------------------------------------------------------------------

    /// Queues a collection request. Returns false if one of the same kind
    /// was already pending.
    pub fn request(&self, kind: CycleKind) -> bool {
        self.handle.request(kind)
    }

    /// Serves queued requests until none remain.
    pub fn run_pending<R>(&mut self, roots: &R) -> GcResult<Vec<CycleReport>>
    where
        R: RootProvider + ?Sized,
    {
        self.check_poisoned()?;
        let mut reports = Vec::new();
        while let Some(kind) = self.handle.take() {
            let report = match kind {
                CycleKind::Minor => self.collect_minor(roots)?,
                CycleKind::Major => self.collect_major(roots)?,
            };
            reports.push(report);
        }
        Ok(reports)
    }

    /// Runs a minor cycle now.
    pub fn collect_minor<R>(&mut self, roots: &R) -> GcResult<CycleReport>
    where
        R: RootProvider + ?Sized,
    {
        self.check_poisoned()?;
        let roots = self.live_roots(roots);
        self.handle.clear(CycleKind::Minor);
        let cycle = self.begin(CycleKind::Minor);

        let started = Instant::now();
        let result = self.heap.minor_collect(&mut self.tracer, &roots);
        let pause = started.elapsed();
        self.handle.leave();
        let outcome: MinorOutcome = self.poison_on_fatal(result)?;

        let report = CycleReport {
            kind: CycleKind::Minor,
            cycle,
            pause,
            bytes_reclaimed: outcome.bytes_reclaimed,
            objects_reclaimed: outcome.objects_reclaimed,
            survival_rate: outcome.survival.rate,
            promoted: outcome.promoted + outcome.overflow_promoted,
            trace_steps: outcome.trace.steps,
        };
        info!(
            "minor cycle {} in {:?}: reclaimed {} objects ({} bytes), {} survived, {} promoted, survival {:.2}",
            cycle,
            pause,
            outcome.objects_reclaimed,
            outcome.bytes_reclaimed,
            outcome.survived,
            report.promoted,
            outcome.survival.rate
        );
        debug!(
            "minor cycle {}: {} dirty cards, {} card roots, {} retained",
            cycle, outcome.cards_scanned, outcome.card_roots, outcome.retained
        );
        self.finish(&report);

        self.minors_since_major += 1;
        self.tune();
        self.check_major_triggers(&outcome);
        Ok(report)
    }

    /// Runs a major cycle now.
    pub fn collect_major<R>(&mut self, roots: &R) -> GcResult<CycleReport>
    where
        R: RootProvider + ?Sized,
    {
        self.check_poisoned()?;
        let roots = self.live_roots(roots);
        self.handle.clear(CycleKind::Major);
        let cycle = self.begin(CycleKind::Major);

        let started = Instant::now();
        let result = self.heap.major_collect(&mut self.tracer, &roots);
        let pause = started.elapsed();
        self.handle.leave();
        let outcome: MajorOutcome = self.poison_on_fatal(result)?;

        let report = CycleReport {
            kind: CycleKind::Major,
            cycle,
            pause,
            bytes_reclaimed: outcome.bytes_reclaimed,
            objects_reclaimed: outcome.objects_reclaimed,
            survival_rate: 0.0,
            promoted: 0,
            trace_steps: outcome.trace.steps,
        };
        info!(
            "major cycle {} in {:?}: reclaimed {} objects ({} bytes), {} live, {} old objects moved",
            cycle,
            pause,
            outcome.objects_reclaimed,
            outcome.bytes_reclaimed,
            outcome.live_objects,
            outcome.old_relocations.len()
        );
        if outcome.old_grown_by > 0 {
            info!("old generation grown by {} bytes", outcome.old_grown_by);
        }
        self.finish(&report);

        self.minors_since_major = 0;
        Ok(report)
    }

    /// Returns the fatal error of an earlier cycle, if any.
    pub fn poisoned(&self) -> Option<&GcError> {
        self.poisoned.as_ref()
    }

    fn check_poisoned(&self) -> GcResult<()> {
        match &self.poisoned {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Remembers a fatal error. The heap may already have cleared cards or
    /// freed objects, so no further cycle or allocation is served.
    fn poison_on_fatal<T>(&mut self, result: GcResult<T>) -> GcResult<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                error!("collector poisoned: {}", err);
                self.poisoned = Some(err.clone());
            }
        }
        result
    }

    fn begin(&mut self, kind: CycleKind) -> u64 {
        self.cycle += 1;
        self.handle.enter(match kind {
            CycleKind::Minor => CollectorState::MinorActive,
            CycleKind::Major => CollectorState::MajorActive,
        });
        self.emit(&GcEvent::CycleStarted {
            kind,
            cycle: self.cycle,
        });
        self.cycle
    }

    fn finish(&mut self, report: &CycleReport) {
        self.stats.record_cycle(report);
        self.emit(&GcEvent::CycleFinished(report.clone()));
    }

    fn emit(&self, event: &GcEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }

    fn live_roots<R>(&self, roots: &R) -> Vec<ObjectId>
    where
        R: RootProvider + ?Sized,
    {
        let mut roots = roots.current_roots();
        roots.retain(|&id| {
            let live = self.heap.is_live(id);
            if !live {
                warn!("ignoring stale root {:?}", id);
            }
            live
        });
        roots
    }

    fn tune(&mut self) {
        let current = self.heap.promotion_threshold();
        let survival = self.heap.survival_stats();
        let Some(next) = self.policy.next_threshold(current, &survival) else {
            return;
        };
        match self.heap.set_promotion_threshold(next) {
            Ok(()) => {
                self.stats.threshold_changes += 1;
                debug!(
                    "{} policy moved promotion threshold {} -> {}",
                    self.policy.name(),
                    current,
                    next
                );
            }
            Err(err) => warn!("{} policy suggestion ignored: {}", self.policy.name(), err),
        }
    }

    fn check_major_triggers(&mut self, outcome: &MinorOutcome) {
        let config = self.heap.config();
        if outcome.promotion_failed {
            self.stats.promotion_failures += 1;
            self.handle.request(CycleKind::Major);
        }
        if self.heap.old_occupancy() >= config.old_growth_trigger {
            debug!(
                "old occupancy {:.2} reached trigger {:.2}",
                self.heap.old_occupancy(),
                config.old_growth_trigger
            );
            self.handle.request(CycleKind::Major);
        }
        let interval = config.major_cycle_interval;
        if interval > 0 && self.minors_since_major >= interval {
            self.handle.request(CycleKind::Major);
        }
    }
}

/// A collector shared between mutator threads.
///
/// Allocation and stores serialize on one lock; requests go through the
/// lock-free [`CollectorHandle`].
#[derive(Clone)]
pub struct SharedCollector {
    inner: Arc<Mutex<Collector>>,
    handle: CollectorHandle,
}

impl SharedCollector {
    pub fn new(collector: Collector) -> Self {
        let handle = collector.handle();
        SharedCollector {
            inner: Arc::new(Mutex::new(collector)),
            handle,
        }
    }

    pub fn allocate<R>(&self, roots: &R, size: usize, field_count: usize) -> GcResult<ObjectId>
    where
        R: RootProvider + ?Sized,
    {
        self.inner.lock().allocate(roots, size, field_count)
    }

    pub fn store(&self, holder: ObjectId, index: usize, value: Option<ObjectId>) -> GcResult<()> {
        self.inner.lock().store(holder, index, value)
    }

    pub fn load(&self, holder: ObjectId, index: usize) -> GcResult<Option<ObjectId>> {
        self.inner.lock().load(holder, index)
    }

    pub fn request(&self, kind: CycleKind) -> bool {
        self.handle.request(kind)
    }

    pub fn run_pending<R>(&self, roots: &R) -> GcResult<Vec<CycleReport>>
    where
        R: RootProvider + ?Sized,
    {
        self.inner.lock().run_pending(roots)
    }

    pub fn state(&self) -> CollectorState {
        self.handle.state()
    }

    pub fn handle(&self) -> &CollectorHandle {
        &self.handle
    }

    /// Locks the collector for direct access.
    pub fn lock(&self) -> MutexGuard<'_, Collector> {
        self.inner.lock()
    }
}
