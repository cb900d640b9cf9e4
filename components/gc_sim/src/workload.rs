//! Synthetic mutator workload
//!
//! Each step allocates one object. With probability `survival` the object
//! becomes a root; roots are kept in a FIFO window of `max_roots`, so older
//! objects die as new ones arrive. With probability `link_probability` the
//! new object is also stored into a random field of a random root, which
//! exercises the write barrier once roots have been promoted.

use crate::error::{SimError, SimResult};
use generational_gc::{
    AdaptivePromotion, BarrierSnapshot, Collector, CollectorStats, CycleKind, CycleReport, EventLog,
    GcConfig, HeapStats, ObjectId, RootProvider,
};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Workload parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workload {
    /// Number of objects to allocate
    pub allocations: usize,
    /// Size of each object in bytes
    pub object_size: usize,
    /// Reference fields per object
    pub fields: usize,
    /// Probability that a new object is kept as a root
    pub survival: f64,
    /// Root window size
    pub max_roots: usize,
    /// Probability that a new object is linked from a root
    pub link_probability: f64,
    /// Use adaptive promotion instead of a fixed threshold
    pub adaptive: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for Workload {
    fn default() -> Self {
        Workload {
            allocations: 10_000,
            object_size: 64,
            fields: 2,
            survival: 0.1,
            max_roots: 256,
            link_probability: 0.3,
            adaptive: false,
            seed: 42,
        }
    }
}

impl Workload {
    /// Checks probabilities and sizes.
    pub fn validate(&self) -> SimResult<()> {
        for (name, p) in [("survival", self.survival), ("link_probability", self.link_probability)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::Workload(format!("{} must be within [0, 1], got {}", name, p)));
            }
        }
        if self.object_size == 0 {
            return Err(SimError::Workload("object_size must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// FIFO window of rooted objects.
struct RootWindow {
    roots: VecDeque<ObjectId>,
    capacity: usize,
}

impl RootWindow {
    fn push(&mut self, id: ObjectId) {
        if self.capacity == 0 {
            return;
        }
        if self.roots.len() == self.capacity {
            self.roots.pop_front();
        }
        self.roots.push_back(id);
    }

    fn pick(&self, rng: &mut StdRng) -> Option<ObjectId> {
        if self.roots.is_empty() {
            return None;
        }
        self.roots.get(rng.random_range(0..self.roots.len())).copied()
    }
}

impl RootProvider for RootWindow {
    fn current_roots(&self) -> Vec<ObjectId> {
        self.roots.iter().copied().collect()
    }
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    /// Collector configuration used
    pub config: GcConfig,
    /// Workload parameters used
    pub workload: Workload,
    /// Promotion policy name
    pub policy: &'static str,
    /// Cumulative collector statistics
    pub stats: CollectorStats,
    /// Region occupancy at the end of the run
    pub heap: HeapStats,
    /// Write barrier counters
    pub barrier: BarrierSnapshot,
    /// Final promotion threshold
    pub promotion_threshold: u8,
    /// Every completed cycle in order
    pub cycles: Vec<CycleReport>,
}

impl SimReport {
    /// Serializes the report as pretty-printed JSON.
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats;
        writeln!(f, "allocations:        {}", self.workload.allocations)?;
        writeln!(f, "policy:             {} (final threshold {})", self.policy, self.promotion_threshold)?;
        writeln!(f, "minor cycles:       {}", stats.minor_cycles)?;
        writeln!(f, "major cycles:       {}", stats.major_cycles)?;
        writeln!(f, "total pause:        {:?}", stats.total_pause)?;
        writeln!(f, "max pause:          {:?}", stats.max_pause)?;
        writeln!(
            f,
            "reclaimed:          {} objects, {} bytes",
            stats.objects_reclaimed, stats.bytes_reclaimed
        )?;
        writeln!(f, "promoted:           {}", stats.objects_promoted)?;
        writeln!(f, "promotion failures: {}", stats.promotion_failures)?;
        writeln!(f, "last survival rate: {:.3}", stats.last_survival_rate)?;
        writeln!(
            f,
            "barrier:            {} stores, {} cards dirtied",
            self.barrier.invocations, self.barrier.cards_dirtied
        )?;
        writeln!(f, "live objects:       {}", self.heap.live_objects)?;
        writeln!(f, "eden:               {} / {} bytes", self.heap.eden_used, self.heap.eden_capacity)?;
        writeln!(
            f,
            "survivor:           {} / {} bytes",
            self.heap.survivor_used, self.heap.survivor_capacity
        )?;
        write!(f, "old:                {} / {} bytes", self.heap.old_used, self.heap.old_capacity)
    }
}

/// Runs `workload` against a fresh collector built from `config`.
pub fn run(config: GcConfig, workload: &Workload) -> SimResult<SimReport> {
    workload.validate()?;
    let mut collector = Collector::new(config.clone())?;
    if workload.adaptive {
        collector = collector.with_policy(AdaptivePromotion::default());
    }
    let log = EventLog::new();
    collector.add_sink(log.clone());

    let mut rng = StdRng::seed_from_u64(workload.seed);
    let mut roots = RootWindow {
        roots: VecDeque::with_capacity(workload.max_roots),
        capacity: workload.max_roots,
    };

    for _ in 0..workload.allocations {
        let id = collector.allocate(&roots, workload.object_size, workload.fields)?;
        if workload.fields > 0 && rng.random_bool(workload.link_probability) {
            if let Some(holder) = roots.pick(&mut rng) {
                let field = rng.random_range(0..workload.fields);
                collector.store(holder, field, Some(id))?;
            }
        }
        if rng.random_bool(workload.survival) {
            roots.push(id);
        }
        // Serve majors queued by old pressure or the cycle interval.
        collector.run_pending(&roots)?;
    }
    collector.request(CycleKind::Minor);
    collector.run_pending(&roots)?;

    let stats = collector.stats();
    info!(
        "workload finished: {} minor, {} major cycles",
        stats.minor_cycles, stats.major_cycles
    );
    Ok(SimReport {
        config,
        workload: workload.clone(),
        policy: collector.policy_name(),
        stats,
        heap: collector.heap().region_usage(),
        barrier: collector.heap().barrier_stats(),
        promotion_threshold: collector.heap().promotion_threshold(),
        cycles: log.reports(),
    })
}
