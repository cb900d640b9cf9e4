//! Collection telemetry.
//!
//! Read-only signals for tuning policies and observability pipelines. The
//! collector emits a [`GcEvent`] at the start and end of every cycle to each
//! registered [`TelemetrySink`] and keeps cumulative [`CollectorStats`].

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Kind of collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CycleKind {
    Minor,
    Major,
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub kind: CycleKind,
    /// Sequence number across both kinds, starting at 1
    pub cycle: u64,
    /// Stop-the-world duration
    pub pause: Duration,
    pub bytes_reclaimed: usize,
    pub objects_reclaimed: usize,
    /// Fraction of young objects that survived; 0 for major cycles
    pub survival_rate: f64,
    /// Objects moved into Old
    pub promoted: usize,
    /// Tracer increments used
    pub trace_steps: usize,
}

/// A telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GcEvent {
    CycleStarted { kind: CycleKind, cycle: u64 },
    CycleFinished(CycleReport),
}

/// Receives telemetry events.
pub trait TelemetrySink: Send {
    fn record(&self, event: &GcEvent);
}

/// In-memory sink; clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<GcEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far.
    pub fn events(&self) -> Vec<GcEvent> {
        self.events.lock().clone()
    }

    /// Completed cycle reports in order.
    pub fn reports(&self) -> Vec<CycleReport> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                GcEvent::CycleFinished(report) => Some(report.clone()),
                GcEvent::CycleStarted { .. } => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TelemetrySink for EventLog {
    fn record(&self, event: &GcEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Cumulative collector statistics.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CollectorStats {
    pub minor_cycles: u64,
    pub major_cycles: u64,
    pub total_pause: Duration,
    pub max_pause: Duration,
    pub bytes_reclaimed: usize,
    pub objects_reclaimed: usize,
    pub objects_promoted: usize,
    /// Minor cycles in which Old could not take a promotion
    pub promotion_failures: u64,
    pub allocation_failures: u64,
    /// Requests dropped because an identical one was already pending
    pub coalesced_requests: u64,
    /// Accepted promotion threshold changes
    pub threshold_changes: u64,
    pub last_survival_rate: f64,
}

impl CollectorStats {
    /// Folds a finished cycle into the totals.
    pub fn record_cycle(&mut self, report: &CycleReport) {
        match report.kind {
            CycleKind::Minor => {
                self.minor_cycles += 1;
                self.last_survival_rate = report.survival_rate;
            }
            CycleKind::Major => self.major_cycles += 1,
        }
        self.total_pause += report.pause;
        self.max_pause = self.max_pause.max(report.pause);
        self.bytes_reclaimed += report.bytes_reclaimed;
        self.objects_reclaimed += report.objects_reclaimed;
        self.objects_promoted += report.promoted;
    }

    /// Total collection cycles of both kinds.
    pub fn cycles(&self) -> u64 {
        self.minor_cycles + self.major_cycles
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
