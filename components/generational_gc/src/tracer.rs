//! Tri-color reachability tracing.
//!
//! Objects are classified into three colors:
//! - **White**: Not yet visited (potentially garbage)
//! - **Gray**: Reached but fields not yet scanned (in the worklist)
//! - **Black**: Reached and fully scanned
//!
//! Colors live in a per-trace map that is discarded by [`TriColorTracer::finish`].
//! Absence from the map means White, so starting a trace never touches
//! the whole heap.
//!
//! Marking can run to completion with [`TriColorTracer::trace`] or in
//! bounded increments with [`TriColorTracer::step`]. Interleaving steps
//! with mutation is only sound if every store of a white object into a
//! black one is reported through [`TriColorTracer::shade`]; the
//! generational write barrier does not do this on its own.

use crate::error::{GcError, GcResult};
use crate::object::{ObjectGraph, ObjectId};
use crossbeam_deque::Worker;
use log::{debug, error};
use std::collections::{HashMap, HashSet};

/// Mark colors for tri-color marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriColor {
    /// Unmarked (not yet visited)
    White,
    /// In process (reachable, needs scanning)
    Gray,
    /// Fully processed (reachable, all references scanned)
    Black,
}

/// Restricts which objects a trace may enter.
///
/// Objects rejected by the limit are never colored, enqueued or reported.
/// Minor cycles use it to stop at the boundary of the young generation.
pub type ScanLimit<'a> = &'a dyn Fn(ObjectId) -> bool;

/// Counters for one trace.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TraceStats {
    /// Calls to `step` that did work
    pub steps: usize,
    /// Gray objects turned black
    pub objects_scanned: usize,
    /// Non-null reference fields examined
    pub edges_visited: usize,
}

/// Reachability marker with an explicit gray worklist.
pub struct TriColorTracer {
    /// Colors for the current trace; absent entries are white
    colors: HashMap<ObjectId, TriColor>,
    /// Gray objects awaiting scanning, processed breadth-first
    worklist: Worker<ObjectId>,
    /// Number of gray objects in the worklist
    pending: usize,
    stats: TraceStats,
}

impl TriColorTracer {
    pub fn new() -> Self {
        TriColorTracer {
            colors: HashMap::new(),
            worklist: Worker::new_fifo(),
            pending: 0,
            stats: TraceStats::default(),
        }
    }

    /// Marks everything reachable from `roots` and returns the reachable set.
    ///
    /// The graph must not change while this runs.
    pub fn trace<G, I>(
        &mut self,
        roots: I,
        limit: Option<ScanLimit<'_>>,
        graph: &G,
    ) -> HashSet<ObjectId>
    where
        G: ObjectGraph + ?Sized,
        I: IntoIterator<Item = ObjectId>,
    {
        self.start(roots, limit);
        while self.step(usize::MAX, graph, limit) {}
        self.finish()
    }

    /// Begins a new trace: every object is white, the roots are grayed.
    pub fn start<I>(&mut self, roots: I, limit: Option<ScanLimit<'_>>)
    where
        I: IntoIterator<Item = ObjectId>,
    {
        self.reset();
        for root in roots {
            if admitted(limit, root) && self.color_of(root) == TriColor::White {
                self.gray(root);
            }
        }
        debug!("trace started with {} gray roots", self.pending);
    }

    /// Scans at most `budget` gray objects.
    ///
    /// Returns true while gray objects remain.
    pub fn step<G>(&mut self, budget: usize, graph: &G, limit: Option<ScanLimit<'_>>) -> bool
    where
        G: ObjectGraph + ?Sized,
    {
        let mut scanned = 0;
        while scanned < budget {
            let Some(obj) = self.worklist.pop() else {
                break;
            };
            self.pending -= 1;

            for child in graph.references_of(obj).iter().flatten().copied() {
                self.stats.edges_visited += 1;
                if admitted(limit, child) && self.color_of(child) == TriColor::White {
                    self.gray(child);
                }
            }
            self.colors.insert(obj, TriColor::Black);
            scanned += 1;
        }

        if scanned > 0 {
            self.stats.steps += 1;
            self.stats.objects_scanned += scanned;
        }
        self.pending > 0
    }

    /// Current color of `id` in this trace.
    pub fn color_of(&self, id: ObjectId) -> TriColor {
        self.colors.get(&id).copied().unwrap_or(TriColor::White)
    }

    /// Shades `id` gray so it is (re)scanned.
    ///
    /// This is the re-gray rule an incremental or concurrent barrier must
    /// apply when a white object is stored into a black one. Returns true
    /// if the color changed.
    pub fn shade(&mut self, id: ObjectId) -> bool {
        if self.color_of(id) == TriColor::Gray {
            return false;
        }
        self.gray(id);
        true
    }

    /// Checks that no black object references a white one.
    ///
    /// Only meaningful once marking has finished.
    pub fn verify<G>(&self, graph: &G, limit: Option<ScanLimit<'_>>) -> GcResult<()>
    where
        G: ObjectGraph + ?Sized,
    {
        for (&holder, &color) in &self.colors {
            if color != TriColor::Black {
                continue;
            }
            for target in graph.references_of(holder).iter().flatten().copied() {
                if admitted(limit, target) && self.color_of(target) == TriColor::White {
                    error!(
                        "black {:?} references white {:?}; a store bypassed the write barrier",
                        holder, target
                    );
                    return Err(GcError::InvariantViolation { holder, target });
                }
            }
        }
        Ok(())
    }

    /// Ends the trace and returns every reached object.
    ///
    /// The color map is discarded. Objects still gray are reported as
    /// reachable.
    pub fn finish(&mut self) -> HashSet<ObjectId> {
        if self.pending > 0 {
            debug!("trace finished with {} gray objects unscanned", self.pending);
        }
        let reachable = self.colors.drain().map(|(id, _)| id).collect();
        self.drain_worklist();
        reachable
    }

    /// Counters of the current or last trace.
    pub fn stats(&self) -> &TraceStats {
        &self.stats
    }

    fn gray(&mut self, id: ObjectId) {
        self.colors.insert(id, TriColor::Gray);
        self.worklist.push(id);
        self.pending += 1;
    }

    fn reset(&mut self) {
        self.colors.clear();
        self.drain_worklist();
        self.stats = TraceStats::default();
    }

    fn drain_worklist(&mut self) {
        while self.worklist.pop().is_some() {}
        self.pending = 0;
    }
}

impl Default for TriColorTracer {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn admitted(limit: Option<ScanLimit<'_>>, id: ObjectId) -> bool {
    limit.map_or(true, |allow| allow(id))
}
