//! Generational GC - Garbage collector core for a managed-object heap
//!
//! This component provides:
//! - Tri-color reachability tracing with incremental stepping
//! - Generational heap (Eden, two survivor regions, Old) with age-based promotion
//! - Card table and write barrier for old-to-young reference tracking
//! - Minor and major collection cycles with Old compaction
//! - Collection orchestration with coalesced requests and an allocation retry ladder
//! - Pluggable promotion tuning and cycle telemetry
//!
//! Objects are referred to by [`ObjectId`] handles into a forwarding table,
//! so relocation never invalidates a reference held by the mutator. Field
//! stores go through [`GenerationalHeap::store`], which runs the write
//! barrier.

pub mod card_table;
pub mod collector;
pub mod config;
pub mod error;
pub mod heap;
pub mod object;
pub mod policy;
pub mod region;
pub mod telemetry;
pub mod tracer;
pub mod write_barrier;

// Re-export main types
pub use card_table::{CardScanView, CardTable, DEFAULT_CARD_SIZE};
pub use collector::{Collector, CollectorHandle, CollectorState, PendingRequests, SharedCollector};
pub use config::GcConfig;
pub use error::{GcError, GcResult};
pub use heap::{GenerationalHeap, HeapStats, MajorOutcome, MinorOutcome, ObjectInfo, SurvivalStats};
pub use object::{Generation, ObjectGraph, ObjectId, RootProvider, RootSet, MAX_AGE};
pub use policy::{AdaptivePromotion, FixedPromotion, PromotionPolicy};
pub use region::{MemoryProvider, Region, RegionKind, Relocation, SimulatedMemory};
pub use telemetry::{CollectorStats, CycleKind, CycleReport, EventLog, GcEvent, TelemetrySink};
pub use tracer::{ScanLimit, TraceStats, TriColor, TriColorTracer};
pub use write_barrier::{BarrierSnapshot, BarrierStats, WriteBarrier};
