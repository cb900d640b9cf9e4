//! Allocation retry ladder: minor cycle, major cycle, then failure

use generational_gc::{
    Collector, CycleKind, EventLog, GcConfig, GcError, Generation, GenerationalHeap, RegionKind,
    RootSet, SimulatedMemory,
};

const OBJ: usize = 64;

/// Eden holds four objects, survivor regions hold none, Old holds two and
/// the provider has no room to grow it.
fn exhausted_collector() -> (Collector, EventLog) {
    let config = GcConfig::default()
        .with_eden_size(OBJ * 4)
        .with_survivor_ratio(8)
        .with_old_size(OBJ * 2)
        .with_verify_after_trace(true);
    let budget = OBJ * 4 + (OBJ / 2) * 2 + OBJ * 2;
    let provider = SimulatedMemory::with_budget(budget);
    let heap = GenerationalHeap::with_provider(config, Box::new(provider)).unwrap();
    let mut collector = Collector::with_heap(heap);
    let log = EventLog::new();
    collector.add_sink(log.clone());
    (collector, log)
}

/// Test: live data filling Eden and Old makes allocation fail after one minor and one major cycle
#[test]
fn test_allocation_failure_after_minor_and_major() {
    let (mut collector, log) = exhausted_collector();
    let mut roots = RootSet::new();

    // Two objects overflow straight into Old and fill it.
    for _ in 0..2 {
        let id = collector.allocate(&roots, OBJ, 0).unwrap();
        roots.insert(id);
    }
    collector.collect_minor(&roots).unwrap();
    assert_eq!(collector.heap().old_free(), 0);
    let old: Vec<_> = collector.heap().residents(RegionKind::Old);
    assert_eq!(old.len(), 2);

    // Four more fill Eden.
    for _ in 0..4 {
        let id = collector.allocate(&roots, OBJ, 0).unwrap();
        roots.insert(id);
    }
    log.clear();

    let err = collector.allocate(&roots, OBJ, 0).unwrap_err();

    assert_eq!(
        err,
        GcError::AllocationFailure {
            requested: OBJ,
            eden_free: 0,
            old_free: 0
        }
    );
    let kinds: Vec<CycleKind> = log.reports().iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![CycleKind::Minor, CycleKind::Major]);
    assert_eq!(collector.stats().allocation_failures, 1);
    assert_eq!(collector.stats().promotion_failures, 1);

    // Nothing was lost while trying.
    assert_eq!(collector.heap().object_count(), 6);
    assert!(old.iter().all(|&id| collector.heap().generation_of(id) == Some(Generation::Old)));
}

/// Test: the failure is not sticky once garbage appears
#[test]
fn test_allocation_recovers_after_roots_dropped() {
    let (mut collector, _log) = exhausted_collector();
    let mut roots = RootSet::new();
    for _ in 0..2 {
        let id = collector.allocate(&roots, OBJ, 0).unwrap();
        roots.insert(id);
    }
    collector.collect_minor(&roots).unwrap();
    let young: Vec<_> = (0..4)
        .map(|_| collector.allocate(&roots, OBJ, 0).unwrap())
        .collect();
    let mut all = roots.clone();
    for &id in &young {
        all.insert(id);
    }
    assert!(collector.allocate(&all, OBJ, 0).is_err());

    // Drop the young objects; the next allocation's minor cycle frees Eden.
    assert!(collector.allocate(&roots, OBJ, 0).is_ok());
    assert!(young.iter().all(|&id| !collector.heap().is_live(id)));
}

/// Test: a request larger than Eden fails without looping
#[test]
fn test_oversized_request_fails() {
    let mut collector = Collector::new(GcConfig::default().with_eden_size(1024)).unwrap();
    let err = collector.allocate(&RootSet::new(), 4096, 0).unwrap_err();

    assert!(matches!(
        err,
        GcError::AllocationFailure {
            requested: 4096,
            eden_free: 1024,
            ..
        }
    ));
    assert_eq!(collector.stats().minor_cycles, 1);
    assert_eq!(collector.stats().major_cycles, 1);
}
