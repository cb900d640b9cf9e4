//! End-to-end collection scenarios
//!
//! Drives the Collector through minor and major cycles and checks where
//! objects end up.

use generational_gc::{
    Collector, CycleKind, EventLog, GcConfig, GcEvent, Generation, ObjectId, RegionKind, RootSet,
};

const OBJ: usize = 64;

fn config() -> GcConfig {
    GcConfig::default()
        .with_eden_size(OBJ * 10)
        .with_survivor_ratio(2)
        .with_old_size(OBJ * 32)
        .with_verify_after_trace(true)
}

/// Test: ten objects in a ten-object Eden, only #0 rooted
#[test]
fn test_minor_reclaims_all_but_rooted_object() {
    let mut collector = Collector::new(config()).unwrap();
    let mut roots = RootSet::new();
    let objects: Vec<ObjectId> = (0..10)
        .map(|_| collector.allocate(&roots, OBJ, 1).unwrap())
        .collect();
    roots.insert(objects[0]);
    assert_eq!(collector.heap().eden_free(), 0);

    let report = collector.collect_minor(&roots).unwrap();

    assert_eq!(report.objects_reclaimed, 9);
    assert_eq!(report.bytes_reclaimed, 9 * OBJ);
    let info = collector.heap().info(objects[0]).unwrap();
    assert_eq!(info.generation, Generation::Survivor);
    assert_eq!(info.age, 1);
    assert!(objects[1..].iter().all(|&id| !collector.heap().is_live(id)));
    assert_eq!(collector.heap().region_usage().eden_used, 0);
}

/// Test: the eleventh allocation triggers the same minor cycle implicitly
#[test]
fn test_eden_exhaustion_triggers_minor() {
    let mut collector = Collector::new(config()).unwrap();
    let log = EventLog::new();
    collector.add_sink(log.clone());
    let mut roots = RootSet::new();
    let first = collector.allocate(&roots, OBJ, 0).unwrap();
    roots.insert(first);
    for _ in 0..9 {
        collector.allocate(&roots, OBJ, 0).unwrap();
    }
    assert!(log.is_empty());

    collector.allocate(&roots, OBJ, 0).unwrap();

    assert_eq!(
        log.events()[0],
        GcEvent::CycleStarted {
            kind: CycleKind::Minor,
            cycle: 1
        }
    );
    assert_eq!(log.reports()[0].objects_reclaimed, 9);
    assert_eq!(collector.heap().age_of(first), Some(1));
}

/// Test: a rooted object reaches Old after exactly six minor cycles
#[test]
fn test_promotion_after_six_cycles() {
    let mut collector = Collector::new(config()).unwrap();
    let mut roots = RootSet::new();
    let id = collector.allocate(&roots, OBJ, 0).unwrap();
    roots.insert(id);

    for cycle in 1..=5u8 {
        collector.collect_minor(&roots).unwrap();
        assert_eq!(collector.heap().generation_of(id), Some(Generation::Survivor));
        assert_eq!(collector.heap().age_of(id), Some(cycle));
    }
    let report = collector.collect_minor(&roots).unwrap();

    assert_eq!(report.promoted, 1);
    assert_eq!(collector.heap().generation_of(id), Some(Generation::Old));
    assert_eq!(collector.heap().info(id).unwrap().region, RegionKind::Old);
    assert_eq!(collector.stats().objects_promoted, 1);
}

/// Test: an unreachable cycle in Old is reclaimed by a major cycle
#[test]
fn test_major_reclaims_unreachable_cycle() {
    let config = config().with_promotion_threshold(2);
    let mut collector = Collector::new(config).unwrap();
    let mut roots = RootSet::new();
    let a = collector.allocate(&roots, OBJ, 1).unwrap();
    let b = collector.allocate(&roots, OBJ, 1).unwrap();
    collector.store(a, 0, Some(b)).unwrap();
    collector.store(b, 0, Some(a)).unwrap();
    roots.insert(a);
    collector.collect_minor(&roots).unwrap();
    collector.collect_minor(&roots).unwrap();
    assert_eq!(collector.heap().generation_of(a), Some(Generation::Old));
    assert_eq!(collector.heap().generation_of(b), Some(Generation::Old));

    roots.remove(a);
    // Minor cycles never look at Old garbage.
    collector.collect_minor(&roots).unwrap();
    assert!(collector.heap().is_live(a));

    let report = collector.collect_major(&roots).unwrap();

    assert_eq!(report.objects_reclaimed, 2);
    assert!(!collector.heap().is_live(a));
    assert!(!collector.heap().is_live(b));
    assert_eq!(collector.heap().region_usage().old_used, 0);
}

/// Test: a young unreachable cycle is reclaimed by a minor cycle
#[test]
fn test_minor_reclaims_young_cycle() {
    let mut collector = Collector::new(config()).unwrap();
    let roots = RootSet::new();
    let a = collector.allocate(&roots, OBJ, 1).unwrap();
    let b = collector.allocate(&roots, OBJ, 1).unwrap();
    collector.store(a, 0, Some(b)).unwrap();
    collector.store(b, 0, Some(a)).unwrap();

    let report = collector.collect_minor(&roots).unwrap();

    assert_eq!(report.objects_reclaimed, 2);
}

/// Test: generations only move forward across a long run
#[test]
fn test_generation_monotonic_over_many_cycles() {
    let config = config().with_promotion_threshold(3);
    let mut collector = Collector::new(config).unwrap();
    let mut roots = RootSet::new();
    let mut tracked: Vec<(ObjectId, Generation)> = Vec::new();

    for round in 0..40 {
        let id = collector.allocate(&roots, OBJ, 0).unwrap();
        if round % 3 == 0 {
            roots.insert(id);
            tracked.push((id, Generation::Eden));
        }
        for (id, last) in tracked.iter_mut() {
            let generation = collector.heap().generation_of(*id).unwrap();
            assert!(generation >= *last);
            assert!(collector.heap().age_of(*id).unwrap() <= 3);
            *last = generation;
        }
    }
    assert!(collector.stats().minor_cycles > 0);
}
