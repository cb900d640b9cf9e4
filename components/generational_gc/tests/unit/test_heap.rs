//! Unit tests for GenerationalHeap invariants across many cycles

use generational_gc::{
    GcConfig, Generation, GenerationalHeap, ObjectGraph, ObjectId, RegionKind, TriColorTracer,
    MAX_AGE,
};
use proptest::prelude::*;
use std::collections::HashMap;

const OBJ: usize = 32;

fn config(threshold: u8) -> GcConfig {
    GcConfig::default()
        .with_eden_size(OBJ * 32)
        .with_survivor_ratio(2)
        .with_old_size(OBJ * 64)
        .with_card_size(64)
        .with_promotion_threshold(threshold)
        .with_verify_after_trace(true)
}

#[derive(Debug, Clone)]
enum Op {
    Allocate,
    Link(usize, usize),
    Unroot(usize),
    Minor,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Allocate),
        3 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Link(a, b)),
        1 => any::<usize>().prop_map(Op::Unroot),
        2 => Just(Op::Minor),
    ]
}

proptest! {
    #[test]
    fn generations_never_move_backwards(
        threshold in 2u8..=6,
        ops in prop::collection::vec(op_strategy(), 1..80),
    ) {
        // Survivor space holds all of Eden, so nothing overflows into Old early.
        let config = config(threshold)
            .with_survivor_ratio(1)
            .with_survivor_occupancy_limit(1.0);
        let mut heap = GenerationalHeap::new(config).unwrap();
        let mut tracer = TriColorTracer::new();
        let mut roots: Vec<ObjectId> = Vec::new();
        let mut objects: Vec<ObjectId> = Vec::new();
        let mut last_seen: HashMap<ObjectId, (Generation, u8)> = HashMap::new();

        for op in ops {
            match op {
                Op::Allocate => {
                    let young = objects
                        .iter()
                        .filter(|&&id| heap.generation_of(id).is_some_and(Generation::is_young))
                        .count();
                    if young >= 32 {
                        continue;
                    }
                    if let Some(id) = heap.try_allocate(OBJ, 2) {
                        roots.push(id);
                        objects.push(id);
                    }
                }
                Op::Link(a, b) if !objects.is_empty() => {
                    let holder = objects[a % objects.len()];
                    let target = objects[b % objects.len()];
                    if heap.is_live(holder) && heap.is_live(target) {
                        heap.store(holder, a % 2, Some(target)).unwrap();
                    }
                }
                Op::Unroot(i) if !roots.is_empty() => {
                    let index = i % roots.len();
                    roots.swap_remove(index);
                }
                Op::Minor => {
                    let outcome = heap.minor_collect(&mut tracer, &roots).unwrap();
                    prop_assert!(!outcome.promotion_failed);
                    for (&id, &(before, age_before)) in &last_seen {
                        let Some(info) = heap.info(id) else { continue };
                        prop_assert!(info.generation >= before);
                        prop_assert!(info.age <= MAX_AGE);
                        if before.is_young() {
                            let aged = age_before + 1;
                            // Promoted exactly when the new age reaches the threshold.
                            prop_assert_eq!(info.generation == Generation::Old, aged >= threshold);
                            prop_assert_eq!(info.age, aged);
                        }
                    }
                }
                _ => {}
            }
            last_seen = objects
                .iter()
                .filter_map(|&id| heap.info(id).map(|info| (id, (info.generation, info.age))))
                .collect();
        }
    }

    #[test]
    fn rooted_objects_survive_minor_cycles(count in 1usize..24, cycles in 1usize..8) {
        let mut heap = GenerationalHeap::new(config(6)).unwrap();
        let mut tracer = TriColorTracer::new();
        let roots: Vec<ObjectId> = (0..count).filter_map(|_| heap.try_allocate(OBJ, 0)).collect();
        for _ in 0..cycles {
            heap.minor_collect(&mut tracer, &roots).unwrap();
        }
        prop_assert!(roots.iter().all(|&id| heap.is_live(id)));
        prop_assert_eq!(heap.object_count(), roots.len());
    }
}

#[test]
fn test_relocation_preserves_references() {
    let mut heap = GenerationalHeap::new(config(2)).unwrap();
    let mut tracer = TriColorTracer::new();
    let garbage = heap.try_allocate(OBJ, 0).unwrap();
    let parent = heap.try_allocate(OBJ, 1).unwrap();
    let child = heap.try_allocate(OBJ, 0).unwrap();
    heap.store(parent, 0, Some(child)).unwrap();
    let before = heap.address_of(parent).unwrap();

    heap.minor_collect(&mut tracer, &[parent]).unwrap();
    heap.minor_collect(&mut tracer, &[parent]).unwrap();

    assert!(!heap.is_live(garbage));
    assert_ne!(heap.address_of(parent), Some(before));
    assert_eq!(heap.info(parent).unwrap().region, RegionKind::Old);
    assert_eq!(heap.load(parent, 0).unwrap(), Some(child));
    assert_eq!(heap.references_of(parent), &[Some(child)]);
}

#[test]
fn test_survival_stats_reported() {
    let mut heap = GenerationalHeap::new(config(6)).unwrap();
    let mut tracer = TriColorTracer::new();
    let roots: Vec<ObjectId> = (0..4).map(|_| heap.try_allocate(OBJ, 0).unwrap()).collect();
    for _ in 0..4 {
        heap.try_allocate(OBJ, 0).unwrap();
    }

    heap.minor_collect(&mut tracer, &roots).unwrap();

    let stats = heap.survival_stats();
    assert_eq!(stats.young_before, 8);
    assert_eq!(stats.survived, 4);
    assert_eq!(stats.promoted, 0);
    assert!((stats.rate - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_major_after_minor_keeps_card_table_consistent() {
    let mut heap = GenerationalHeap::new(config(2)).unwrap();
    let mut tracer = TriColorTracer::new();
    let dead_old = heap.try_allocate(OBJ, 0).unwrap();
    let holder = heap.try_allocate(OBJ, 1).unwrap();
    heap.minor_collect(&mut tracer, &[dead_old, holder]).unwrap();
    heap.minor_collect(&mut tracer, &[dead_old, holder]).unwrap();

    let young = heap.try_allocate(OBJ, 0).unwrap();
    heap.store(holder, 0, Some(young)).unwrap();
    let outcome = heap.major_collect(&mut tracer, &[holder]).unwrap();

    // holder slid down over dead_old; its new card is the dirty one.
    assert_eq!(outcome.objects_reclaimed, 1);
    let address = heap.address_of(holder).unwrap();
    assert_eq!(address, heap.region(RegionKind::Old).base());
    let card = heap.card_table().card_of(address).unwrap();
    assert_eq!(heap.card_table().dirty_cards(), vec![card]);

    heap.minor_collect(&mut tracer, &[]).unwrap();
    assert!(heap.is_live(young));
}
