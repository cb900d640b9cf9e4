//! Property tests for TriColorTracer
//!
//! Random small graphs are traced and compared with an independent
//! reachability computation.

use generational_gc::{ObjectGraph, ObjectId, ScanLimit, TriColor, TriColorTracer};
use proptest::prelude::*;
use std::collections::HashSet;

/// Adjacency-list graph; node `i` is `ObjectId::new(i, 0)`.
#[derive(Debug, Clone)]
struct Graph {
    edges: Vec<Vec<Option<ObjectId>>>,
}

impl ObjectGraph for Graph {
    fn references_of(&self, id: ObjectId) -> &[Option<ObjectId>] {
        self.edges
            .get(id.slot() as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn size_of(&self, _id: ObjectId) -> usize {
        16
    }
}

fn node(i: usize) -> ObjectId {
    ObjectId::new(i as u32, 0)
}

/// Recursive depth-first closure, deliberately unlike the tracer's queue.
fn reference_reachable(graph: &Graph, roots: &[ObjectId]) -> HashSet<ObjectId> {
    fn visit(graph: &Graph, id: ObjectId, seen: &mut HashSet<ObjectId>) {
        if !seen.insert(id) {
            return;
        }
        for target in graph.references_of(id).iter().flatten() {
            visit(graph, *target, seen);
        }
    }

    let mut seen = HashSet::new();
    for &root in roots {
        visit(graph, root, &mut seen);
    }
    seen
}

fn graph_strategy() -> impl Strategy<Value = (Graph, Vec<ObjectId>)> {
    (1usize..24).prop_flat_map(|n| {
        let field = prop::option::weighted(0.7, (0..n).prop_map(node));
        let edges = prop::collection::vec(prop::collection::vec(field, 0..4), n);
        let roots = prop::collection::vec((0..n).prop_map(node), 0..4);
        (edges.prop_map(|edges| Graph { edges }), roots)
    })
}

proptest! {
    #[test]
    fn trace_matches_reference_reachability((graph, roots) in graph_strategy()) {
        let mut tracer = TriColorTracer::new();
        let reachable = tracer.trace(roots.iter().copied(), None, &graph);
        prop_assert_eq!(reachable, reference_reachable(&graph, &roots));
    }

    #[test]
    fn trace_is_idempotent((graph, roots) in graph_strategy()) {
        let mut tracer = TriColorTracer::new();
        let first = tracer.trace(roots.iter().copied(), None, &graph);
        let second = tracer.trace(roots.iter().copied(), None, &graph);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn incremental_steps_reach_the_same_set(
        (graph, roots) in graph_strategy(),
        budget in 1usize..5,
    ) {
        let mut tracer = TriColorTracer::new();
        tracer.start(roots.iter().copied(), None);
        while tracer.step(budget, &graph, None) {}
        prop_assert!(tracer.verify(&graph, None).is_ok());
        prop_assert_eq!(tracer.finish(), reference_reachable(&graph, &roots));
    }

    #[test]
    fn every_reached_object_scanned_once((graph, roots) in graph_strategy()) {
        let mut tracer = TriColorTracer::new();
        let reachable = tracer.trace(roots.iter().copied(), None, &graph);
        prop_assert_eq!(tracer.stats().objects_scanned, reachable.len());
    }

    #[test]
    fn scan_limit_never_reports_excluded_objects((graph, roots) in graph_strategy()) {
        let even: ScanLimit<'_> = &|id: ObjectId| id.slot() % 2 == 0;
        let mut tracer = TriColorTracer::new();
        let reachable = tracer.trace(roots.iter().copied(), Some(even), &graph);
        prop_assert!(reachable.iter().all(|id| id.slot() % 2 == 0));
    }
}

#[test]
fn test_disconnected_components_and_self_loop() {
    let graph = Graph {
        edges: vec![
            vec![Some(node(0)), Some(node(1))],
            vec![None],
            vec![Some(node(3))],
            vec![Some(node(2))],
        ],
    };
    let mut tracer = TriColorTracer::new();
    let reachable = tracer.trace([node(0)], None, &graph);
    assert_eq!(reachable, [node(0), node(1)].into_iter().collect());
    assert_eq!(tracer.color_of(node(0)), TriColor::White);
}
