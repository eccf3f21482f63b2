// Copyright (c) 2025 - Stichting Beep
//! Property-Based Tests for Stack Dependency Ordering

use beep_infrastructure::{DependencyGraph, InfrastructureError};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Stack count, registration order and acyclic edges `(dependent, dependency)`
///
/// Edges only point from a higher to a lower stack index, so the graph is
/// acyclic whatever order the stacks are registered in.
fn dag() -> impl Strategy<Value = (usize, Vec<usize>, Vec<(usize, usize)>)> {
    (1usize..12).prop_flat_map(|n| {
        let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
        let edges = prop::collection::vec((0..n, 0..n), 0..n * 2).prop_map(|pairs| {
            pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| if a > b { (a, b) } else { (b, a) })
                .collect::<Vec<_>>()
        });
        (Just(n), order, edges)
    })
}

fn name(index: usize) -> String {
    format!("Stack{index}")
}

fn build(order: &[usize], edges: &[(usize, usize)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for &index in order {
        graph.add_stack(&name(index)).expect("unique stack");
    }
    for &(dependent, dependency) in edges {
        graph
            .add_dependency(&name(dependent), &name(dependency))
            .expect("known stacks");
    }
    graph
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: Every stack comes after all of its dependencies
    #[test]
    fn prop_order_respects_edges((n, order, edges) in dag()) {
        let graph = build(&order, &edges);
        let sorted = graph.topological_order().expect("acyclic graph");

        prop_assert_eq!(sorted.len(), n);
        let position = |index: usize| sorted.iter().position(|s| *s == name(index));
        for &(dependent, dependency) in &edges {
            prop_assert!(position(dependency) < position(dependent));
        }
    }

    /// Property: Without edges the registration order is kept
    #[test]
    fn prop_registration_order_without_edges((_n, order, _edges) in dag()) {
        let graph = build(&order, &[]);
        let expected: Vec<String> = order.iter().map(|&i| name(i)).collect();
        prop_assert_eq!(graph.topological_order().expect("no edges"), expected);
    }

    /// Property: Every direct edge is also a transitive dependency
    #[test]
    fn prop_edges_imply_dependency((_n, order, edges) in dag()) {
        let graph = build(&order, &edges);
        for &(dependent, dependency) in &edges {
            prop_assert!(graph.depends_on(&name(dependent), &name(dependency)));
            prop_assert!(!graph.depends_on(&name(dependency), &name(dependent)));
        }
    }

    /// Property: Closing any path into a loop is reported as a cycle
    #[test]
    fn prop_back_edge_is_a_cycle((_n, order, edges) in dag()) {
        prop_assume!(!edges.is_empty());
        let (dependent, dependency) = edges[0];

        let mut graph = build(&order, &edges);
        graph
            .add_dependency(&name(dependency), &name(dependent))
            .expect("known stacks");

        match graph.topological_order() {
            Err(InfrastructureError::DependencyCycle(stuck)) => {
                prop_assert!(stuck.contains(&name(dependent)));
                prop_assert!(stuck.contains(&name(dependency)));
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other),
        }
    }
}
