// Copyright (c) 2025 - Stichting Beep
//! Stack dependency graph
//!
//! Nodes are stack names, an edge `dependent → dependency` means the
//! dependency must be provisioned first. The graph only ever answers two
//! questions: in which order can the stacks be provisioned, and does one stack
//! (transitively) wait for another.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::errors::{InfrastructureError, InfrastructureResult};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Stacks in registration order
    stacks: Vec<String>,
    dependencies: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stack(&mut self, name: &str) -> InfrastructureResult<()> {
        if self.dependencies.contains_key(name) {
            return Err(InfrastructureError::DuplicateStack(name.to_string()));
        }
        self.stacks.push(name.to_string());
        self.dependencies.insert(name.to_string(), BTreeSet::new());
        Ok(())
    }

    /// Record that `dependent` must wait for `dependency`
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> InfrastructureResult<()> {
        if !self.dependencies.contains_key(dependency) {
            return Err(InfrastructureError::UnknownStack(dependency.to_string()));
        }
        let edges = self
            .dependencies
            .get_mut(dependent)
            .ok_or_else(|| InfrastructureError::UnknownStack(dependent.to_string()))?;
        edges.insert(dependency.to_string());

        debug!(dependent, dependency, "Added stack dependency");
        Ok(())
    }

    pub fn stacks(&self) -> &[String] {
        &self.stacks
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    /// Direct dependencies of a stack, sorted by name
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.dependencies
            .get(name)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether `dependent` waits for `dependency` through any chain of edges
    pub fn depends_on(&self, dependent: &str, dependency: &str) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![dependent];

        while let Some(current) = pending.pop() {
            let Some(edges) = self.dependencies.get(current) else {
                continue;
            };
            for next in edges {
                if next == dependency {
                    return true;
                }
                if visited.insert(next.as_str()) {
                    pending.push(next);
                }
            }
        }

        false
    }

    /// Provisioning order
    ///
    /// Kahn's algorithm: a stack becomes ready once all its dependencies are
    /// ordered; among ready stacks the earliest registered goes first. Fails
    /// with the stacks left over when they wait on each other.
    pub fn topological_order(&self) -> InfrastructureResult<Vec<String>> {
        let mut remaining: HashMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();
        let mut ordered: Vec<String> = Vec::with_capacity(self.stacks.len());

        while ordered.len() < self.stacks.len() {
            let next = self
                .stacks
                .iter()
                .find(|name| remaining.get(name.as_str()) == Some(&0));

            let Some(next) = next else {
                let stuck = self
                    .stacks
                    .iter()
                    .filter(|name| remaining.contains_key(name.as_str()))
                    .cloned()
                    .collect();
                return Err(InfrastructureError::DependencyCycle(stuck));
            };

            remaining.remove(next.as_str());
            for (name, deps) in &self.dependencies {
                if deps.contains(next) {
                    if let Some(count) = remaining.get_mut(name.as_str()) {
                        *count -= 1;
                    }
                }
            }
            ordered.push(next.clone());
        }

        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(stacks: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for stack in stacks {
            graph.add_stack(stack).unwrap();
        }
        for (dependent, dependency) in edges {
            graph.add_dependency(dependent, dependency).unwrap();
        }
        graph
    }

    #[test]
    fn test_order_respects_edges_and_registration() {
        let graph = graph(
            &["Vpc", "Ecr", "Rds", "Api", "ApiPipelines", "Ui", "UiCd"],
            &[
                ("Rds", "Vpc"),
                ("Api", "Vpc"),
                ("Api", "Ecr"),
                ("Api", "Rds"),
                ("ApiPipelines", "Api"),
                ("UiCd", "Ui"),
            ],
        );

        assert_eq!(
            graph.topological_order().unwrap(),
            vec!["Vpc", "Ecr", "Rds", "Api", "ApiPipelines", "Ui", "UiCd"]
        );
    }

    #[test]
    fn test_dependency_registered_later_goes_first() {
        let graph = graph(&["UiCd", "Ui"], &[("UiCd", "Ui")]);
        assert_eq!(graph.topological_order().unwrap(), vec!["Ui", "UiCd"]);
    }

    #[test]
    fn test_cycle_reports_stuck_stacks() {
        let graph = graph(
            &["Vpc", "Api", "ApiPipelines"],
            &[("Api", "ApiPipelines"), ("ApiPipelines", "Api")],
        );
        match graph.topological_order() {
            Err(InfrastructureError::DependencyCycle(stacks)) => {
                assert_eq!(stacks, vec!["Api", "ApiPipelines"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_and_unknown_stacks() {
        let mut graph = graph(&["Vpc"], &[]);
        assert!(matches!(
            graph.add_stack("Vpc"),
            Err(InfrastructureError::DuplicateStack(_))
        ));
        assert!(matches!(
            graph.add_dependency("Rds", "Vpc"),
            Err(InfrastructureError::UnknownStack(name)) if name == "Rds"
        ));
        assert!(matches!(
            graph.add_dependency("Vpc", "Ecr"),
            Err(InfrastructureError::UnknownStack(name)) if name == "Ecr"
        ));
    }

    #[test]
    fn test_transitive_dependency() {
        let graph = graph(
            &["Vpc", "Rds", "Api", "Ui"],
            &[("Rds", "Vpc"), ("Api", "Rds")],
        );
        assert!(graph.depends_on("Api", "Vpc"));
        assert!(graph.depends_on("Api", "Rds"));
        assert!(!graph.depends_on("Vpc", "Api"));
        assert!(!graph.depends_on("Ui", "Vpc"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let graph = graph(&["Api"], &[("Api", "Api")]);
        assert!(matches!(
            graph.topological_order(),
            Err(InfrastructureError::DependencyCycle(_))
        ));
    }
}
