// Copyright (c) 2025 - Stichting Beep
//! Platform Composition
//!
//! Builds every stack of the platform, wires exports into the stacks that
//! consume them and orders the result for provisioning.
//!
//! ```text
//! Vpc ◀── Rds ◀── Api ◀── ApiPipelines
//!  ▲               │  ▲         │
//!  └───────────────┘  └── Ecr ◀─┘
//!
//! Ui ◀── UiCd          Identity
//! ```
//!
//! Dependency edges are declared explicitly. After all stacks are built,
//! every import a stack recorded must be covered by a (transitive) edge to
//! the producing stack, so the control plane never provisions a consumer
//! before its producer.

pub mod graph;

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::assembly::{CloudAssembly, StackArtifact};
use crate::compute::compute_stack;
use crate::config::PlatformConfig;
use crate::construct::{Environment, Stack};
use crate::database::database_stack;
use crate::errors::{InfrastructureError, InfrastructureResult};
use crate::identity::identity_stack;
use crate::network::network_stack;
use crate::pipeline::{api_pipeline_stack, ui_pipeline_stack};
use crate::registry::registry_stack;
use crate::site::site_stack;

pub use graph::DependencyGraph;

/// Stacks plus their declared dependency edges
#[derive(Debug, Clone)]
pub struct BeepPlatform {
    environment: Environment,
    graph: DependencyGraph,
    stacks: Vec<Stack>,
}

impl BeepPlatform {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            graph: DependencyGraph::new(),
            stacks: Vec::new(),
        }
    }

    /// Build and compose every stack of the platform
    pub fn synthesize(config: &PlatformConfig) -> InfrastructureResult<CloudAssembly> {
        config.validate()?;
        let mut platform = Self::new(config.environment());

        let network = network_stack(config)?;
        let registries = registry_stack(config)?;
        let database = database_stack(config, &network.exports)?;
        let compute = compute_stack(config, &network.exports, &registries, &database.exports)?;
        let pipelines = api_pipeline_stack(config, &registries, &compute.exports)?;
        let site = site_stack(config)?;
        let site_pipeline = ui_pipeline_stack(config, &site.exports)?;
        let identity = identity_stack(config)?;

        platform.add_stack(network.stack)?;
        platform.add_stack(registries.stack)?;
        platform.add_stack(database.stack)?;
        platform.add_dependency("Rds", "Vpc")?;
        platform.add_stack(compute.stack)?;
        platform.add_dependency("Api", "Vpc")?;
        platform.add_dependency("Api", "Ecr")?;
        platform.add_dependency("Api", "Rds")?;
        platform.add_stack(pipelines.stack)?;
        platform.add_dependency("ApiPipelines", "Api")?;
        platform.add_dependency("ApiPipelines", "Ecr")?;
        platform.add_stack(site.stack)?;
        platform.add_stack(site_pipeline.stack)?;
        platform.add_dependency("UiCd", "Ui")?;
        platform.add_stack(identity.stack)?;

        platform.assemble()
    }

    pub fn add_stack(&mut self, stack: Stack) -> InfrastructureResult<()> {
        self.graph.add_stack(stack.name())?;
        debug!(stack = %stack.name(), "Registered stack");
        self.stacks.push(stack);
        Ok(())
    }

    /// `dependent` is provisioned after `dependency`
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> InfrastructureResult<()> {
        self.graph.add_dependency(dependent, dependency)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Every import must follow a dependency path to its producer
    pub fn verify_imports(&self) -> InfrastructureResult<()> {
        for stack in &self.stacks {
            for producer in stack.imports() {
                if !self.graph.contains(producer) {
                    return Err(InfrastructureError::UnknownStack(producer.clone()));
                }
                if !self.graph.depends_on(stack.name(), producer) {
                    return Err(InfrastructureError::MissingDependency {
                        consumer: stack.name().to_string(),
                        producer: producer.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Order the stacks for provisioning and render their templates
    pub fn assemble(self) -> InfrastructureResult<CloudAssembly> {
        let order = self.graph.topological_order()?;
        self.verify_imports()?;

        let mut artifacts = Vec::with_capacity(order.len());
        for name in &order {
            let stack = self
                .stacks
                .iter()
                .find(|s| s.name() == name)
                .ok_or_else(|| InfrastructureError::UnknownStack(name.clone()))?;
            let dependencies = self
                .graph
                .dependencies_of(name)
                .into_iter()
                .map(str::to_string)
                .collect();

            let mut categories: BTreeMap<String, usize> = BTreeMap::new();
            for resource in stack.resources() {
                *categories
                    .entry(resource.resource_type().category().to_string())
                    .or_default() += 1;
            }
            debug!(stack = %name, ?categories, "Ordered stack");

            artifacts.push(StackArtifact::new(stack, dependencies));
        }

        let assembly = CloudAssembly::new(self.environment, artifacts);
        info!(
            assembly_id = %assembly.id,
            stacks = ?assembly.stack_names(),
            "Assembled platform"
        );
        Ok(assembly)
    }
}
