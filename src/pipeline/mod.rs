// Copyright (c) 2025 - Stichting Beep
//! Delivery Pipelines
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Stages run one after the
//! other; inside a stage actions run by ascending run order, actions with the
//! same run order in parallel. Actions hand work to each other through named
//! [`Artifact`]s.
//!
//! ```text
//! Source ──▶ BuildTestImage ──▶ BuildProductionImages ──▶ DeployToProduction
//!  api-src      api-test          api-prod (1)                nginx-prod ─▶ apiService
//!  nginx-src                      nginx-prod (2, + api-prod)
//! ```
//!
//! [`Pipeline::validate`] checks that this hand-off is satisfiable before
//! anything is synthesized: an artifact is consumed only after the action
//! producing it has run.

pub mod build;
pub mod definitions;
pub mod synth;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::domain::ValidationError;

pub use build::{BuildProject, BuildSpec};
pub use definitions::{api_pipeline_stack, ui_pipeline_stack, ApiPipelineStack, UiPipelineStack};
pub use synth::PipelineSynth;

/// Named hand-off between actions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artifact(String);

impl Artifact {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an action does
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Pull a source-control repository on push
    Source { repository: String },
    /// Run a build project
    Build { project: String },
    /// Roll a container service to the images listed in the input
    EcsDeploy { cluster: Value, service: Value },
    /// Copy the input into a bucket
    S3Deploy { bucket: Value, extract: bool },
}

impl ActionKind {
    pub fn is_source(&self) -> bool {
        matches!(self, ActionKind::Source { .. })
    }

    /// `(category, owner, provider)` of the action type
    pub fn action_type(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            ActionKind::Source { .. } => ("Source", "ThirdParty", "GitHub"),
            ActionKind::Build { .. } => ("Build", "AWS", "CodeBuild"),
            ActionKind::EcsDeploy { .. } => ("Deploy", "AWS", "ECS"),
            ActionKind::S3Deploy { .. } => ("Deploy", "AWS", "S3"),
        }
    }
}

/// Single step of a stage
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    pub inputs: Vec<Artifact>,
    pub outputs: Vec<Artifact>,
    pub run_order: u32,
}

impl Action {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            run_order: 1,
        }
    }

    /// Source action producing `output`
    pub fn source(name: impl Into<String>, repository: impl Into<String>, output: &Artifact) -> Self {
        Self::new(
            name,
            ActionKind::Source {
                repository: repository.into(),
            },
        )
        .output(output)
    }

    /// Build action consuming `input`
    pub fn build(name: impl Into<String>, project: &BuildProject, input: &Artifact) -> Self {
        Self::new(
            name,
            ActionKind::Build {
                project: project.logical_id().to_string(),
            },
        )
        .input(input)
    }

    pub fn input(mut self, artifact: &Artifact) -> Self {
        self.inputs.push(artifact.clone());
        self
    }

    pub fn output(mut self, artifact: &Artifact) -> Self {
        self.outputs.push(artifact.clone());
        self
    }

    pub fn run_order(mut self, run_order: u32) -> Self {
        self.run_order = run_order;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub name: String,
    pub restart_execution_on_update: bool,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            restart_execution_on_update: true,
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// All actions in execution order
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.stages.iter().flat_map(|s| s.actions.iter())
    }

    pub fn source_actions(&self) -> impl Iterator<Item = &Action> {
        self.actions().filter(|a| a.kind.is_source())
    }

    pub fn find_action(&self, name: &str) -> Option<&Action> {
        self.actions().find(|a| a.name == name)
    }

    /// Check that the stage layout and artifact hand-off are executable
    ///
    /// # Rules
    /// - At least one stage, every stage has at least one action
    /// - The first stage holds only source actions, no other stage holds one
    /// - Run orders start at 1
    /// - Every artifact is produced exactly once
    /// - An input is produced by an earlier stage, or earlier in the same
    ///   stage by a strictly smaller run order
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stages.is_empty() {
            return Err(ValidationError::EmptyPipeline(self.name.clone()));
        }

        let mut produced = HashSet::new();
        let mut available: HashSet<&Artifact> = HashSet::new();

        for (index, stage) in self.stages.iter().enumerate() {
            if stage.actions.is_empty() {
                return Err(ValidationError::EmptyStage {
                    pipeline: self.name.clone(),
                    stage: stage.name.clone(),
                });
            }

            for action in &stage.actions {
                match (index == 0, action.kind.is_source()) {
                    (true, false) => {
                        return Err(ValidationError::FirstStageNotSource {
                            pipeline: self.name.clone(),
                            action: action.name.clone(),
                        })
                    }
                    (false, true) => {
                        return Err(ValidationError::SourceOutsideFirstStage {
                            pipeline: self.name.clone(),
                            action: action.name.clone(),
                        })
                    }
                    _ => {}
                }

                if action.run_order < 1 {
                    return Err(ValidationError::InvalidRunOrder {
                        action: action.name.clone(),
                        run_order: action.run_order,
                    });
                }

                for output in &action.outputs {
                    if !produced.insert(output) {
                        return Err(ValidationError::DuplicateArtifact {
                            pipeline: self.name.clone(),
                            artifact: output.to_string(),
                        });
                    }
                }
            }

            for action in &stage.actions {
                for input in &action.inputs {
                    let earlier_in_stage = stage.actions.iter().any(|other| {
                        other.run_order < action.run_order && other.outputs.contains(input)
                    });
                    if !available.contains(input) && !earlier_in_stage {
                        return Err(ValidationError::ArtifactNotProduced {
                            pipeline: self.name.clone(),
                            action: action.name.clone(),
                            artifact: input.to_string(),
                        });
                    }
                }
            }

            available.extend(stage.actions.iter().flat_map(|a| a.outputs.iter()));
        }

        Ok(())
    }
}
