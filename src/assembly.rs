// Copyright (c) 2025 - Stichting Beep
//! Cloud Assembly
//!
//! The output of synthesis: one template per stack, in provisioning order,
//! plus a manifest the control plane reads to learn that order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::construct::{Environment, Stack};

/// Manifest file name inside an assembly directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// File a stack's template is stored under
pub fn template_file(stack: &str) -> String {
    format!("{stack}.template.json")
}

/// One synthesized stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackArtifact {
    pub name: String,
    /// Stacks that must be provisioned first
    pub dependencies: Vec<String>,
    pub template: Value,
}

impl StackArtifact {
    pub fn new(stack: &Stack, dependencies: Vec<String>) -> Self {
        Self {
            name: stack.name().to_string(),
            dependencies,
            template: stack.template(),
        }
    }

    pub fn template_file(&self) -> String {
        template_file(&self.name)
    }

    pub fn resource_count(&self) -> usize {
        self.template["Resources"]
            .as_object()
            .map(|r| r.len())
            .unwrap_or(0)
    }
}

/// Manifest entry for one stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub template_file: String,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyManifest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub environment: Environment,
    /// Stacks in provisioning order
    pub stacks: Vec<ManifestEntry>,
}

/// Synthesized platform, ready for submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAssembly {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub environment: Environment,
    /// Stacks in provisioning order
    pub stacks: Vec<StackArtifact>,
}

impl CloudAssembly {
    pub fn new(environment: Environment, stacks: Vec<StackArtifact>) -> Self {
        Self {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            environment,
            stacks,
        }
    }

    pub fn stack(&self, name: &str) -> Option<&StackArtifact> {
        self.stacks.iter().find(|s| s.name == name)
    }

    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.iter().map(|s| s.name.as_str()).collect()
    }

    /// Position of a stack in provisioning order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.stacks.iter().position(|s| s.name == name)
    }

    pub fn manifest(&self) -> AssemblyManifest {
        AssemblyManifest {
            id: self.id,
            created_at: self.created_at,
            environment: self.environment.clone(),
            stacks: self
                .stacks
                .iter()
                .map(|s| ManifestEntry {
                    name: s.name.clone(),
                    template_file: s.template_file(),
                    dependencies: s.dependencies.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assembly() -> CloudAssembly {
        let environment = Environment::new("038855593698", "eu-west-1");
        let vpc = Stack::new("Vpc", environment.clone()).unwrap();
        let rds = Stack::new("Rds", environment.clone()).unwrap();
        CloudAssembly::new(
            environment,
            vec![
                StackArtifact::new(&vpc, vec![]),
                StackArtifact::new(&rds, vec!["Vpc".to_string()]),
            ],
        )
    }

    #[test]
    fn test_manifest_lists_stacks_in_order() {
        let assembly = assembly();
        let manifest = assembly.manifest();

        assert_eq!(manifest.id, assembly.id);
        assert_eq!(manifest.stacks[0].template_file, "Vpc.template.json");
        assert_eq!(manifest.stacks[1].dependencies, vec!["Vpc"]);
        assert_eq!(assembly.position("Rds"), Some(1));
    }

    #[test]
    fn test_manifest_serializes() {
        let manifest = assembly().manifest();
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["environment"], json!({ "account": "038855593698", "region": "eu-west-1" }));
        assert_eq!(value["stacks"][1]["name"], "Rds");
    }

    #[test]
    fn test_empty_stack_has_no_resources() {
        let assembly = assembly();
        assert_eq!(assembly.stack("Vpc").unwrap().resource_count(), 0);
    }
}
