// Copyright (c) 2025 - Stichting Beep
//! Image registries
//!
//! One registry per deployable image, each keeping only its most recent
//! images. Registries live in their own stack; consumers import their ARN and
//! URI and are granted access through [`RegistryHandle::grant`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::config::PlatformConfig;
use crate::construct::{intrinsics, DeletionPolicy, Export, PolicyStatement, Resource, Role, Stack};
use crate::domain::invariants::validate_retention;
use crate::domain::ResourceType;
use crate::errors::{InfrastructureError, InfrastructureResult};

/// Images kept per registry
pub const MAX_IMAGE_COUNT: u32 = 10;

const PULL_ACTIONS: &[&str] = &[
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
];

const PUSH_ACTIONS: &[&str] = &[
    "ecr:PutImage",
    "ecr:InitiateLayerUpload",
    "ecr:UploadLayerPart",
    "ecr:CompleteLayerUpload",
];

/// Deployable images of the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Registry {
    NginxDevelopment,
    NginxProduction,
    PhpDevelopment,
    PhpProduction,
    ApiTest,
    ApiProduction,
}

impl Registry {
    pub const ALL: [Registry; 6] = [
        Registry::NginxDevelopment,
        Registry::NginxProduction,
        Registry::PhpDevelopment,
        Registry::PhpProduction,
        Registry::ApiTest,
        Registry::ApiProduction,
    ];

    pub fn repository_name(&self) -> &'static str {
        match self {
            Registry::NginxDevelopment => "beep-nginx-dev",
            Registry::NginxProduction => "beep-nginx-prod",
            Registry::PhpDevelopment => "beep-php-dev",
            Registry::PhpProduction => "beep-php-prod",
            Registry::ApiTest => "beep-api-test",
            Registry::ApiProduction => "beep-api-prod",
        }
    }

    pub fn logical_id(&self) -> String {
        format!("{self:?}Repository")
    }

    pub fn from_repository_name(name: &str) -> InfrastructureResult<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.repository_name() == name)
            .ok_or_else(|| InfrastructureError::UnknownRegistry(name.to_string()))
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.repository_name())
    }
}

/// Access level granted on a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistryAccess {
    Pull,
    PullPush,
}

impl RegistryAccess {
    pub fn actions(&self) -> Vec<&'static str> {
        match self {
            RegistryAccess::Pull => PULL_ACTIONS.to_vec(),
            RegistryAccess::PullPush => PULL_ACTIONS.iter().chain(PUSH_ACTIONS).copied().collect(),
        }
    }
}

/// Lifecycle document expiring everything beyond the newest `max_image_count`
pub fn lifecycle_policy(max_image_count: u32) -> Value {
    json!({
        "rules": [{
            "rulePriority": 1,
            "description": format!("Retain only the last {max_image_count} images"),
            "selection": {
                "tagStatus": "any",
                "countType": "imageCountMoreThan",
                "countNumber": max_image_count,
            },
            "action": { "type": "expire" },
        }]
    })
}

/// Cross-stack handle to one registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryHandle {
    pub registry: Registry,
    pub name: Export,
    pub arn: Export,
    pub uri: Export,
}

impl RegistryHandle {
    /// Let `role` use the registry from `stack`
    pub fn grant(&self, stack: &mut Stack, role: &mut Role, access: RegistryAccess) {
        let arn = stack.import(&self.arn);
        role.grant(
            PolicyStatement::allow()
                .actions(&access.actions())
                .resource(arn),
        );
        role.grant(
            PolicyStatement::allow()
                .actions(&["ecr:GetAuthorizationToken"])
                .resource("*"),
        );
        debug!(
            stack = %stack.name(),
            role = %role.logical_id(),
            registry = %self.registry,
            access = ?access,
            "Granted registry access"
        );
    }

    /// Image reference `<uri>:<tag>` resolved in `stack`
    pub fn image(&self, stack: &mut Stack, tag: &str) -> Value {
        let uri = stack.import(&self.uri);
        intrinsics::join("", vec![uri, json!(format!(":{tag}"))])
    }

    pub fn import_name(&self, stack: &mut Stack) -> Value {
        stack.import(&self.name)
    }
}

/// Synthesized registry stack
#[derive(Debug, Clone)]
pub struct RegistryStack {
    pub stack: Stack,
    registries: BTreeMap<Registry, RegistryHandle>,
}

impl RegistryStack {
    pub fn get(&self, registry: Registry) -> InfrastructureResult<&RegistryHandle> {
        self.registries
            .get(&registry)
            .ok_or_else(|| InfrastructureError::UnknownRegistry(registry.to_string()))
    }

    pub fn handles(&self) -> impl Iterator<Item = &RegistryHandle> {
        self.registries.values()
    }
}

/// Build the `Ecr` stack
pub fn registry_stack(config: &PlatformConfig) -> InfrastructureResult<RegistryStack> {
    let mut stack = Stack::new("Ecr", config.environment())?
        .with_description("Container image registries");

    let mut registries = BTreeMap::new();
    for registry in Registry::ALL {
        validate_retention(registry.repository_name(), MAX_IMAGE_COUNT)?;

        let policy = serde_json::to_string(&lifecycle_policy(MAX_IMAGE_COUNT))?;
        let repository = stack.add(
            Resource::new(registry.logical_id(), ResourceType::Repository)
                .property("RepositoryName", registry.repository_name())
                .property("LifecyclePolicy", json!({ "LifecyclePolicyText": policy }))
                .deletion_policy(DeletionPolicy::Delete),
        )?;

        let handle = RegistryHandle {
            registry,
            name: stack.export(&format!("{registry:?}RepositoryName"), repository.to_ref()),
            arn: stack.export(&format!("{registry:?}RepositoryArn"), repository.attr("Arn")),
            uri: stack.export(&format!("{registry:?}RepositoryUri"), repository.attr("RepositoryUri")),
        };
        registries.insert(registry, handle);
    }

    info!(
        stack = %stack.name(),
        registries = registries.len(),
        max_image_count = MAX_IMAGE_COUNT,
        "Built registry stack"
    );

    Ok(RegistryStack { stack, registries })
}
