// Copyright (c) 2025 - Stichting Beep
//! Build projects run by pipeline build actions

use serde_json::{json, Value};
use tracing::debug;

use crate::construct::{intrinsics, PolicyStatement, Reference, Resource, Role, Stack};
use crate::domain::invariants::{validate_logical_id, validate_not_empty};
use crate::domain::ResourceType;
use crate::errors::InfrastructureResult;
use crate::registry::{RegistryAccess, RegistryHandle};

/// Managed Linux build image
pub const STANDARD_2_0: &str = "aws/codebuild/standard:2.0";

/// Smallest build host
pub const SMALL: &str = "BUILD_GENERAL1_SMALL";

/// Build instructions of a project
#[derive(Debug, Clone, PartialEq)]
pub enum BuildSpec {
    /// Path relative to the root of the source artifact
    File(String),
    /// Instructions carried in the template
    Inline(Value),
}

impl BuildSpec {
    pub fn from_source_filename(path: impl Into<String>) -> Self {
        BuildSpec::File(path.into())
    }

    fn to_property(&self) -> InfrastructureResult<Value> {
        match self {
            BuildSpec::File(path) => Ok(json!(path)),
            BuildSpec::Inline(spec) => Ok(json!(serde_json::to_string_pretty(spec)?)),
        }
    }
}

/// Build project with its own service role
#[derive(Debug, Clone)]
pub struct BuildProject {
    logical_id: String,
    project_name: String,
    description: String,
    build_spec: BuildSpec,
    variables: Vec<(String, Value)>,
    role: Role,
}

impl BuildProject {
    pub fn new(
        logical_id: impl Into<String>,
        project_name: impl Into<String>,
        description: impl Into<String>,
        build_spec: BuildSpec,
    ) -> Self {
        let logical_id = logical_id.into();
        let role = Role::new(format!("{logical_id}Role"), "codebuild.amazonaws.com");
        Self {
            logical_id,
            project_name: project_name.into(),
            description: description.into(),
            build_spec,
            variables: vec![
                ("AWS_ACCOUNT_ID".to_string(), intrinsics::reference("AWS::AccountId")),
                ("AWS_DEFAULT_REGION".to_string(), intrinsics::reference("AWS::Region")),
            ],
            role,
        }
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn build_spec(&self) -> &BuildSpec {
        &self.build_spec
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn role_mut(&mut self) -> &mut Role {
        &mut self.role
    }

    /// Plain-text environment variable
    pub fn variable(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.push((name.to_string(), value.into()));
        self
    }

    pub fn variables(&self) -> &[(String, Value)] {
        &self.variables
    }

    /// Set `IMAGE_REPO_NAME` and let the project push to the registry
    pub fn image_repository(mut self, stack: &mut Stack, registry: &RegistryHandle) -> Self {
        let name = registry.import_name(stack);
        registry.grant(stack, &mut self.role, RegistryAccess::PullPush);
        self.variable("IMAGE_REPO_NAME", name)
    }

    /// Grant registry access beyond the image repository
    pub fn grant_registry(
        mut self,
        stack: &mut Stack,
        registry: &RegistryHandle,
        access: RegistryAccess,
    ) -> Self {
        registry.grant(stack, &mut self.role, access);
        self
    }

    /// ARN of the project
    pub fn arn(&self) -> Value {
        intrinsics::get_att(&self.logical_id, "Arn")
    }

    /// Declare the role, its policy and the project
    pub fn synthesize(mut self, stack: &mut Stack) -> InfrastructureResult<Reference> {
        validate_logical_id(&self.logical_id)?;
        validate_not_empty("project name", &self.project_name)?;

        let log_group = intrinsics::arn(
            "logs",
            json!(format!("log-group:/aws/codebuild/{}*", self.project_name)),
        );
        self.role.grant(
            PolicyStatement::allow()
                .actions(&["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"])
                .resource(log_group),
        );

        let variables: Vec<Value> = self
            .variables
            .iter()
            .map(|(name, value)| json!({ "Name": name, "Type": "PLAINTEXT", "Value": value }))
            .collect();
        let build_spec = self.build_spec.to_property()?;
        let role_arn = self.role.arn();
        self.role.attach(stack)?;

        let project = stack.add(
            Resource::new(self.logical_id.clone(), ResourceType::BuildProject)
                .property("Name", self.project_name.clone())
                .property("Description", self.description.clone())
                .property("ServiceRole", role_arn)
                .property("Source", json!({ "Type": "CODEPIPELINE", "BuildSpec": build_spec }))
                .property("Artifacts", json!({ "Type": "CODEPIPELINE" }))
                .property(
                    "Environment",
                    json!({
                        "Type": "LINUX_CONTAINER",
                        "Image": STANDARD_2_0,
                        "ComputeType": SMALL,
                        "PrivilegedMode": true,
                        "EnvironmentVariables": variables,
                    }),
                ),
        )?;

        debug!(
            stack = %stack.name(),
            project = %self.project_name,
            "Declared build project"
        );

        Ok(project)
    }
}
