// Copyright (c) 2025 - Stichting Beep
//! Construct Model
//!
//! A [`Stack`] is the unit the control plane provisions. It owns an ordered
//! list of [`Resource`] descriptions and a set of named outputs. Stacks never
//! reach into each other: a producer publishes an [`Export`], and a consumer
//! calls [`Stack::import`], which records the producing stack so composition
//! can verify an explicit dependency edge covers every import.
//!
//! ```text
//! VpcStack ──export(VpcId)──▶ Export ──import──▶ RdsStack
//!                                               (imports = {Vpc})
//! ```

pub mod iam;
pub mod intrinsics;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::domain::invariants::{validate_logical_id, validate_not_empty};
use crate::domain::ResourceType;
use crate::errors::{InfrastructureError, InfrastructureResult};

pub use iam::{policy_document, PolicyStatement, Role};

/// Template format version emitted in every stack template
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Account and region a stack is provisioned into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }
}

/// What the control plane does with a resource when it leaves the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

/// Desired-state description of a single cloud resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    logical_id: String,
    resource_type: ResourceType,
    properties: Map<String, Value>,
    depends_on: Vec<String>,
    deletion_policy: Option<DeletionPolicy>,
}

impl Resource {
    pub fn new(logical_id: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            logical_id: logical_id.into(),
            resource_type,
            properties: Map::new(),
            depends_on: Vec::new(),
            deletion_policy: None,
        }
    }

    /// Set a property
    pub fn property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Set a property only when a value is present
    pub fn optional_property(self, name: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.property(name, value),
            None => self,
        }
    }

    /// Require another resource of the same stack to be provisioned first
    pub fn depends_on(mut self, other: &Reference) -> Self {
        if !self.depends_on.contains(&other.logical_id) {
            self.depends_on.push(other.logical_id.clone());
        }
        self
    }

    pub fn deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Look up a single property
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    fn to_template(&self) -> Value {
        let mut body = Map::new();
        body.insert("Type".to_string(), json!(self.resource_type.as_str()));
        if !self.properties.is_empty() {
            body.insert("Properties".to_string(), Value::Object(self.properties.clone()));
        }
        if !self.depends_on.is_empty() {
            body.insert("DependsOn".to_string(), json!(self.depends_on));
        }
        if let Some(policy) = self.deletion_policy {
            let policy = match policy {
                DeletionPolicy::Delete => "Delete",
                DeletionPolicy::Retain => "Retain",
            };
            body.insert("DeletionPolicy".to_string(), json!(policy));
            body.insert("UpdateReplacePolicy".to_string(), json!(policy));
        }
        Value::Object(body)
    }
}

/// Handle to a resource that has been added to a stack
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    stack: String,
    logical_id: String,
}

impl Reference {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// `Ref` to the resource
    pub fn to_ref(&self) -> Value {
        intrinsics::reference(&self.logical_id)
    }

    /// `Fn::GetAtt` on the resource
    pub fn attr(&self, attribute: &str) -> Value {
        intrinsics::get_att(&self.logical_id, attribute)
    }
}

/// Named stack output other stacks may import
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Export {
    stack: String,
    name: String,
}

impl Export {
    /// Producing stack
    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Export name as registered with the control plane
    pub fn export_name(&self) -> String {
        format!("{}:{}", self.stack, self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Output {
    name: String,
    value: Value,
    description: Option<String>,
    exported: bool,
}

/// Unit of provisioning: resources plus outputs in one environment
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    environment: Environment,
    description: Option<String>,
    resources: Vec<Resource>,
    logical_ids: HashSet<String>,
    outputs: Vec<Output>,
    imports: BTreeSet<String>,
}

impl Stack {
    pub fn new(name: impl Into<String>, environment: Environment) -> InfrastructureResult<Self> {
        let name = name.into();
        validate_not_empty("stack name", &name)?;
        validate_logical_id(&name)?;

        Ok(Self {
            name,
            environment,
            description: None,
            resources: Vec::new(),
            logical_ids: HashSet::new(),
            outputs: Vec::new(),
            imports: BTreeSet::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn account(&self) -> &str {
        &self.environment.account
    }

    pub fn region(&self) -> &str {
        &self.environment.region
    }

    /// Add a resource, rejecting duplicate logical ids
    pub fn add(&mut self, resource: Resource) -> InfrastructureResult<Reference> {
        validate_logical_id(resource.logical_id())?;

        if !self.logical_ids.insert(resource.logical_id.clone()) {
            return Err(InfrastructureError::DuplicateLogicalId {
                stack: self.name.clone(),
                logical_id: resource.logical_id.clone(),
            });
        }

        debug!(
            stack = %self.name,
            logical_id = %resource.logical_id,
            resource_type = %resource.resource_type,
            "Declared resource"
        );

        let reference = Reference {
            stack: self.name.clone(),
            logical_id: resource.logical_id.clone(),
        };
        self.resources.push(resource);
        Ok(reference)
    }

    /// Add a plain (non-exported) output
    pub fn output(&mut self, name: &str, value: Value, description: Option<&str>) {
        self.outputs.push(Output {
            name: name.to_string(),
            value,
            description: description.map(str::to_string),
            exported: false,
        });
    }

    /// Publish a value for other stacks
    pub fn export(&mut self, name: &str, value: Value) -> Export {
        self.outputs.push(Output {
            name: name.to_string(),
            value,
            description: None,
            exported: true,
        });

        Export {
            stack: self.name.clone(),
            name: name.to_string(),
        }
    }

    /// Consume another stack's export
    ///
    /// Importing from the stack itself resolves to nothing useful for the
    /// control plane, so local exports are read back from the outputs.
    pub fn import(&mut self, export: &Export) -> Value {
        if export.stack == self.name {
            if let Some(output) = self.outputs.iter().find(|o| o.name == export.name) {
                return output.value.clone();
            }
        }

        self.imports.insert(export.stack.clone());
        intrinsics::import_value(&export.export_name())
    }

    /// Stacks this stack imports from
    pub fn imports(&self) -> &BTreeSet<String> {
        &self.imports
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Find a resource by logical id
    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    /// Handle to an already declared resource
    pub fn reference(&self, logical_id: &str) -> Option<Reference> {
        self.logical_ids.contains(logical_id).then(|| Reference {
            stack: self.name.clone(),
            logical_id: logical_id.to_string(),
        })
    }

    /// All resources of one type, in declaration order
    pub fn resources_of_type(&self, resource_type: ResourceType) -> Vec<&Resource> {
        self.resources
            .iter()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }

    /// Names of all outputs
    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.name.as_str()).collect()
    }

    /// Render the desired-state template
    pub fn template(&self) -> Value {
        let mut template = Map::new();
        template.insert(
            "AWSTemplateFormatVersion".to_string(),
            json!(TEMPLATE_FORMAT_VERSION),
        );
        if let Some(description) = &self.description {
            template.insert("Description".to_string(), json!(description));
        }

        let resources: Map<String, Value> = self
            .resources
            .iter()
            .map(|r| (r.logical_id.clone(), r.to_template()))
            .collect();
        template.insert("Resources".to_string(), Value::Object(resources));

        if !self.outputs.is_empty() {
            let outputs: Map<String, Value> = self
                .outputs
                .iter()
                .map(|o| {
                    let mut body = Map::new();
                    body.insert("Value".to_string(), o.value.clone());
                    if let Some(description) = &o.description {
                        body.insert("Description".to_string(), json!(description));
                    }
                    if o.exported {
                        body.insert(
                            "Export".to_string(),
                            json!({ "Name": format!("{}:{}", self.name, o.name) }),
                        );
                    }
                    (o.name.clone(), Value::Object(body))
                })
                .collect();
            template.insert("Outputs".to_string(), Value::Object(outputs));
        }

        Value::Object(template)
    }
}
