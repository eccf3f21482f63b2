// Copyright (c) 2025 - Stichting Beep
//! Roles and grants
//!
//! A [`Role`] collects [`PolicyStatement`]s while other constructs grant it
//! access, and is attached to its stack once all grants are in. Attaching
//! produces the role itself and, when any statement was granted, one inline
//! policy bound to it.

use serde_json::{json, Value};

use super::{Reference, Resource, Stack};
use crate::domain::ResourceType;
use crate::errors::InfrastructureResult;

/// Single allow statement of a policy document
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    actions: Vec<String>,
    resources: Vec<Value>,
    principal: Option<Value>,
}

impl PolicyStatement {
    pub fn allow() -> Self {
        Self {
            actions: Vec::new(),
            resources: Vec::new(),
            principal: None,
        }
    }

    pub fn actions(mut self, actions: &[&str]) -> Self {
        self.actions.extend(actions.iter().map(|a| a.to_string()));
        self
    }

    pub fn resource(mut self, resource: impl Into<Value>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn resource_values(&self) -> &[Value] {
        &self.resources
    }

    pub fn to_json(&self) -> Value {
        let mut statement = json!({
            "Effect": "Allow",
            "Action": self.actions,
            "Resource": if self.resources.len() == 1 {
                self.resources[0].clone()
            } else {
                Value::Array(self.resources.clone())
            },
        });
        if let Some(principal) = &self.principal {
            statement["Principal"] = principal.clone();
        }
        statement
    }
}

/// Policy document wrapping a list of statements
pub fn policy_document(statements: &[PolicyStatement]) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
    })
}

/// Service role accumulating grants until it is attached to a stack
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    logical_id: String,
    service_principal: String,
    managed_policy_arns: Vec<String>,
    statements: Vec<PolicyStatement>,
}

impl Role {
    pub fn new(logical_id: impl Into<String>, service_principal: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            service_principal: service_principal.into(),
            managed_policy_arns: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn arn(&self) -> Value {
        json!({ "Fn::GetAtt": [self.logical_id, "Arn"] })
    }

    pub fn to_ref(&self) -> Value {
        json!({ "Ref": self.logical_id })
    }

    pub fn with_managed_policy(mut self, arn: impl Into<String>) -> Self {
        self.managed_policy_arns.push(arn.into());
        self
    }

    /// Add a statement to the role's inline policy
    pub fn grant(&mut self, statement: PolicyStatement) {
        if !self.statements.contains(&statement) {
            self.statements.push(statement);
        }
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Check whether any statement grants `action`
    pub fn allows(&self, action: &str) -> bool {
        self.statements
            .iter()
            .any(|s| s.actions.iter().any(|a| a == action))
    }

    /// Declare the role (and its inline policy) in `stack`
    pub fn attach(self, stack: &mut Stack) -> InfrastructureResult<Reference> {
        let role = stack.add(
            Resource::new(self.logical_id.clone(), ResourceType::Role)
                .property(
                    "AssumeRolePolicyDocument",
                    json!({
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Effect": "Allow",
                            "Principal": { "Service": self.service_principal },
                            "Action": "sts:AssumeRole",
                        }],
                    }),
                )
                .optional_property(
                    "ManagedPolicyArns",
                    (!self.managed_policy_arns.is_empty()).then(|| json!(self.managed_policy_arns)),
                ),
        )?;

        if !self.statements.is_empty() {
            stack.add(
                Resource::new(format!("{}DefaultPolicy", self.logical_id), ResourceType::Policy)
                    .property("PolicyName", format!("{}DefaultPolicy", self.logical_id))
                    .property("PolicyDocument", policy_document(&self.statements))
                    .property("Roles", json!([role.to_ref()])),
            )?;
        }

        Ok(role)
    }
}
