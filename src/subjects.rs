// Copyright (c) 2025 - Stichting Beep

//! NATS subject hierarchy for assembly submission
//!
//! # Subject Pattern
//!
//! ```text
//! beep.infrastructure.{aggregate}.{operation}
//! beep.infrastructure.stack.{stack}.{operation}
//! ```
//!
//! This allows for:
//! - Precise subscriptions (`beep.infrastructure.stack.Vpc.submitted`)
//! - Per-stack wildcards (`beep.infrastructure.stack.Vpc.>`)
//! - Global subscriptions (`beep.infrastructure.>`)
//!
//! # Examples
//!
//! ```rust
//! use beep_infrastructure::subjects::{Aggregate, Operation, SubjectBuilder};
//!
//! let subject = SubjectBuilder::new()
//!     .aggregate(Aggregate::stack("Vpc"))
//!     .operation(Operation::Submitted)
//!     .build()
//!     .unwrap();
//! assert_eq!(subject, "beep.infrastructure.stack.Vpc.submitted");
//! ```

use std::fmt;

use crate::errors::{InfrastructureError, InfrastructureResult};

/// Root namespace for all infrastructure subjects
pub const INFRASTRUCTURE_ROOT: &str = "beep.infrastructure";

/// What a message is about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Aggregate {
    /// One stack template
    Stack(String),
    /// The manifest of a whole assembly
    Assembly,
}

impl Aggregate {
    pub fn stack(name: impl Into<String>) -> Self {
        Aggregate::Stack(name.into())
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Stack(name) => write!(f, "stack.{name}"),
            Aggregate::Assembly => write!(f, "assembly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Handed to the control plane for provisioning
    Submitted,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Submitted => write!(f, "submitted"),
        }
    }
}

/// A subject token must not be empty or contain separators or wildcards
fn validate_token(token: &str) -> InfrastructureResult<()> {
    if token.is_empty()
        || token
            .chars()
            .any(|c| c == '.' || c == '*' || c == '>' || c.is_whitespace())
    {
        return Err(InfrastructureError::Configuration(format!(
            "invalid subject token: {token:?}"
        )));
    }
    Ok(())
}

/// Builder for infrastructure NATS subjects
#[derive(Debug, Clone, Default)]
pub struct SubjectBuilder {
    aggregate: Option<Aggregate>,
    operation: Option<Operation>,
}

impl SubjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    fn checked_aggregate(&self) -> InfrastructureResult<&Aggregate> {
        let aggregate = self.aggregate.as_ref().ok_or_else(|| {
            InfrastructureError::Configuration("subject aggregate must be set".to_string())
        })?;
        if let Aggregate::Stack(name) = aggregate {
            validate_token(name)?;
        }
        Ok(aggregate)
    }

    /// Build the complete subject string
    pub fn build(self) -> InfrastructureResult<String> {
        let aggregate = self.checked_aggregate()?;
        let operation = self.operation.ok_or_else(|| {
            InfrastructureError::Configuration("subject operation must be set".to_string())
        })?;
        Ok(format!("{INFRASTRUCTURE_ROOT}.{aggregate}.{operation}"))
    }

    /// Wildcard subscription for every operation on the aggregate
    ///
    /// Returns: `beep.infrastructure.{aggregate}.>`
    pub fn build_wildcard(self) -> InfrastructureResult<String> {
        let aggregate = self.checked_aggregate()?;
        Ok(format!("{INFRASTRUCTURE_ROOT}.{aggregate}.>"))
    }

    /// Returns: `beep.infrastructure.>`
    pub fn build_all() -> String {
        format!("{INFRASTRUCTURE_ROOT}.>")
    }
}

/// Convenience functions for common subject patterns
pub mod subjects {
    use super::*;

    pub fn stack_submitted(stack: &str) -> InfrastructureResult<String> {
        SubjectBuilder::new()
            .aggregate(Aggregate::stack(stack))
            .operation(Operation::Submitted)
            .build()
    }

    pub fn assembly_submitted() -> String {
        format!(
            "{INFRASTRUCTURE_ROOT}.{}.{}",
            Aggregate::Assembly,
            Operation::Submitted
        )
    }

    /// Every stack submission: `beep.infrastructure.stack.*.submitted`
    pub fn all_stack_submissions() -> String {
        format!("{INFRASTRUCTURE_ROOT}.stack.*.{}", Operation::Submitted)
    }

    pub fn all_infrastructure_events() -> String {
        SubjectBuilder::build_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_builder() {
        let subject = SubjectBuilder::new()
            .aggregate(Aggregate::stack("ApiPipelines"))
            .operation(Operation::Submitted)
            .build()
            .unwrap();

        assert_eq!(subject, "beep.infrastructure.stack.ApiPipelines.submitted");
    }

    #[test]
    fn test_missing_parts_rejected() {
        assert!(SubjectBuilder::new().operation(Operation::Submitted).build().is_err());
        assert!(SubjectBuilder::new().aggregate(Aggregate::Assembly).build().is_err());
    }

    #[test]
    fn test_invalid_stack_token_rejected() {
        assert!(subjects::stack_submitted("Api.Pipelines").is_err());
        assert!(subjects::stack_submitted("*").is_err());
        assert!(subjects::stack_submitted("").is_err());
    }

    #[test]
    fn test_wildcard_subject() {
        let subject = SubjectBuilder::new()
            .aggregate(Aggregate::stack("Vpc"))
            .build_wildcard()
            .unwrap();

        assert_eq!(subject, "beep.infrastructure.stack.Vpc.>");
    }

    #[test]
    fn test_convenience_functions() {
        assert_eq!(subjects::assembly_submitted(), "beep.infrastructure.assembly.submitted");
        assert_eq!(
            subjects::all_stack_submissions(),
            "beep.infrastructure.stack.*.submitted"
        );
        assert_eq!(subjects::all_infrastructure_events(), "beep.infrastructure.>");
    }
}
