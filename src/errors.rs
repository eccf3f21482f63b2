// Copyright (c) 2025 - Stichting Beep
//! Error types for infrastructure definition and submission

use thiserror::Error;

use crate::domain::{NetworkError, ValidationError};

/// Errors that can occur while composing, synthesizing or submitting the
/// infrastructure definition
#[derive(Debug, Error)]
pub enum InfrastructureError {
    /// A domain invariant was violated
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Malformed network value (CIDR, prefix, port range)
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The network ran out of address space while allocating subnets
    #[error("Address space {network} exhausted while allocating tier {tier}")]
    AddressSpaceExhausted { network: String, tier: String },

    /// Subnet tier lookup failed
    #[error("Unknown subnet tier: {0}")]
    UnknownTier(String),

    /// Subnet tier exists but is not provisioned
    #[error("Subnet tier {0} is reserved and has no provisioned subnets")]
    ReservedTier(String),

    /// Registry lookup failed
    #[error("Unknown image registry: {0}")]
    UnknownRegistry(String),

    /// Two resources in one stack share a logical id
    #[error("Duplicate logical id {logical_id} in stack {stack}")]
    DuplicateLogicalId { stack: String, logical_id: String },

    /// A stack name is registered twice in the dependency graph
    #[error("Duplicate stack: {0}")]
    DuplicateStack(String),

    /// A dependency edge references a stack that was never registered
    #[error("Unknown stack: {0}")]
    UnknownStack(String),

    /// The dependency graph contains a cycle
    #[error("Dependency cycle among stacks: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// A stack imports an output from a stack it does not depend on
    #[error("Stack {consumer} imports from {producer} without declaring a dependency on it")]
    MissingDependency { consumer: String, producer: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filesystem error while writing the assembly
    #[error("I/O error: {0}")]
    Io(String),

    /// NATS connection error
    #[error("NATS connection error: {0}")]
    NatsConnection(String),

    /// NATS publish error
    #[error("NATS publish error: {0}")]
    NatsPublish(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for infrastructure operations
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;

impl From<serde_json::Error> for InfrastructureError {
    fn from(err: serde_json::Error) -> Self {
        InfrastructureError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for InfrastructureError {
    fn from(err: std::io::Error) -> Self {
        InfrastructureError::Io(err.to_string())
    }
}
