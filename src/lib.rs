// Copyright (c) 2025 - Stichting Beep
//! Infrastructure definition for the Beep platform
//!
//! Declares the platform's cloud resources as stacks, composes them in
//! dependency order and hands the resulting cloud assembly to an external
//! control plane. Nothing is provisioned in-process.
//!
//! # Architecture
//!
//! ```text
//! PlatformConfig → stacks (network, registry, database, compute, site,
//!                          identity, pipeline)
//!                → BeepPlatform (dependency graph, import checks)
//!                → CloudAssembly → ControlPlane
//! ```

#![recursion_limit = "256"]

pub mod assembly;
pub mod compute;
pub mod config;
pub mod construct;
pub mod control_plane;
pub mod database;
pub mod dns;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod nats;
pub mod network;
pub mod pipeline;
pub mod platform;
pub mod registry;
pub mod site;
pub mod subjects;

// Re-export commonly used types
pub use assembly::{AssemblyManifest, CloudAssembly, StackArtifact};
pub use config::PlatformConfig;
pub use construct::{Environment, Export, Resource, Stack};
pub use control_plane::{AssemblyDirectory, ControlPlane, NatsControlPlane, SubmissionReceipt};
pub use errors::{InfrastructureError, InfrastructureResult};
pub use nats::{NatsClient, NatsConfig};
pub use platform::{BeepPlatform, DependencyGraph};
