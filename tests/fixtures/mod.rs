// Copyright (c) 2025 - Stichting Beep
//! Test Fixtures for beep-infrastructure
//!
//! Deterministic configuration and synthesized stacks shared by the
//! integration tests. The production defaults are used as-is so assertions
//! read the same values the binary would emit.

#![allow(dead_code)]

use serde_json::Value;

use beep_infrastructure::assembly::{CloudAssembly, StackArtifact};
use beep_infrastructure::construct::Environment;
use beep_infrastructure::domain::Ipv4Cidr;
use beep_infrastructure::{BeepPlatform, PlatformConfig};

pub const ACCOUNT: &str = "038855593698";
pub const REGION: &str = "eu-west-1";
pub const NETWORK: &str = "10.0.0.0/16";

/// Production configuration
pub fn config() -> PlatformConfig {
    PlatformConfig::default()
}

pub fn environment() -> Environment {
    Environment::new(ACCOUNT, REGION)
}

pub fn internal() -> Ipv4Cidr {
    NETWORK.parse().expect("Invalid network in test fixture")
}

/// The whole platform synthesized from the production configuration
pub fn assembly() -> CloudAssembly {
    BeepPlatform::synthesize(&config()).expect("Platform failed to synthesize")
}

/// One stack of [`assembly`]
pub fn artifact<'a>(assembly: &'a CloudAssembly, name: &str) -> &'a StackArtifact {
    assembly
        .stack(name)
        .unwrap_or_else(|| panic!("stack {name} missing from assembly"))
}

/// Resources of `template` with the given CloudFormation type
pub fn resources_of_type<'a>(template: &'a Value, resource_type: &str) -> Vec<(&'a String, &'a Value)> {
    template["Resources"]
        .as_object()
        .map(|resources| {
            resources
                .iter()
                .filter(|(_, r)| r["Type"] == resource_type)
                .collect()
        })
        .unwrap_or_default()
}
