// Copyright (c) 2025 - Stichting Beep
//! Network stack
//!
//! The virtual network, its subnet tiers, one ACL rule set per governed tier
//! and the bastion host. Every other stack that needs subnets imports them
//! from here through [`NetworkExports`].

pub mod acl;
pub mod bastion;
pub mod topology;

use std::collections::BTreeMap;
use tracing::info;

use crate::config::PlatformConfig;
use crate::construct::Stack;
use crate::domain::invariants::validate_acl_associations;
use crate::errors::InfrastructureResult;

pub use acl::{AclRule, AclRuleSet, AclRuleSetBuilder, Decision};
pub use bastion::BastionHost;
pub use topology::{
    platform_tiers, NetworkExports, NetworkHandle, NetworkTopology, PlannedSubnet, SubnetKind,
    SubnetTier,
};

/// Tier hosting the NAT gateway
pub const NAT_TIER: &str = "Egress";

/// Synthesized network stack with its cross-stack handles
#[derive(Debug, Clone)]
pub struct NetworkStack {
    pub stack: Stack,
    pub topology: NetworkTopology,
    pub policies: BTreeMap<String, AclRuleSet>,
    pub exports: NetworkExports,
}

/// Build the `Vpc` stack
pub fn network_stack(config: &PlatformConfig) -> InfrastructureResult<NetworkStack> {
    let mut stack = Stack::new("Vpc", config.environment())?
        .with_description("Production network, subnet tiers and network ACLs");

    let topology = NetworkTopology::plan(
        "Production",
        config.network_cidr,
        &config.availability_zones,
        platform_tiers(),
        NAT_TIER,
    )?;
    let network = topology.synthesize(&mut stack)?;

    let policies = acl::platform_policies(topology.cidr())?;
    let mut associations = Vec::new();
    for (tier, policy) in &policies {
        let subnets = network.subnets(tier)?;
        policy.synthesize(&mut stack, &network.vpc, subnets)?;
        associations.extend(
            subnets
                .iter()
                .map(|s| (s.logical_id().to_string(), tier.clone())),
        );
    }

    let subnet_tiers: BTreeMap<String, String> = topology
        .provisioned_subnets()
        .map(|s| (s.logical_id.clone(), s.tier.clone()))
        .collect();
    let governed: BTreeMap<String, String> = policies
        .iter()
        .map(|(tier, policy)| (tier.clone(), policy.name().to_string()))
        .collect();
    validate_acl_associations(&subnet_tiers, &governed, &associations)?;

    BastionHost::new("BastionHost", "Bastion").synthesize(&mut stack, &network)?;

    info!(
        stack = %stack.name(),
        resources = stack.resources().len(),
        rule_sets = policies.len(),
        acl_resources = stack
            .resources()
            .iter()
            .filter(|r| r.resource_type().is_network_policy())
            .count(),
        "Built network stack"
    );

    Ok(NetworkStack {
        stack,
        topology,
        policies,
        exports: network.exports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceType;

    #[test]
    fn test_network_stack_associations() {
        let network = network_stack(&PlatformConfig::default()).unwrap();
        let associations = network
            .stack
            .resources_of_type(ResourceType::SubnetNetworkAclAssociation);
        // four governed tiers, three zones each
        assert_eq!(associations.len(), 12);
        assert_eq!(network.stack.resources_of_type(ResourceType::NetworkAcl).len(), 4);
        assert!(network.stack.resource("ApplicationAclOutboundMySql").is_some());
    }
}
