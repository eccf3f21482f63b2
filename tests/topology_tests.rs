// Copyright (c) 2025 - Stichting Beep
//! Network Topology Tests
//!
//! Address planning of the platform network and the resources the `Vpc`
//! stack declares for it.

mod fixtures;

use anyhow::Result;
use pretty_assertions::assert_eq;

use beep_infrastructure::network::{
    network_stack, platform_tiers, NetworkTopology, SubnetKind, SubnetTier, NAT_TIER,
};
use beep_infrastructure::InfrastructureError;

use fixtures::{config, internal, resources_of_type};

fn zones(count: usize) -> Vec<String> {
    ["eu-west-1a", "eu-west-1b", "eu-west-1c"]
        .iter()
        .take(count)
        .map(|z| z.to_string())
        .collect()
}

fn platform_topology() -> Result<NetworkTopology> {
    Ok(NetworkTopology::plan(
        "Production",
        internal(),
        &zones(3),
        platform_tiers(),
        NAT_TIER,
    )?)
}

#[test]
fn test_platform_blocks_are_consecutive_24s() -> Result<()> {
    let topology = platform_topology()?;
    let blocks: Vec<String> = topology.subnets().iter().map(|s| s.cidr.to_string()).collect();

    let expected: Vec<String> = (0..18).map(|i| format!("10.0.{i}.0/24")).collect();
    assert_eq!(blocks, expected);

    let egress: Vec<&str> = topology
        .select_subnets("Egress")?
        .into_iter()
        .map(|s| s.availability_zone.as_str())
        .collect();
    assert_eq!(egress, vec!["eu-west-1a", "eu-west-1b", "eu-west-1c"]);

    Ok(())
}

#[test]
fn test_blocks_disjoint_and_inside_network() -> Result<()> {
    let topology = platform_topology()?;
    let subnets = topology.subnets();

    for (i, a) in subnets.iter().enumerate() {
        assert!(topology.cidr().contains(&a.cidr), "{} outside network", a.cidr);
        for b in &subnets[i + 1..] {
            assert!(!a.cidr.overlaps(&b.cidr), "{} overlaps {}", a.cidr, b.cidr);
        }
    }

    Ok(())
}

#[test]
fn test_tier_kinds() -> Result<()> {
    let topology = platform_topology()?;
    let kinds: Vec<(&str, SubnetKind)> = topology
        .tiers()
        .iter()
        .map(|t| (t.name.as_str(), t.kind))
        .collect();

    assert_eq!(
        kinds,
        vec![
            ("Egress", SubnetKind::Public),
            ("Ingress", SubnetKind::Public),
            ("Application", SubnetKind::Private),
            ("Database", SubnetKind::Isolated),
            ("Codebuild", SubnetKind::Private),
            ("Bastion", SubnetKind::Private),
        ]
    );
    assert_eq!(topology.nat_subnet()?.logical_id, "ProductionEgressSubnet1");

    Ok(())
}

#[test]
fn test_reserved_tier_keeps_address_space() -> Result<()> {
    let tiers = vec![
        SubnetTier::public("Egress", 24),
        SubnetTier::private("Spare", 24).reserved(),
        SubnetTier::private("Application", 24),
    ];
    let topology = NetworkTopology::plan("Production", internal(), &zones(2), tiers, "Egress")?;

    let application: Vec<String> = topology
        .select_subnets("Application")?
        .into_iter()
        .map(|s| s.cidr.to_string())
        .collect();
    assert_eq!(application, vec!["10.0.4.0/24", "10.0.5.0/24"]);
    assert_eq!(topology.provisioned_subnets().count(), 4);

    assert!(matches!(
        topology.select_subnets("Spare"),
        Err(InfrastructureError::ReservedTier(tier)) if tier == "Spare"
    ));
    assert!(matches!(
        topology.select_subnets("Missing"),
        Err(InfrastructureError::UnknownTier(_))
    ));

    Ok(())
}

#[test]
fn test_exhausted_address_space() -> Result<()> {
    let tiers = vec![
        SubnetTier::public("Egress", 26),
        SubnetTier::private("Application", 25),
    ];
    let result = NetworkTopology::plan("Small", "10.1.0.0/24".parse()?, &zones(3), tiers, "Egress");

    match result {
        Err(InfrastructureError::AddressSpaceExhausted { network, tier }) => {
            assert_eq!(network, "10.1.0.0/24");
            assert_eq!(tier, "Application");
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }

    Ok(())
}

#[test]
fn test_nat_tier_must_be_public() {
    let tiers = vec![
        SubnetTier::private("Application", 24),
        SubnetTier::isolated("Database", 24),
    ];
    let result = NetworkTopology::plan("Production", internal(), &zones(1), tiers, "Application");
    assert!(matches!(result, Err(InfrastructureError::Configuration(_))));
}

#[test]
fn test_duplicate_tier_rejected() {
    let tiers = vec![
        SubnetTier::public("Egress", 24),
        SubnetTier::public("Egress", 24),
    ];
    let result = NetworkTopology::plan("Production", internal(), &zones(1), tiers, "Egress");
    assert!(matches!(result, Err(InfrastructureError::Configuration(_))));
}

#[test]
fn test_no_availability_zones_rejected() {
    let result = NetworkTopology::plan("Production", internal(), &[], platform_tiers(), NAT_TIER);
    assert!(matches!(result, Err(InfrastructureError::Configuration(_))));
}

#[test]
fn test_network_stack_declares_single_nat() -> Result<()> {
    let network = network_stack(&config())?;
    let template = network.stack.template();

    assert_eq!(resources_of_type(&template, "AWS::EC2::VPC").len(), 1);
    assert_eq!(resources_of_type(&template, "AWS::EC2::Subnet").len(), 18);

    let nat = resources_of_type(&template, "AWS::EC2::NatGateway");
    assert_eq!(nat.len(), 1);
    assert_eq!(nat[0].1["Properties"]["SubnetId"]["Ref"], "ProductionEgressSubnet1");

    // Every private subnet routes through the one NAT gateway
    let routes = resources_of_type(&template, "AWS::EC2::Route");
    let through_nat = routes
        .iter()
        .filter(|(_, r)| r["Properties"]["NatGatewayId"]["Ref"] == "ProductionEgressSubnet1NATGateway")
        .count();
    assert_eq!(through_nat, 9);

    // Isolated subnets have no default route
    assert!(routes.iter().all(|(id, _)| !id.contains("Database")));

    Ok(())
}

#[test]
fn test_network_exports() -> Result<()> {
    let network = network_stack(&config())?;
    let outputs = network.stack.output_names();

    for name in ["VpcId", "VpcCidr", "ApplicationSubnetIds", "DatabaseSubnetIds", "IngressSubnetIds"] {
        assert!(outputs.contains(&name), "missing export {name}");
    }
    assert_eq!(network.exports.subnet_ids("Database")?.stack(), "Vpc");

    Ok(())
}
