// Copyright (c) 2025 - Stichting Beep
//! Property-Based Tests for Subnet Allocation
//!
//! Any accepted address plan hands out disjoint blocks inside the network,
//! one per tier and availability zone, each with its tier's mask.

use beep_infrastructure::domain::Ipv4Cidr;
use beep_infrastructure::network::{NetworkTopology, SubnetKind, SubnetTier};
use beep_infrastructure::InfrastructureError;
use proptest::prelude::*;
use std::net::Ipv4Addr;

// ============================================================================
// Strategies
// ============================================================================

fn network() -> impl Strategy<Value = Ipv4Cidr> {
    (0u8..=255, 16u8..=20).prop_map(|(second, prefix)| {
        Ipv4Cidr::from_parts(Ipv4Addr::new(10, second, 0, 0), prefix)
            .expect("aligned network")
    })
}

fn kind() -> impl Strategy<Value = SubnetKind> {
    prop_oneof![
        Just(SubnetKind::Public),
        Just(SubnetKind::Private),
        Just(SubnetKind::Isolated),
    ]
}

/// First tier is always public so it can host the NAT gateway
fn tiers() -> impl Strategy<Value = Vec<SubnetTier>> {
    prop::collection::vec((kind(), 20u8..=28, any::<bool>()), 0..7).prop_map(|rest| {
        let mut tiers = vec![SubnetTier::public("Egress", 24)];
        for (i, (kind, mask, reserved)) in rest.into_iter().enumerate() {
            let tier = SubnetTier::new(format!("Tier{i}"), kind, mask);
            tiers.push(if reserved { tier.reserved() } else { tier });
        }
        tiers
    })
}

fn zones() -> impl Strategy<Value = Vec<String>> {
    (1u8..=4).prop_map(|count| {
        (0..count)
            .map(|i| format!("eu-west-1{}", char::from(b'a' + i)))
            .collect()
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: Allocated blocks never overlap and stay inside the network
    #[test]
    fn prop_blocks_disjoint_and_contained(
        network in network(),
        tiers in tiers(),
        zones in zones(),
    ) {
        let tier_count = tiers.len();
        match NetworkTopology::plan("Production", network, &zones, tiers, "Egress") {
            Ok(topology) => {
                let subnets = topology.subnets();
                prop_assert_eq!(subnets.len(), tier_count * zones.len());

                for (i, a) in subnets.iter().enumerate() {
                    prop_assert!(network.contains(&a.cidr), "{} outside {}", a.cidr, network);
                    for b in &subnets[i + 1..] {
                        prop_assert!(!a.cidr.overlaps(&b.cidr), "{} overlaps {}", a.cidr, b.cidr);
                    }
                }
            }
            Err(InfrastructureError::AddressSpaceExhausted { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    /// Property: Every block carries its tier's mask and kind
    #[test]
    fn prop_blocks_match_their_tier(tiers in tiers(), zones in zones()) {
        let network = Ipv4Cidr::DEFAULT_VPC;
        if let Ok(topology) = NetworkTopology::plan("Production", network, &zones, tiers, "Egress") {
            for subnet in topology.subnets() {
                let tier = topology.tier(&subnet.tier).expect("tier of subnet");
                prop_assert_eq!(subnet.cidr.prefix_length(), tier.cidr_mask);
                prop_assert_eq!(subnet.kind, tier.kind);
                prop_assert_eq!(subnet.reserved, tier.reserved);
            }
        }
    }

    /// Property: Reserved tiers are never provisioned
    #[test]
    fn prop_reserved_tiers_not_provisioned(tiers in tiers(), zones in zones()) {
        if let Ok(topology) = NetworkTopology::plan("Production", Ipv4Cidr::DEFAULT_VPC, &zones, tiers, "Egress") {
            for tier in topology.tiers().iter().filter(|t| t.reserved) {
                prop_assert!(topology.provisioned_subnets().all(|s| s.tier != tier.name));
                prop_assert!(topology.select_subnets(&tier.name).is_err());
            }
        }
    }
}
