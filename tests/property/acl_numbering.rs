// Copyright (c) 2025 - Stichting Beep
//! Property-Based Tests for ACL Rule Numbering and Evaluation

use beep_infrastructure::domain::{Direction, Ipv4Cidr, PortRange, Protocol};
use beep_infrastructure::network::{AclRuleSetBuilder, Decision};
use proptest::prelude::*;
use std::net::Ipv4Addr;

// ============================================================================
// Strategies
// ============================================================================

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Inbound), Just(Direction::Outbound)]
}

fn ports() -> impl Strategy<Value = PortRange> {
    (1u16..=65535, 0u16..2048).prop_map(|(start, width)| {
        PortRange::new(start, start.saturating_add(width)).expect("ordered range")
    })
}

fn cidr() -> impl Strategy<Value = Ipv4Cidr> {
    prop_oneof![
        Just(Ipv4Cidr::ANYWHERE),
        Just(Ipv4Cidr::DEFAULT_VPC),
        Just("10.0.3.0/24".parse::<Ipv4Cidr>().expect("valid block")),
    ]
}

fn rules() -> impl Strategy<Value = Vec<(Direction, PortRange, Ipv4Cidr)>> {
    prop::collection::vec((direction(), ports(), cidr()), 0..40)
}

fn builder(rules: &[(Direction, PortRange, Ipv4Cidr)]) -> AclRuleSetBuilder {
    rules
        .iter()
        .enumerate()
        .fold(AclRuleSetBuilder::new("generated-acl", "Generated"), |b, (i, (direction, ports, cidr))| {
            b.allow(&format!("Rule{i}"), *direction, *ports, *cidr)
        })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: Automatic numbering is sequential per direction
    ///
    /// Rules of one direction are numbered 1..=n in declaration order, so
    /// building never reports a collision.
    #[test]
    fn prop_sequential_numbers(rules in rules()) {
        let set = builder(&rules).build().expect("automatic numbers never collide");

        for direction in [Direction::Inbound, Direction::Outbound] {
            let numbers: Vec<u16> = set
                .rules()
                .iter()
                .filter(|r| r.direction == direction)
                .map(|r| r.number)
                .collect();
            let expected: Vec<u16> = (1..=numbers.len() as u16).collect();
            prop_assert_eq!(numbers, expected);
        }
    }

    /// Property: An explicit number already in use is rejected
    #[test]
    fn prop_explicit_collision_rejected(rules in rules(), direction in direction()) {
        let used = rules.iter().filter(|(d, _, _)| *d == direction).count() as u16;
        prop_assume!(used > 0);

        let result = builder(&rules)
            .numbered("Collision", used, direction, PortRange::HTTP, Ipv4Cidr::ANYWHERE)
            .build();
        prop_assert!(result.is_err());
    }

    /// Property: The first matching rule decides
    ///
    /// The decision names the lowest-numbered rule that matches, and traffic
    /// no rule matches is denied.
    #[test]
    fn prop_first_match_wins(
        rules in rules(),
        direction in direction(),
        port in 1u16..=65535,
        peer in prop_oneof![Just(Ipv4Addr::new(10, 0, 3, 9)), Just(Ipv4Addr::new(10, 0, 7, 1)), Just(Ipv4Addr::new(8, 8, 4, 4))],
    ) {
        let set = builder(&rules).build().expect("valid rule set");

        let first = set
            .rules_in(direction)
            .into_iter()
            .filter(|r| r.ports.contains(port) && r.cidr.contains_addr(peer))
            .map(|r| r.number)
            .min();

        match (set.evaluate(direction, Protocol::Tcp, port, peer), first) {
            (Decision::Allowed { number }, Some(expected)) => prop_assert_eq!(number, expected),
            (Decision::ImplicitDeny, None) => {}
            (decision, expected) => prop_assert!(false, "{:?} but expected rule {:?}", decision, expected),
        }
    }
}
