// Copyright (c) 2025 - Stichting Beep
//! Network ACL Rule Sets
//!
//! Default-deny, explicit-allow policy per subnet tier. Rule numbers are
//! assigned by [`AclRuleSetBuilder`] in declaration order, one sequence per
//! direction, and checked for collisions when the rule set is built.
//!
//! Evaluation follows the control plane: rules of the matching direction are
//! tried in ascending number order, the first match decides, and traffic no
//! rule matches is denied.
//!
//! ```text
//!            Internet
//!               │
//!   ┌───────────▼──────────┐      ┌──────────────────────┐
//!   │ Ingress (load bal.)  │      │ Egress (NAT gateway) │
//!   └───────────┬──────────┘      └───────────▲──────────┘
//!               │ 80                          │ 22/80/443
//!   ┌───────────▼─────────────────────────────┴──────────┐
//!   │ Application (containers)                           │
//!   └───────────┬────────────────────────────────────────┘
//!               │ 3306
//!   ┌───────────▼──────────┐      ┌──────────────────────┐
//!   │ Database (isolated)  │◀─────│ Bastion (jump host)  │
//!   └──────────────────────┘ 3306 └──────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::{debug, info};

use crate::construct::{Reference, Resource, Stack};
use crate::domain::invariants::{validate_not_empty, validate_rule_numbers};
use crate::domain::{Direction, Ipv4Cidr, PortRange, Protocol, ResourceType};
use crate::errors::InfrastructureResult;

/// Single numbered allow entry of a rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    pub name: String,
    pub number: u16,
    pub direction: Direction,
    pub protocol: Protocol,
    pub ports: PortRange,
    /// Source for inbound rules, destination for outbound rules
    pub cidr: Ipv4Cidr,
}

impl AclRule {
    fn matches(&self, protocol: Protocol, port: u16, peer: Ipv4Addr) -> bool {
        self.protocol == protocol && self.ports.contains(port) && self.cidr.contains_addr(peer)
    }
}

/// Outcome of evaluating traffic against a rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Rule `number` matched first
    Allowed { number: u16 },
    /// No rule matched; the implicit deny applies
    ImplicitDeny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Builder assigning rule numbers per direction
///
/// Automatically numbered rules take the next number after the highest one
/// already used in their direction. Explicit numbers are taken as given;
/// collisions surface from [`AclRuleSetBuilder::build`].
#[derive(Debug, Clone)]
pub struct AclRuleSetBuilder {
    name: String,
    tier: String,
    rules: Vec<AclRule>,
}

impl AclRuleSetBuilder {
    pub fn new(name: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier: tier.into(),
            rules: Vec::new(),
        }
    }

    fn next_number(&self, direction: Direction) -> u16 {
        self.rules
            .iter()
            .filter(|r| r.direction == direction)
            .map(|r| r.number)
            .max()
            .map_or(1, |n| n.saturating_add(1))
    }

    /// Allow TCP traffic, numbered automatically
    pub fn allow(
        self,
        name: &str,
        direction: Direction,
        ports: PortRange,
        cidr: Ipv4Cidr,
    ) -> Self {
        let number = self.next_number(direction);
        self.numbered(name, number, direction, ports, cidr)
    }

    pub fn allow_inbound(self, name: &str, ports: PortRange, source: Ipv4Cidr) -> Self {
        self.allow(name, Direction::Inbound, ports, source)
    }

    pub fn allow_outbound(self, name: &str, ports: PortRange, destination: Ipv4Cidr) -> Self {
        self.allow(name, Direction::Outbound, ports, destination)
    }

    /// Allow TCP traffic under an explicit rule number
    pub fn numbered(
        mut self,
        name: &str,
        number: u16,
        direction: Direction,
        ports: PortRange,
        cidr: Ipv4Cidr,
    ) -> Self {
        self.rules.push(AclRule {
            name: name.to_string(),
            number,
            direction,
            protocol: Protocol::Tcp,
            ports,
            cidr,
        });
        self
    }

    /// Check numbering and produce the rule set
    pub fn build(self) -> InfrastructureResult<AclRuleSet> {
        validate_not_empty("rule set name", &self.name)?;
        validate_not_empty("rule set tier", &self.tier)?;

        let numbers: Vec<(Direction, u16)> =
            self.rules.iter().map(|r| (r.direction, r.number)).collect();
        validate_rule_numbers(&self.name, &numbers)?;

        debug!(
            rule_set = %self.name,
            tier = %self.tier,
            rules = self.rules.len(),
            "Built ACL rule set"
        );

        Ok(AclRuleSet {
            name: self.name,
            tier: self.tier,
            rules: self.rules,
        })
    }
}

/// Validated, immutable rule set for one subnet tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRuleSet {
    name: String,
    tier: String,
    rules: Vec<AclRule>,
}

impl AclRuleSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tier whose subnets this rule set governs
    pub fn tier(&self) -> &str {
        &self.tier
    }

    /// Rules in declaration order
    pub fn rules(&self) -> &[AclRule] {
        &self.rules
    }

    /// Rules of one direction in evaluation order
    pub fn rules_in(&self, direction: Direction) -> Vec<&AclRule> {
        let mut rules: Vec<&AclRule> = self
            .rules
            .iter()
            .filter(|r| r.direction == direction)
            .collect();
        rules.sort_by_key(|r| r.number);
        rules
    }

    /// Evaluate a packet the way the control plane does
    pub fn evaluate(
        &self,
        direction: Direction,
        protocol: Protocol,
        port: u16,
        peer: Ipv4Addr,
    ) -> Decision {
        self.rules_in(direction)
            .into_iter()
            .find(|r| r.matches(protocol, port, peer))
            .map_or(Decision::ImplicitDeny, |r| Decision::Allowed { number: r.number })
    }

    fn logical_prefix(&self) -> String {
        format!("{}Acl", self.tier)
    }

    /// Declare the rule set, its entries and one association per subnet
    pub fn synthesize(
        &self,
        stack: &mut Stack,
        vpc: &Reference,
        subnets: &[Reference],
    ) -> InfrastructureResult<Reference> {
        let prefix = self.logical_prefix();

        let acl = stack.add(
            Resource::new(prefix.clone(), ResourceType::NetworkAcl)
                .property("VpcId", vpc.to_ref())
                .property("Tags", json!([{ "Key": "Name", "Value": self.name }])),
        )?;

        for rule in &self.rules {
            stack.add(
                Resource::new(format!("{prefix}{}", rule.name), ResourceType::NetworkAclEntry)
                    .property("NetworkAclId", acl.to_ref())
                    .property("Egress", rule.direction.is_egress())
                    .property("RuleNumber", rule.number)
                    .property("Protocol", rule.protocol.number())
                    .property(
                        "PortRange",
                        json!({ "From": rule.ports.start(), "To": rule.ports.end() }),
                    )
                    .property("CidrBlock", rule.cidr.to_string())
                    .property("RuleAction", "allow"),
            )?;
        }

        for (index, subnet) in subnets.iter().enumerate() {
            stack.add(
                Resource::new(format!("{prefix}Assoc{index}"), ResourceType::SubnetNetworkAclAssociation)
                    .property("NetworkAclId", acl.to_ref())
                    .property("SubnetId", subnet.to_ref()),
            )?;
        }

        info!(
            rule_set = %self.name,
            entries = self.rules.len(),
            associations = subnets.len(),
            "Synthesized network ACL"
        );

        Ok(acl)
    }
}

/// NAT gateway tier
pub fn egress_policy(internal: Ipv4Cidr) -> InfrastructureResult<AclRuleSet> {
    let anywhere = Ipv4Cidr::ANYWHERE;
    AclRuleSetBuilder::new("egress-acl", "Egress")
        // Private subnets -> NAT
        .allow_inbound("InboundSsh", PortRange::SSH, internal)
        .allow_inbound("InboundHttp", PortRange::HTTP, internal)
        .allow_inbound("InboundHttps", PortRange::HTTPS, internal)
        // Internet -> NAT (return traffic)
        .allow_inbound("InboundEphemeral", PortRange::EPHEMERAL_NAT, anywhere)
        .allow_outbound("OutboundSsh", PortRange::SSH, anywhere)
        .allow_outbound("OutboundHttp", PortRange::HTTP, anywhere)
        .allow_outbound("OutboundHttps", PortRange::HTTPS, anywhere)
        // NAT -> private subnets (return traffic)
        .allow_outbound("OutboundEphemeral", PortRange::EPHEMERAL_NAT, internal)
        .build()
}

/// Load balancer tier
pub fn ingress_policy(internal: Ipv4Cidr) -> InfrastructureResult<AclRuleSet> {
    let anywhere = Ipv4Cidr::ANYWHERE;
    AclRuleSetBuilder::new("ingress-acl", "Ingress")
        .allow_inbound("InboundHttp", PortRange::HTTP, anywhere)
        .allow_inbound("InboundHttps", PortRange::HTTPS, anywhere)
        .allow_inbound("InboundHttpsTest", PortRange::HTTPS_TEST, anywhere)
        // Containers -> load balancer (return traffic)
        .allow_inbound("InboundEphemeral", PortRange::EPHEMERAL_ELB, internal)
        // Load balancer -> containers
        .allow_outbound("OutboundHttp", PortRange::HTTP, anywhere)
        .allow_outbound("OutboundEphemeral", PortRange::EPHEMERAL_ELB, anywhere)
        .build()
}

/// Container tier
pub fn application_policy(internal: Ipv4Cidr) -> InfrastructureResult<AclRuleSet> {
    let anywhere = Ipv4Cidr::ANYWHERE;
    AclRuleSetBuilder::new("application-acl", "Application")
        .allow_inbound("InboundHttp", PortRange::HTTP, internal)
        // Internet (through NAT) and database -> containers
        .allow_inbound("InboundEphemeral", PortRange::EPHEMERAL_ELB, anywhere)
        .allow_outbound("OutboundEphemeral", PortRange::EPHEMERAL_ELB, internal)
        .allow_outbound("OutboundHttp", PortRange::HTTP, anywhere)
        .allow_outbound("OutboundHttps", PortRange::HTTPS, anywhere)
        .allow_outbound("OutboundMySql", PortRange::MYSQL, internal)
        .build()
}

/// Jump host tier
pub fn bastion_policy(internal: Ipv4Cidr) -> InfrastructureResult<AclRuleSet> {
    AclRuleSetBuilder::new("bastion-acl", "Bastion")
        .allow_outbound("OutboundMySql", PortRange::MYSQL, internal)
        .allow_inbound("InboundEphemeral", PortRange::EPHEMERAL_LINUX, internal)
        .build()
}

/// The four rule sets of the platform keyed by tier
pub fn platform_policies(internal: Ipv4Cidr) -> InfrastructureResult<BTreeMap<String, AclRuleSet>> {
    let sets = [
        egress_policy(internal)?,
        ingress_policy(internal)?,
        application_policy(internal)?,
        bastion_policy(internal)?,
    ];
    Ok(sets
        .into_iter()
        .map(|set| (set.tier().to_string(), set))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationError;
    use crate::errors::InfrastructureError;

    fn internal() -> Ipv4Cidr {
        "10.0.0.0/16".parse().unwrap()
    }

    fn summary(set: &AclRuleSet, direction: Direction) -> Vec<(u16, String, String)> {
        set.rules_in(direction)
            .into_iter()
            .map(|r| (r.number, r.ports.to_string(), r.cidr.to_string()))
            .collect()
    }

    fn row(number: u16, ports: &str, cidr: &str) -> (u16, String, String) {
        (number, ports.to_string(), cidr.to_string())
    }

    #[test]
    fn test_sequential_numbering_per_direction() {
        let set = AclRuleSetBuilder::new("test-acl", "Test")
            .allow_inbound("A", PortRange::HTTP, internal())
            .allow_outbound("B", PortRange::HTTP, internal())
            .allow_inbound("C", PortRange::HTTPS, internal())
            .build()
            .unwrap();

        let inbound: Vec<u16> = set.rules_in(Direction::Inbound).iter().map(|r| r.number).collect();
        let outbound: Vec<u16> = set.rules_in(Direction::Outbound).iter().map(|r| r.number).collect();
        assert_eq!(inbound, vec![1, 2]);
        assert_eq!(outbound, vec![1]);
    }

    #[test]
    fn test_explicit_number_then_sequential() {
        let set = AclRuleSetBuilder::new("test-acl", "Test")
            .numbered("A", 10, Direction::Inbound, PortRange::HTTP, internal())
            .allow_inbound("B", PortRange::HTTPS, internal())
            .build()
            .unwrap();
        let numbers: Vec<u16> = set.rules().iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![10, 11]);
    }

    #[test]
    fn test_duplicate_number_rejected() {
        let err = AclRuleSetBuilder::new("test-acl", "Test")
            .allow_inbound("A", PortRange::HTTP, internal())
            .numbered("B", 1, Direction::Inbound, PortRange::HTTPS, internal())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            InfrastructureError::Validation(ValidationError::DuplicateRuleNumber { number: 1, .. })
        ));
    }

    #[test]
    fn test_same_number_in_other_direction_is_fine() {
        let set = AclRuleSetBuilder::new("test-acl", "Test")
            .numbered("A", 1, Direction::Inbound, PortRange::HTTP, internal())
            .numbered("B", 1, Direction::Outbound, PortRange::HTTP, internal())
            .build();
        assert!(set.is_ok());
    }

    #[test]
    fn test_application_policy() {
        let set = application_policy(internal()).unwrap();
        assert_eq!(
            summary(&set, Direction::Inbound),
            vec![row(1, "80", "10.0.0.0/16"), row(2, "1024-65535", "0.0.0.0/0")]
        );
        assert_eq!(
            summary(&set, Direction::Outbound),
            vec![
                row(1, "1024-65535", "10.0.0.0/16"),
                row(2, "80", "0.0.0.0/0"),
                row(3, "443", "0.0.0.0/0"),
                row(4, "3306", "10.0.0.0/16"),
            ]
        );
    }

    #[test]
    fn test_egress_policy() {
        let set = egress_policy(internal()).unwrap();
        assert_eq!(
            summary(&set, Direction::Inbound),
            vec![
                row(1, "22", "10.0.0.0/16"),
                row(2, "80", "10.0.0.0/16"),
                row(3, "443", "10.0.0.0/16"),
                row(4, "32768-65535", "0.0.0.0/0"),
            ]
        );
        assert_eq!(
            summary(&set, Direction::Outbound),
            vec![
                row(1, "22", "0.0.0.0/0"),
                row(2, "80", "0.0.0.0/0"),
                row(3, "443", "0.0.0.0/0"),
                row(4, "32768-65535", "10.0.0.0/16"),
            ]
        );
    }

    #[test]
    fn test_ingress_policy() {
        let set = ingress_policy(internal()).unwrap();
        assert_eq!(
            summary(&set, Direction::Inbound),
            vec![
                row(1, "80", "0.0.0.0/0"),
                row(2, "443", "0.0.0.0/0"),
                row(3, "4433", "0.0.0.0/0"),
                row(4, "1024-65535", "10.0.0.0/16"),
            ]
        );
        assert_eq!(
            summary(&set, Direction::Outbound),
            vec![row(1, "80", "0.0.0.0/0"), row(2, "1024-65535", "0.0.0.0/0")]
        );
    }

    #[test]
    fn test_bastion_policy() {
        let set = bastion_policy(internal()).unwrap();
        assert_eq!(
            summary(&set, Direction::Outbound),
            vec![row(1, "3306", "10.0.0.0/16")]
        );
        assert_eq!(
            summary(&set, Direction::Inbound),
            vec![row(1, "32768-61000", "10.0.0.0/16")]
        );
    }

    #[test]
    fn test_evaluate_first_match_and_implicit_deny() {
        let set = application_policy(internal()).unwrap();
        let internal_peer = Ipv4Addr::new(10, 0, 1, 20);
        let external_peer = Ipv4Addr::new(52, 1, 2, 3);

        assert_eq!(
            set.evaluate(Direction::Inbound, Protocol::Tcp, 80, internal_peer),
            Decision::Allowed { number: 1 }
        );
        // 80 from the internet matches no rule
        assert_eq!(
            set.evaluate(Direction::Inbound, Protocol::Tcp, 80, external_peer),
            Decision::ImplicitDeny
        );
        // 3306 internally matches the ephemeral rule first
        assert_eq!(
            set.evaluate(Direction::Outbound, Protocol::Tcp, 3306, internal_peer),
            Decision::Allowed { number: 1 }
        );
        assert!(!set
            .evaluate(Direction::Outbound, Protocol::Udp, 443, external_peer)
            .is_allowed());
        assert!(!set
            .evaluate(Direction::Outbound, Protocol::Tcp, 22, external_peer)
            .is_allowed());
    }

    #[test]
    fn test_platform_policies_keyed_by_tier() {
        let policies = platform_policies(internal()).unwrap();
        let tiers: Vec<&str> = policies.keys().map(String::as_str).collect();
        assert_eq!(tiers, vec!["Application", "Bastion", "Egress", "Ingress"]);
        assert_eq!(policies["Bastion"].name(), "bastion-acl");
    }
}
