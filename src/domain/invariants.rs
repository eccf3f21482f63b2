// Copyright (c) 2025 - Stichting Beep
//! Pure Validation Functions - Domain Invariants
//!
//! Business rules the infrastructure definition must satisfy before it is
//! handed to the control plane. All functions are pure (no side effects) and
//! return detailed validation results.
//!
//! # Invariant Categories
//!
//! 1. **Addressing**: subnet blocks are disjoint and inside the network
//! 2. **Network policy**: rule numbers are unique, associations match tiers
//! 3. **Delivery**: artifacts flow forward through a pipeline
//! 4. **Resources**: settings the chosen resource classes actually support

use std::collections::{BTreeMap, HashSet};

use super::network::{Direction, Ipv4Cidr};

/// Validation result with detailed error information
pub type ValidationResult = Result<(), ValidationError>;

/// Lowest rule number the control plane accepts
pub const MIN_RULE_NUMBER: u16 = 1;

/// Highest rule number the control plane accepts
pub const MAX_RULE_NUMBER: u16 = 32766;

/// Validation error with context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Subnet block lies (partly) outside the network block
    #[error("Subnet {block} of tier {tier} is not contained in {network}")]
    CidrNotContained {
        tier: String,
        block: Ipv4Cidr,
        network: Ipv4Cidr,
    },

    /// Two subnet blocks share addresses
    #[error("Subnet blocks {first} and {second} overlap")]
    CidrOverlap { first: Ipv4Cidr, second: Ipv4Cidr },

    /// A subnet does not carry the mask its tier declares
    #[error("Tier {tier} declares /{expected} but subnet has /{actual}")]
    MaskMismatch { tier: String, expected: u8, actual: u8 },

    /// Two rules in one rule set and direction share a number
    #[error("Rule number {number} used twice for {direction} rules of {rule_set}")]
    DuplicateRuleNumber {
        rule_set: String,
        direction: Direction,
        number: u16,
    },

    /// Rule number outside the accepted range
    #[error("Rule number {number} of {rule_set} is outside {MIN_RULE_NUMBER}-{MAX_RULE_NUMBER}")]
    RuleNumberOutOfRange { rule_set: String, number: u16 },

    /// A subnet is associated with a rule set of another tier
    #[error("Subnet {subnet} of tier {subnet_tier} is associated with rule set for tier {rule_set_tier}")]
    AssociationMismatch {
        subnet: String,
        subnet_tier: String,
        rule_set_tier: String,
    },

    /// A subnet of a governed tier has no association
    #[error("Subnet {subnet} has no association with rule set {rule_set}")]
    MissingAssociation { subnet: String, rule_set: String },

    /// A subnet is associated more than once
    #[error("Subnet {0} is associated with more than one rule set")]
    DuplicateAssociation(String),

    /// Retention policy must keep at least one image
    #[error("Registry {registry} must retain at least one image, got {max_image_count}")]
    InvalidRetention {
        registry: String,
        max_image_count: u32,
    },

    /// The instance class does not support a requested feature
    #[error("Instance class {instance_class} does not support {feature}")]
    UnsupportedDatabaseFeature {
        instance_class: String,
        feature: String,
    },

    /// Pipeline has no stages
    #[error("Pipeline {0} has no stages")]
    EmptyPipeline(String),

    /// Stage has no actions
    #[error("Stage {stage} of pipeline {pipeline} has no actions")]
    EmptyStage { pipeline: String, stage: String },

    /// Source actions must all live in the first stage
    #[error("Source action {action} of pipeline {pipeline} is not in the first stage")]
    SourceOutsideFirstStage { pipeline: String, action: String },

    /// The first stage may only contain source actions
    #[error("Action {action} in the first stage of pipeline {pipeline} is not a source action")]
    FirstStageNotSource { pipeline: String, action: String },

    /// Run orders start at 1
    #[error("Action {action} has run order {run_order}, must be at least 1")]
    InvalidRunOrder { action: String, run_order: u32 },

    /// An artifact is produced by more than one action
    #[error("Artifact {artifact} is produced more than once in pipeline {pipeline}")]
    DuplicateArtifact { pipeline: String, artifact: String },

    /// An action consumes an artifact nothing produced before it
    #[error("Action {action} of pipeline {pipeline} consumes {artifact} before it is produced")]
    ArtifactNotProduced {
        pipeline: String,
        action: String,
        artifact: String,
    },

    /// Logical ids are alphanumeric
    #[error("Invalid logical id: {0}")]
    InvalidLogicalId(String),

    /// A required value is empty
    #[error("{0} must not be empty")]
    EmptyField(String),
}

/// Validate that every subnet block fits the network and no two overlap
///
/// # Rules
/// - Each block is contained in `network`
/// - Each block carries the mask declared for its tier
/// - Blocks are pairwise disjoint
pub fn validate_subnet_layout(
    network: &Ipv4Cidr,
    blocks: &[(String, u8, Ipv4Cidr)],
) -> ValidationResult {
    for (tier, expected_mask, block) in blocks {
        if !network.contains(block) {
            return Err(ValidationError::CidrNotContained {
                tier: tier.clone(),
                block: *block,
                network: *network,
            });
        }

        if block.prefix_length() != *expected_mask {
            return Err(ValidationError::MaskMismatch {
                tier: tier.clone(),
                expected: *expected_mask,
                actual: block.prefix_length(),
            });
        }
    }

    for (i, (_, _, first)) in blocks.iter().enumerate() {
        for (_, _, second) in &blocks[i + 1..] {
            if first.overlaps(second) {
                return Err(ValidationError::CidrOverlap {
                    first: *first,
                    second: *second,
                });
            }
        }
    }

    Ok(())
}

/// Validate rule numbers of one rule set
///
/// # Rules
/// - Numbers lie in the accepted range
/// - No two rules of the same direction share a number
pub fn validate_rule_numbers(rule_set: &str, rules: &[(Direction, u16)]) -> ValidationResult {
    let mut seen = HashSet::new();

    for (direction, number) in rules {
        if !(MIN_RULE_NUMBER..=MAX_RULE_NUMBER).contains(number) {
            return Err(ValidationError::RuleNumberOutOfRange {
                rule_set: rule_set.to_string(),
                number: *number,
            });
        }

        if !seen.insert((*direction, *number)) {
            return Err(ValidationError::DuplicateRuleNumber {
                rule_set: rule_set.to_string(),
                direction: *direction,
                number: *number,
            });
        }
    }

    Ok(())
}

/// Validate subnet to rule-set associations
///
/// `subnet_tiers` maps every provisioned subnet to its tier,
/// `governed_tiers` maps every tier that has a rule set to that rule set's
/// name, and `associations` lists `(subnet, rule set tier)` pairs.
///
/// # Rules
/// - Every subnet of a governed tier is associated exactly once
/// - No subnet is associated with the rule set of a different tier
pub fn validate_acl_associations(
    subnet_tiers: &BTreeMap<String, String>,
    governed_tiers: &BTreeMap<String, String>,
    associations: &[(String, String)],
) -> ValidationResult {
    let mut associated = HashSet::new();

    for (subnet, rule_set_tier) in associations {
        if !associated.insert(subnet.as_str()) {
            return Err(ValidationError::DuplicateAssociation(subnet.clone()));
        }

        let subnet_tier = subnet_tiers.get(subnet).map(String::as_str).unwrap_or("");
        if subnet_tier != rule_set_tier {
            return Err(ValidationError::AssociationMismatch {
                subnet: subnet.clone(),
                subnet_tier: subnet_tier.to_string(),
                rule_set_tier: rule_set_tier.clone(),
            });
        }
    }

    for (subnet, tier) in subnet_tiers {
        if let Some(rule_set) = governed_tiers.get(tier) {
            if !associated.contains(subnet.as_str()) {
                return Err(ValidationError::MissingAssociation {
                    subnet: subnet.clone(),
                    rule_set: rule_set.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Validate an image retention rule
pub fn validate_retention(registry: &str, max_image_count: u32) -> ValidationResult {
    if max_image_count == 0 {
        return Err(ValidationError::InvalidRetention {
            registry: registry.to_string(),
            max_image_count,
        });
    }
    Ok(())
}

/// Validate database settings against the instance class
///
/// # Rules
/// - Micro instance classes support neither encryption at rest nor
///   performance insights
pub fn validate_database_instance(
    instance_class: &str,
    storage_encrypted: bool,
    performance_insights: bool,
) -> ValidationResult {
    let micro = instance_class.ends_with(".micro");

    if micro && storage_encrypted {
        return Err(ValidationError::UnsupportedDatabaseFeature {
            instance_class: instance_class.to_string(),
            feature: "storage encryption".to_string(),
        });
    }

    if micro && performance_insights {
        return Err(ValidationError::UnsupportedDatabaseFeature {
            instance_class: instance_class.to_string(),
            feature: "performance insights".to_string(),
        });
    }

    Ok(())
}

/// Validate a logical id
///
/// # Rules
/// - Non-empty, at most 255 characters
/// - ASCII alphanumeric only
pub fn validate_logical_id(logical_id: &str) -> ValidationResult {
    if logical_id.is_empty()
        || logical_id.len() > 255
        || !logical_id.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ValidationError::InvalidLogicalId(logical_id.to_string()));
    }
    Ok(())
}

/// Validate that a required value is present
pub fn validate_not_empty(field: &str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> Ipv4Cidr {
        s.parse().unwrap()
    }

    #[test]
    fn test_validate_subnet_layout_valid() {
        let network = cidr("10.0.0.0/16");
        let blocks = vec![
            ("Egress".to_string(), 24, cidr("10.0.0.0/24")),
            ("Ingress".to_string(), 24, cidr("10.0.1.0/24")),
        ];
        assert!(validate_subnet_layout(&network, &blocks).is_ok());
    }

    #[test]
    fn test_validate_subnet_layout_overlap() {
        let network = cidr("10.0.0.0/16");
        let blocks = vec![
            ("Egress".to_string(), 24, cidr("10.0.0.0/24")),
            ("Ingress".to_string(), 23, cidr("10.0.0.0/23")),
        ];
        assert!(matches!(
            validate_subnet_layout(&network, &blocks),
            Err(ValidationError::CidrOverlap { .. })
        ));
    }

    #[test]
    fn test_validate_subnet_layout_outside() {
        let network = cidr("10.0.0.0/16");
        let blocks = vec![("Egress".to_string(), 24, cidr("10.1.0.0/24"))];
        assert!(matches!(
            validate_subnet_layout(&network, &blocks),
            Err(ValidationError::CidrNotContained { .. })
        ));
    }

    #[test]
    fn test_validate_subnet_layout_mask() {
        let network = cidr("10.0.0.0/16");
        let blocks = vec![("Egress".to_string(), 24, cidr("10.0.0.0/25"))];
        assert!(matches!(
            validate_subnet_layout(&network, &blocks),
            Err(ValidationError::MaskMismatch { expected: 24, actual: 25, .. })
        ));
    }

    #[test]
    fn test_validate_rule_numbers() {
        let rules = vec![
            (Direction::Inbound, 1),
            (Direction::Inbound, 2),
            (Direction::Outbound, 1),
        ];
        assert!(validate_rule_numbers("egress-acl", &rules).is_ok());

        let clash = vec![(Direction::Outbound, 3), (Direction::Outbound, 3)];
        assert_eq!(
            validate_rule_numbers("application-acl", &clash),
            Err(ValidationError::DuplicateRuleNumber {
                rule_set: "application-acl".to_string(),
                direction: Direction::Outbound,
                number: 3,
            })
        );

        assert!(validate_rule_numbers("x", &[(Direction::Inbound, 0)]).is_err());
        assert!(validate_rule_numbers("x", &[(Direction::Inbound, 32767)]).is_err());
    }

    #[test]
    fn test_validate_acl_associations() {
        let subnets: BTreeMap<String, String> = [
            ("EgressSubnet1", "Egress"),
            ("DatabaseSubnet1", "Database"),
        ]
        .iter()
        .map(|(s, t)| (s.to_string(), t.to_string()))
        .collect();
        let governed: BTreeMap<String, String> =
            [("Egress".to_string(), "egress-acl".to_string())].into_iter().collect();

        let ok = vec![("EgressSubnet1".to_string(), "Egress".to_string())];
        assert!(validate_acl_associations(&subnets, &governed, &ok).is_ok());

        let wrong = vec![
            ("EgressSubnet1".to_string(), "Egress".to_string()),
            ("DatabaseSubnet1".to_string(), "Egress".to_string()),
        ];
        assert!(matches!(
            validate_acl_associations(&subnets, &governed, &wrong),
            Err(ValidationError::AssociationMismatch { .. })
        ));

        assert!(matches!(
            validate_acl_associations(&subnets, &governed, &[]),
            Err(ValidationError::MissingAssociation { .. })
        ));

        let twice = vec![
            ("EgressSubnet1".to_string(), "Egress".to_string()),
            ("EgressSubnet1".to_string(), "Egress".to_string()),
        ];
        assert!(matches!(
            validate_acl_associations(&subnets, &governed, &twice),
            Err(ValidationError::DuplicateAssociation(_))
        ));
    }

    #[test]
    fn test_validate_retention() {
        assert!(validate_retention("beep-api-prod", 10).is_ok());
        assert!(validate_retention("beep-api-prod", 0).is_err());
    }

    #[test]
    fn test_validate_database_instance() {
        assert!(validate_database_instance("db.t2.micro", false, false).is_ok());
        assert!(validate_database_instance("db.t2.micro", true, false).is_err());
        assert!(validate_database_instance("db.t2.micro", false, true).is_err());
        assert!(validate_database_instance("db.m5.large", true, true).is_ok());
    }

    #[test]
    fn test_validate_logical_id() {
        assert!(validate_logical_id("EgressAclInboundSsh").is_ok());
        assert!(validate_logical_id("").is_err());
        assert!(validate_logical_id("Egress-Acl").is_err());
    }
}
