// Copyright (c) 2025 - Stichting Beep
//! Network Topology
//!
//! One virtual network split into named subnet tiers. Each tier gets one
//! block per availability zone; blocks are handed out consecutively from the
//! network base address in tier order. Reserved tiers take their address
//! space but are never provisioned, so adding them later does not shift the
//! blocks of the tiers after them.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::construct::{intrinsics, Export, Reference, Resource, Stack};
use crate::domain::invariants::{validate_logical_id, validate_not_empty, validate_subnet_layout};
use crate::domain::{Ipv4Cidr, NetworkError, ResourceType};
use crate::errors::{InfrastructureError, InfrastructureResult};

/// Reachability class of a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetKind {
    /// Routed to the internet gateway
    Public,
    /// Outbound only, through the NAT gateway
    Private,
    /// No route out of the network
    Isolated,
}

impl SubnetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetKind::Public => "Public",
            SubnetKind::Private => "Private",
            SubnetKind::Isolated => "Isolated",
        }
    }
}

/// Named subnet group with one reachability class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetTier {
    pub name: String,
    pub kind: SubnetKind,
    pub cidr_mask: u8,
    pub reserved: bool,
}

impl SubnetTier {
    pub fn new(name: impl Into<String>, kind: SubnetKind, cidr_mask: u8) -> Self {
        Self {
            name: name.into(),
            kind,
            cidr_mask,
            reserved: false,
        }
    }

    pub fn public(name: impl Into<String>, cidr_mask: u8) -> Self {
        Self::new(name, SubnetKind::Public, cidr_mask)
    }

    pub fn private(name: impl Into<String>, cidr_mask: u8) -> Self {
        Self::new(name, SubnetKind::Private, cidr_mask)
    }

    pub fn isolated(name: impl Into<String>, cidr_mask: u8) -> Self {
        Self::new(name, SubnetKind::Isolated, cidr_mask)
    }

    /// Keep the address space but do not provision the tier
    pub fn reserved(mut self) -> Self {
        self.reserved = true;
        self
    }
}

/// Tiers of the platform network, in allocation order
pub fn platform_tiers() -> Vec<SubnetTier> {
    vec![
        SubnetTier::public("Egress", 24),
        SubnetTier::public("Ingress", 24),
        SubnetTier::private("Application", 24),
        SubnetTier::isolated("Database", 24),
        SubnetTier::private("Codebuild", 24),
        SubnetTier::private("Bastion", 24),
    ]
}

/// One allocated subnet block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSubnet {
    pub tier: String,
    pub kind: SubnetKind,
    pub availability_zone: String,
    pub cidr: Ipv4Cidr,
    pub logical_id: String,
    pub reserved: bool,
}

/// Address plan of the network, validated on construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTopology {
    name: String,
    cidr: Ipv4Cidr,
    availability_zones: Vec<String>,
    tiers: Vec<SubnetTier>,
    subnets: Vec<PlannedSubnet>,
    nat_tier: String,
}

impl NetworkTopology {
    /// Allocate blocks for `tiers` and check the resulting layout
    ///
    /// `nat_tier` names the public tier whose first subnet hosts the single
    /// NAT gateway.
    pub fn plan(
        name: &str,
        cidr: Ipv4Cidr,
        availability_zones: &[String],
        tiers: Vec<SubnetTier>,
        nat_tier: &str,
    ) -> InfrastructureResult<Self> {
        validate_logical_id(name)?;
        if availability_zones.is_empty() {
            return Err(InfrastructureError::Configuration(
                "at least one availability zone is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for tier in &tiers {
            validate_not_empty("tier name", &tier.name)?;
            validate_logical_id(&tier.name)?;
            if !names.insert(tier.name.as_str()) {
                return Err(InfrastructureError::Configuration(format!(
                    "subnet tier {} declared twice",
                    tier.name
                )));
            }
        }

        let subnets = allocate(name, cidr, availability_zones, &tiers)?;

        let blocks: Vec<(String, u8, Ipv4Cidr)> = subnets
            .iter()
            .map(|s| {
                let mask = tiers
                    .iter()
                    .find(|t| t.name == s.tier)
                    .map_or(s.cidr.prefix_length(), |t| t.cidr_mask);
                (s.tier.clone(), mask, s.cidr)
            })
            .collect();
        validate_subnet_layout(&cidr, &blocks)?;

        let topology = Self {
            name: name.to_string(),
            cidr,
            availability_zones: availability_zones.to_vec(),
            tiers,
            subnets,
            nat_tier: nat_tier.to_string(),
        };

        let nat = topology.tier(nat_tier)?;
        if nat.kind != SubnetKind::Public || nat.reserved {
            return Err(InfrastructureError::Configuration(format!(
                "NAT gateway tier {nat_tier} must be a provisioned public tier"
            )));
        }

        debug!(
            network = %topology.cidr,
            tiers = topology.tiers.len(),
            subnets = topology.subnets.len(),
            "Planned network topology"
        );

        Ok(topology)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    pub fn availability_zones(&self) -> &[String] {
        &self.availability_zones
    }

    pub fn tiers(&self) -> &[SubnetTier] {
        &self.tiers
    }

    /// All allocated blocks, reserved tiers included
    pub fn subnets(&self) -> &[PlannedSubnet] {
        &self.subnets
    }

    /// Provisioned subnets only
    pub fn provisioned_subnets(&self) -> impl Iterator<Item = &PlannedSubnet> {
        self.subnets.iter().filter(|s| !s.reserved)
    }

    pub fn tier(&self, name: &str) -> InfrastructureResult<&SubnetTier> {
        self.tiers
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| InfrastructureError::UnknownTier(name.to_string()))
    }

    /// Provisioned subnets of one tier, one per availability zone
    pub fn select_subnets(&self, tier: &str) -> InfrastructureResult<Vec<&PlannedSubnet>> {
        if self.tier(tier)?.reserved {
            return Err(InfrastructureError::ReservedTier(tier.to_string()));
        }
        Ok(self.subnets.iter().filter(|s| s.tier == tier).collect())
    }

    /// Subnet hosting the NAT gateway
    pub fn nat_subnet(&self) -> InfrastructureResult<&PlannedSubnet> {
        self.select_subnets(&self.nat_tier)?
            .into_iter()
            .next()
            .ok_or_else(|| InfrastructureError::UnknownTier(self.nat_tier.clone()))
    }

    /// Declare the network in `stack`
    pub fn synthesize(&self, stack: &mut Stack) -> InfrastructureResult<NetworkHandle> {
        let path = format!("{}/{}", stack.name(), self.name);
        let vpc = stack.add(
            Resource::new(self.name.clone(), ResourceType::Vpc)
                .property("CidrBlock", self.cidr.to_string())
                .property("EnableDnsHostnames", true)
                .property("EnableDnsSupport", true)
                .property("InstanceTenancy", "default")
                .property("Tags", name_tag(&path)),
        )?;

        let gateway = stack.add(
            Resource::new(format!("{}IGW", self.name), ResourceType::InternetGateway)
                .property("Tags", name_tag(&path)),
        )?;
        let attachment = stack.add(
            Resource::new(format!("{}VPCGW", self.name), ResourceType::VpcGatewayAttachment)
                .property("VpcId", vpc.to_ref())
                .property("InternetGatewayId", gateway.to_ref()),
        )?;

        let nat_subnet = self.nat_subnet()?.logical_id.clone();
        let nat_gateway = intrinsics::reference(&format!("{nat_subnet}NATGateway"));

        let mut subnets: BTreeMap<String, Vec<Reference>> = BTreeMap::new();
        for planned in self.provisioned_subnets() {
            let subnet = stack.add(
                Resource::new(planned.logical_id.clone(), ResourceType::Subnet)
                    .property("VpcId", vpc.to_ref())
                    .property("CidrBlock", planned.cidr.to_string())
                    .property("AvailabilityZone", planned.availability_zone.clone())
                    .property("MapPublicIpOnLaunch", planned.kind == SubnetKind::Public)
                    .property(
                        "Tags",
                        json!([
                            { "Key": "Name", "Value": format!("{path}/{}", planned.logical_id) },
                            { "Key": "beep:subnet-name", "Value": planned.tier },
                            { "Key": "beep:subnet-type", "Value": planned.kind.as_str() },
                        ]),
                    ),
            )?;

            let route_table = stack.add(
                Resource::new(format!("{}RouteTable", planned.logical_id), ResourceType::RouteTable)
                    .property("VpcId", vpc.to_ref()),
            )?;
            stack.add(
                Resource::new(
                    format!("{}RouteTableAssociation", planned.logical_id),
                    ResourceType::SubnetRouteTableAssociation,
                )
                .property("RouteTableId", route_table.to_ref())
                .property("SubnetId", subnet.to_ref()),
            )?;

            let default_route = Resource::new(format!("{}DefaultRoute", planned.logical_id), ResourceType::Route)
                .property("RouteTableId", route_table.to_ref())
                .property("DestinationCidrBlock", Ipv4Cidr::ANYWHERE.to_string());

            match planned.kind {
                SubnetKind::Public => {
                    stack.add(
                        default_route
                            .property("GatewayId", gateway.to_ref())
                            .depends_on(&attachment),
                    )?;
                    if planned.logical_id == nat_subnet {
                        let eip = stack.add(
                            Resource::new(format!("{}EIP", planned.logical_id), ResourceType::ElasticIp)
                                .property("Domain", "vpc"),
                        )?;
                        stack.add(
                            Resource::new(format!("{}NATGateway", planned.logical_id), ResourceType::NatGateway)
                                .property("SubnetId", subnet.to_ref())
                                .property("AllocationId", eip.attr("AllocationId")),
                        )?;
                    }
                }
                SubnetKind::Private => {
                    stack.add(default_route.property("NatGatewayId", nat_gateway.clone()))?;
                }
                SubnetKind::Isolated => {}
            }

            subnets.entry(planned.tier.clone()).or_default().push(subnet);
        }

        let exports = NetworkExports {
            vpc_id: stack.export("VpcId", vpc.to_ref()),
            vpc_cidr: stack.export("VpcCidr", vpc.attr("CidrBlock")),
            subnet_ids: subnets
                .iter()
                .map(|(tier, refs)| {
                    let ids = intrinsics::join(",", refs.iter().map(Reference::to_ref).collect());
                    (tier.clone(), stack.export(&format!("{tier}SubnetIds"), ids))
                })
                .collect(),
        };

        info!(
            stack = %stack.name(),
            network = %self.cidr,
            subnets = subnets.values().map(Vec::len).sum::<usize>(),
            "Synthesized network topology"
        );

        Ok(NetworkHandle {
            vpc,
            subnets,
            exports,
        })
    }
}

fn name_tag(name: &str) -> serde_json::Value {
    json!([{ "Key": "Name", "Value": name }])
}

/// Hand out blocks tier by tier, one per availability zone
fn allocate(
    network_name: &str,
    network: Ipv4Cidr,
    availability_zones: &[String],
    tiers: &[SubnetTier],
) -> InfrastructureResult<Vec<PlannedSubnet>> {
    let mut subnets = Vec::new();
    let mut offset: u64 = 0;

    for tier in tiers {
        if tier.cidr_mask < network.prefix_length() || tier.cidr_mask > 32 {
            return Err(NetworkError::InvalidPrefixLength(tier.cidr_mask).into());
        }
        let block = 1u64 << (32 - u32::from(tier.cidr_mask));

        for (az_index, availability_zone) in availability_zones.iter().enumerate() {
            let aligned = offset.div_ceil(block) * block;
            let exhausted = || InfrastructureError::AddressSpaceExhausted {
                network: network.to_string(),
                tier: tier.name.clone(),
            };
            let index = u32::try_from(aligned / block).map_err(|_| exhausted())?;
            let cidr = network.subnet(tier.cidr_mask, index).map_err(|e| match e {
                NetworkError::SubnetOutOfRange { .. } => exhausted(),
                other => other.into(),
            })?;

            subnets.push(PlannedSubnet {
                tier: tier.name.clone(),
                kind: tier.kind,
                availability_zone: availability_zone.clone(),
                cidr,
                logical_id: format!("{network_name}{}Subnet{}", tier.name, az_index + 1),
                reserved: tier.reserved,
            });
            offset = aligned + block;
        }
    }

    Ok(subnets)
}

/// Cross-stack handles to the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkExports {
    pub vpc_id: Export,
    pub vpc_cidr: Export,
    subnet_ids: BTreeMap<String, Export>,
}

impl NetworkExports {
    /// Comma-joined subnet ids of a provisioned tier
    pub fn subnet_ids(&self, tier: &str) -> InfrastructureResult<&Export> {
        self.subnet_ids
            .get(tier)
            .ok_or_else(|| InfrastructureError::UnknownTier(tier.to_string()))
    }

    /// Subnet ids of a tier as a list, imported into `stack`
    pub fn import_subnet_ids(&self, stack: &mut Stack, tier: &str) -> InfrastructureResult<serde_json::Value> {
        let export = self.subnet_ids(tier)?.clone();
        Ok(intrinsics::split(",", stack.import(&export)))
    }
}

/// In-stack handles produced by [`NetworkTopology::synthesize`]
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    pub vpc: Reference,
    subnets: BTreeMap<String, Vec<Reference>>,
    pub exports: NetworkExports,
}

impl NetworkHandle {
    pub fn subnets(&self, tier: &str) -> InfrastructureResult<&[Reference]> {
        self.subnets
            .get(tier)
            .map(Vec::as_slice)
            .ok_or_else(|| InfrastructureError::UnknownTier(tier.to_string()))
    }
}
