// Copyright (c) 2025 - Stichting Beep
//! Jump host reachable through the session manager

use serde_json::json;
use tracing::info;

use super::topology::NetworkHandle;
use crate::construct::{Reference, Resource, Role, Stack};
use crate::domain::{Ipv4Cidr, ResourceType};
use crate::errors::{InfrastructureError, InfrastructureResult};

/// Latest Amazon Linux 2 image, resolved by the control plane
const AMAZON_LINUX_2_IMAGE: &str =
    "{{resolve:ssm:/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2}}";

const SSM_MANAGED_INSTANCE_POLICY: &str = "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore";

/// Linux jump host in the first subnet of a tier
#[derive(Debug, Clone)]
pub struct BastionHost {
    name: String,
    tier: String,
    instance_type: String,
}

impl BastionHost {
    pub fn new(name: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier: tier.into(),
            instance_type: "t3.nano".to_string(),
        }
    }

    pub fn synthesize(&self, stack: &mut Stack, network: &NetworkHandle) -> InfrastructureResult<Reference> {
        let subnet = network
            .subnets(&self.tier)?
            .first()
            .cloned()
            .ok_or_else(|| InfrastructureError::UnknownTier(self.tier.clone()))?;

        let description = format!("{}/{}/SecurityGroup", stack.name(), self.name);
        let security_group = stack.add(
            Resource::new(format!("{}SecurityGroup", self.name), ResourceType::SecurityGroup)
                .property("GroupDescription", description)
                .property("VpcId", network.vpc.to_ref())
                .property(
                    "SecurityGroupEgress",
                    json!([{
                        "CidrIp": Ipv4Cidr::ANYWHERE.to_string(),
                        "Description": "Allow all outbound traffic by default",
                        "IpProtocol": "-1",
                    }]),
                ),
        )?;

        let role = Role::new(format!("{}InstanceRole", self.name), "ec2.amazonaws.com")
            .with_managed_policy(SSM_MANAGED_INSTANCE_POLICY)
            .attach(stack)?;

        let profile = stack.add(
            Resource::new(format!("{}InstanceProfile", self.name), ResourceType::InstanceProfile)
                .property("Roles", json!([role.to_ref()])),
        )?;

        let instance = stack.add(
            Resource::new(self.name.clone(), ResourceType::Instance)
                .property("ImageId", AMAZON_LINUX_2_IMAGE)
                .property("InstanceType", self.instance_type.clone())
                .property("SubnetId", subnet.to_ref())
                .property("SecurityGroupIds", json!([security_group.attr("GroupId")]))
                .property("IamInstanceProfile", profile.to_ref())
                .property("Tags", json!([{ "Key": "Name", "Value": "BastionHost" }]))
                .depends_on(&role),
        )?;

        stack.output(
            &format!("{}Id", self.name),
            instance.to_ref(),
            Some("Instance id of the bastion host, for session manager connections"),
        );

        info!(
            stack = %stack.name(),
            tier = %self.tier,
            instance_type = %self.instance_type,
            "Synthesized bastion host"
        );

        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::Environment;
    use crate::network::topology::{platform_tiers, NetworkTopology};

    #[test]
    fn test_bastion_lands_in_first_bastion_subnet() {
        let topology = NetworkTopology::plan(
            "Production",
            "10.0.0.0/16".parse().unwrap(),
            &["eu-west-1a".to_string(), "eu-west-1b".to_string()],
            platform_tiers(),
            "Egress",
        )
        .unwrap();
        let mut stack = Stack::new("Vpc", Environment::new("038855593698", "eu-west-1")).unwrap();
        let network = topology.synthesize(&mut stack).unwrap();

        BastionHost::new("BastionHost", "Bastion")
            .synthesize(&mut stack, &network)
            .unwrap();

        let instance = stack.resource("BastionHost").unwrap();
        assert_eq!(
            instance.get("SubnetId").unwrap(),
            &json!({ "Ref": "ProductionBastionSubnet1" })
        );
        assert_eq!(instance.get("InstanceType").unwrap(), "t3.nano");
        assert!(stack.resource("BastionHostInstanceRole").is_some());
    }
}
