// Copyright (c) 2025 - Stichting Beep
//! Cloud Resource Type Domain Model
//!
//! Defines the taxonomy of cloud resources the platform declares. Each
//! variant maps to exactly one control-plane type name, which is what ends up
//! in the synthesized templates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cloud resource type taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    // Networking
    Vpc,
    Subnet,
    InternetGateway,
    VpcGatewayAttachment,
    RouteTable,
    Route,
    SubnetRouteTableAssociation,
    ElasticIp,
    NatGateway,
    NetworkAcl,
    NetworkAclEntry,
    SubnetNetworkAclAssociation,
    SecurityGroup,
    Instance,

    // Containers
    Repository,
    Cluster,
    TaskDefinition,
    Service,
    LogGroup,
    Function,

    // Load balancing and scaling
    LoadBalancer,
    Listener,
    TargetGroup,
    ScalableTarget,
    ScalingPolicy,

    // DNS and certificates
    RecordSet,
    Certificate,
    /// DNS-validated certificate issued in another region
    CrossRegionCertificate,

    // Storage and delivery
    Bucket,
    BucketPolicy,
    Distribution,
    OriginAccessIdentity,

    // Database and secrets
    DbInstance,
    DbSubnetGroup,
    Secret,
    SecretTargetAttachment,
    Parameter,

    // Identity
    Role,
    Policy,
    InstanceProfile,
    UserPool,
    UserPoolClient,

    // Delivery pipelines
    BuildProject,
    Pipeline,
    Webhook,
}

impl ResourceType {
    /// Control-plane type name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vpc => "AWS::EC2::VPC",
            Self::Subnet => "AWS::EC2::Subnet",
            Self::InternetGateway => "AWS::EC2::InternetGateway",
            Self::VpcGatewayAttachment => "AWS::EC2::VPCGatewayAttachment",
            Self::RouteTable => "AWS::EC2::RouteTable",
            Self::Route => "AWS::EC2::Route",
            Self::SubnetRouteTableAssociation => "AWS::EC2::SubnetRouteTableAssociation",
            Self::ElasticIp => "AWS::EC2::EIP",
            Self::NatGateway => "AWS::EC2::NatGateway",
            Self::NetworkAcl => "AWS::EC2::NetworkAcl",
            Self::NetworkAclEntry => "AWS::EC2::NetworkAclEntry",
            Self::SubnetNetworkAclAssociation => "AWS::EC2::SubnetNetworkAclAssociation",
            Self::SecurityGroup => "AWS::EC2::SecurityGroup",
            Self::Instance => "AWS::EC2::Instance",
            Self::Repository => "AWS::ECR::Repository",
            Self::Cluster => "AWS::ECS::Cluster",
            Self::TaskDefinition => "AWS::ECS::TaskDefinition",
            Self::Service => "AWS::ECS::Service",
            Self::LogGroup => "AWS::Logs::LogGroup",
            Self::Function => "AWS::Lambda::Function",
            Self::LoadBalancer => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            Self::Listener => "AWS::ElasticLoadBalancingV2::Listener",
            Self::TargetGroup => "AWS::ElasticLoadBalancingV2::TargetGroup",
            Self::ScalableTarget => "AWS::ApplicationAutoScaling::ScalableTarget",
            Self::ScalingPolicy => "AWS::ApplicationAutoScaling::ScalingPolicy",
            Self::RecordSet => "AWS::Route53::RecordSet",
            Self::Certificate => "AWS::CertificateManager::Certificate",
            Self::CrossRegionCertificate => "Custom::DnsValidatedCertificate",
            Self::Bucket => "AWS::S3::Bucket",
            Self::BucketPolicy => "AWS::S3::BucketPolicy",
            Self::Distribution => "AWS::CloudFront::Distribution",
            Self::OriginAccessIdentity => "AWS::CloudFront::CloudFrontOriginAccessIdentity",
            Self::DbInstance => "AWS::RDS::DBInstance",
            Self::DbSubnetGroup => "AWS::RDS::DBSubnetGroup",
            Self::Secret => "AWS::SecretsManager::Secret",
            Self::SecretTargetAttachment => "AWS::SecretsManager::SecretTargetAttachment",
            Self::Parameter => "AWS::SSM::Parameter",
            Self::Role => "AWS::IAM::Role",
            Self::Policy => "AWS::IAM::Policy",
            Self::InstanceProfile => "AWS::IAM::InstanceProfile",
            Self::UserPool => "AWS::Cognito::UserPool",
            Self::UserPoolClient => "AWS::Cognito::UserPoolClient",
            Self::BuildProject => "AWS::CodeBuild::Project",
            Self::Pipeline => "AWS::CodePipeline::Pipeline",
            Self::Webhook => "AWS::CodePipeline::Webhook",
        }
    }

    /// Get the primary category for this resource type
    pub fn category(&self) -> ResourceCategory {
        match self {
            Self::Vpc
            | Self::Subnet
            | Self::InternetGateway
            | Self::VpcGatewayAttachment
            | Self::RouteTable
            | Self::Route
            | Self::SubnetRouteTableAssociation
            | Self::ElasticIp
            | Self::NatGateway
            | Self::LoadBalancer
            | Self::Listener
            | Self::TargetGroup
            | Self::RecordSet => ResourceCategory::Network,

            Self::NetworkAcl
            | Self::NetworkAclEntry
            | Self::SubnetNetworkAclAssociation
            | Self::SecurityGroup
            | Self::Certificate
            | Self::CrossRegionCertificate => ResourceCategory::Security,

            Self::Instance
            | Self::Cluster
            | Self::TaskDefinition
            | Self::Service
            | Self::Function
            | Self::ScalableTarget
            | Self::ScalingPolicy => ResourceCategory::Compute,

            Self::Repository
            | Self::Bucket
            | Self::BucketPolicy
            | Self::DbInstance
            | Self::DbSubnetGroup
            | Self::Secret
            | Self::SecretTargetAttachment
            | Self::Parameter
            | Self::LogGroup => ResourceCategory::Storage,

            Self::Distribution | Self::OriginAccessIdentity => ResourceCategory::Delivery,

            Self::Role
            | Self::Policy
            | Self::InstanceProfile
            | Self::UserPool
            | Self::UserPoolClient => ResourceCategory::Identity,

            Self::BuildProject | Self::Pipeline | Self::Webhook => ResourceCategory::Pipeline,
        }
    }

    /// Check if this resource carries network policy
    pub fn is_network_policy(&self) -> bool {
        matches!(
            self,
            Self::NetworkAcl | Self::NetworkAclEntry | Self::SubnetNetworkAclAssociation
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resource category (high-level grouping)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceCategory {
    /// Addressing, routing, load balancing, DNS
    Network,
    /// Network policy and certificates
    Security,
    /// Container and instance workloads
    Compute,
    /// Registries, buckets, databases, secrets
    Storage,
    /// Content delivery
    Delivery,
    /// Roles and user directories
    Identity,
    /// Build and deployment automation
    Pipeline,
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "Network"),
            Self::Security => write!(f, "Security"),
            Self::Compute => write!(f, "Compute"),
            Self::Storage => write!(f, "Storage"),
            Self::Delivery => write!(f, "Delivery"),
            Self::Identity => write!(f, "Identity"),
            Self::Pipeline => write!(f, "Pipeline"),
        }
    }
}
