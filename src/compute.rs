// Copyright (c) 2025 - Stichting Beep
//! Compute service
//!
//! The API runs as one Fargate service with a two-container task: the
//! reverse proxy forwards to the application container and only starts once
//! that container has started. An internet-facing load balancer terminates
//! TLS in front of the service, which scales on requests per target.
//!
//! ```text
//! api.<domain> ──▶ LoadBalancer :443 ──▶ TargetGroup :80 ──▶ Nginx ──▶ Api
//!                               :80 ──▶ redirect to :443
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::info;

use crate::config::PlatformConfig;
use crate::construct::{intrinsics, DeletionPolicy, Export, Reference, Resource, Role, Stack};
use crate::database::DatabaseExports;
use crate::dns::{AliasTarget, HostedZone};
use crate::domain::{Ipv4Cidr, PortRange, ResourceType};
use crate::errors::{InfrastructureError, InfrastructureResult};
use crate::network::NetworkExports;
use crate::registry::{Registry, RegistryAccess, RegistryStack};

pub const API_SUBDOMAIN: &str = "api";

/// Tier running the containers
pub const SERVICE_TIER: &str = "Application";

/// Tier running the load balancer
pub const LOAD_BALANCER_TIER: &str = "Ingress";

/// State a container must reach before a dependent container starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerCondition {
    Start,
    Complete,
    Success,
    Healthy,
}

impl ContainerCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerCondition::Start => "START",
            ContainerCondition::Complete => "COMPLETE",
            ContainerCondition::Success => "SUCCESS",
            ContainerCondition::Healthy => "HEALTHY",
        }
    }
}

/// One container of a task
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: Value,
    pub essential: bool,
    pub port: Option<u16>,
    pub stream_prefix: String,
    pub depends_on: Vec<(String, ContainerCondition)>,
    /// Environment variable name to secret ARN
    pub secrets: Vec<(String, Value)>,
}

impl ContainerDefinition {
    pub fn new(name: impl Into<String>, image: Value, stream_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image,
            essential: true,
            port: None,
            stream_prefix: stream_prefix.into(),
            depends_on: Vec::new(),
            secrets: Vec::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn waits_for(mut self, container: &str, condition: ContainerCondition) -> Self {
        self.depends_on.push((container.to_string(), condition));
        self
    }

    pub fn with_secret(mut self, variable: &str, value_from: Value) -> Self {
        self.secrets.push((variable.to_string(), value_from));
        self
    }

    fn to_json(&self, log_group: &Reference, region: &str) -> Value {
        let mut container = json!({
            "Name": self.name,
            "Image": self.image,
            "Essential": self.essential,
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": log_group.to_ref(),
                    "awslogs-stream-prefix": self.stream_prefix,
                    "awslogs-region": region,
                },
            },
        });
        if let Some(port) = self.port {
            container["PortMappings"] =
                json!([{ "ContainerPort": port, "HostPort": port, "Protocol": "tcp" }]);
        }
        if !self.depends_on.is_empty() {
            container["DependsOn"] = self
                .depends_on
                .iter()
                .map(|(name, condition)| json!({ "ContainerName": name, "Condition": condition.as_str() }))
                .collect();
        }
        if !self.secrets.is_empty() {
            container["Secrets"] = self
                .secrets
                .iter()
                .map(|(name, value_from)| json!({ "Name": name, "ValueFrom": value_from }))
                .collect();
        }
        container
    }
}

/// Fargate task: ordered containers sharing one network namespace
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub family: String,
    pub cpu: u32,
    pub memory_mib: u32,
    containers: Vec<ContainerDefinition>,
}

impl TaskDefinition {
    pub fn new(family: impl Into<String>, cpu: u32, memory_mib: u32) -> Self {
        Self {
            family: family.into(),
            cpu,
            memory_mib,
            containers: Vec::new(),
        }
    }

    pub fn add_container(mut self, container: ContainerDefinition) -> Self {
        self.containers.push(container);
        self
    }

    pub fn containers(&self) -> &[ContainerDefinition] {
        &self.containers
    }

    /// Container receiving load balancer traffic
    pub fn default_container(&self) -> Option<&ContainerDefinition> {
        self.containers.iter().find(|c| c.port.is_some())
    }

    /// Container names are unique and start-order dependencies point at
    /// other containers of the same task
    pub fn validate(&self) -> InfrastructureResult<()> {
        let mut names = HashSet::new();
        for container in &self.containers {
            if !names.insert(container.name.as_str()) {
                return Err(InfrastructureError::Configuration(format!(
                    "container {} declared twice in task {}",
                    container.name, self.family
                )));
            }
        }

        for container in &self.containers {
            for (dependency, _) in &container.depends_on {
                if dependency == &container.name || !names.contains(dependency.as_str()) {
                    return Err(InfrastructureError::Configuration(format!(
                        "container {} of task {} waits for unknown container {dependency}",
                        container.name, self.family
                    )));
                }
            }
        }

        if self.default_container().is_none() {
            return Err(InfrastructureError::Configuration(format!(
                "task {} exposes no container port",
                self.family
            )));
        }

        Ok(())
    }
}

/// Service placement and deployment limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub cluster_name: String,
    pub service_name: String,
    pub desired_count: u32,
    pub min_healthy_percent: u32,
    pub max_healthy_percent: u32,
    pub platform_version: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            cluster_name: "BeepProduction".to_string(),
            service_name: "apiService".to_string(),
            desired_count: 1,
            min_healthy_percent: 0,
            max_healthy_percent: 100,
            platform_version: "LATEST".to_string(),
        }
    }
}

/// Load balancer and target group settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSettings {
    pub name: String,
    pub idle_timeout_seconds: u32,
    pub http2_enabled: bool,
    pub deletion_protection: bool,
    pub ssl_policy: String,
    pub target_group_name: String,
    pub health_check_path: String,
    pub deregistration_delay_seconds: u32,
}

impl Default for LoadBalancerSettings {
    fn default() -> Self {
        Self {
            name: "beep-api".to_string(),
            idle_timeout_seconds: 20,
            http2_enabled: false,
            deletion_protection: false,
            ssl_policy: "ELBSecurityPolicy-2016-08".to_string(),
            target_group_name: "ApiProduction".to_string(),
            health_check_path: "/ping".to_string(),
            deregistration_delay_seconds: 60,
        }
    }
}

/// Target tracking on request count per target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingSettings {
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub requests_per_target: u32,
    pub scale_in_cooldown_seconds: u32,
    pub scale_out_cooldown_seconds: u32,
}

impl Default for ScalingSettings {
    fn default() -> Self {
        Self {
            min_capacity: 1,
            max_capacity: 2,
            requests_per_target: 100,
            scale_in_cooldown_seconds: 60,
            scale_out_cooldown_seconds: 60,
        }
    }
}

impl ScalingSettings {
    pub fn validate(&self) -> InfrastructureResult<()> {
        if self.min_capacity == 0 || self.min_capacity > self.max_capacity {
            return Err(InfrastructureError::Configuration(format!(
                "scaling range {}..{} is invalid",
                self.min_capacity, self.max_capacity
            )));
        }
        Ok(())
    }
}

/// Cross-stack handles to the running service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeExports {
    pub cluster_name: Export,
    pub service_name: Export,
}

/// Synthesized compute stack
#[derive(Debug, Clone)]
pub struct ComputeStack {
    pub stack: Stack,
    pub task: TaskDefinition,
    pub exports: ComputeExports,
}

/// Build the `Api` stack
pub fn compute_stack(
    config: &PlatformConfig,
    network: &NetworkExports,
    registries: &RegistryStack,
    database: &DatabaseExports,
) -> InfrastructureResult<ComputeStack> {
    let service = ServiceSettings::default();
    let balancer = LoadBalancerSettings::default();
    let scaling = ScalingSettings::default();
    scaling.validate()?;

    let mut stack = Stack::new("Api", config.environment())?
        .with_description("Beep API on Fargate behind an application load balancer");
    let region = stack.region().to_string();

    let zone = HostedZone::from_config(config);
    let api_domain = zone.record_name(API_SUBDOMAIN);
    let certificate = zone.certificate(&mut stack, "Certificate", &api_domain)?;

    let vpc_id = stack.import(&network.vpc_id);
    let vpc_cidr = stack.import(&network.vpc_cidr);
    let service_subnets = network.import_subnet_ids(&mut stack, SERVICE_TIER)?;
    let balancer_subnets = network.import_subnet_ids(&mut stack, LOAD_BALANCER_TIER)?;

    let cluster = stack.add(
        Resource::new("EcsCluster", ResourceType::Cluster)
            .property("ClusterName", service.cluster_name.clone()),
    )?;

    let logs = stack.add(
        Resource::new("Logs", ResourceType::LogGroup)
            .property("LogGroupName", "Api/Production")
            .property("RetentionInDays", 1)
            .deletion_policy(DeletionPolicy::Delete),
    )?;

    // Task roles
    let nginx = registries.get(Registry::NginxProduction)?;
    let api = registries.get(Registry::ApiProduction)?;

    let mut execution_role = Role::new("TaskExecutionRole", "ecs-tasks.amazonaws.com");
    nginx.grant(&mut stack, &mut execution_role, RegistryAccess::Pull);
    api.grant(&mut stack, &mut execution_role, RegistryAccess::Pull);
    database.grant_read_credentials(&mut stack, &mut execution_role);
    database.grant_read_endpoint(&mut stack, &mut execution_role);

    let mut task_role = Role::new("TaskRole", "ecs-tasks.amazonaws.com");
    database.grant_read_credentials(&mut stack, &mut task_role);
    database.grant_read_endpoint(&mut stack, &mut task_role);

    let task = TaskDefinition::new("apiTask", 256, 2048)
        .add_container(
            ContainerDefinition::new("Nginx", nginx.image(&mut stack, "latest"), "nginx")
                .with_port(80)
                .waits_for("Api", ContainerCondition::Start),
        )
        .add_container(
            ContainerDefinition::new("Api", api.image(&mut stack, "latest"), "php")
                .with_secret("DB_USERNAME", database.credential_field(&mut stack, "username"))
                .with_secret("DB_PASSWORD", database.credential_field(&mut stack, "password"))
                .with_secret("DB_ENDPOINT", database.endpoint_parameter_arn(&mut stack)),
        );
    task.validate()?;

    let execution_role = execution_role.attach(&mut stack)?;
    let task_role = task_role.attach(&mut stack)?;

    let task_definition = stack.add(
        Resource::new("Task", ResourceType::TaskDefinition)
            .property("Family", task.family.clone())
            .property("Cpu", task.cpu.to_string())
            .property("Memory", task.memory_mib.to_string())
            .property("NetworkMode", "awsvpc")
            .property("RequiresCompatibilities", json!(["FARGATE"]))
            .property("ExecutionRoleArn", execution_role.attr("Arn"))
            .property("TaskRoleArn", task_role.attr("Arn"))
            .property(
                "ContainerDefinitions",
                task.containers()
                    .iter()
                    .map(|c| c.to_json(&logs, &region))
                    .collect::<Vec<_>>(),
            ),
    )?;

    // Load balancer
    let balancer_group = stack.add(
        Resource::new("LoadBalancerSecurityGroup", ResourceType::SecurityGroup)
            .property("GroupDescription", "Public HTTP and HTTPS to the API load balancer")
            .property("VpcId", vpc_id.clone())
            .property(
                "SecurityGroupIngress",
                json!([
                    ingress_rule(Ipv4Cidr::ANYWHERE.to_string(), PortRange::HTTPS, "Allow from anyone on port 443"),
                    ingress_rule(Ipv4Cidr::ANYWHERE.to_string(), PortRange::HTTP, "Allow from anyone on port 80"),
                ]),
            ),
    )?;

    let service_group = stack.add(
        Resource::new("ServiceSecurityGroup", ResourceType::SecurityGroup)
            .property("GroupDescription", "Load balancer to API containers")
            .property("VpcId", vpc_id.clone())
            .property(
                "SecurityGroupIngress",
                json!([ingress_rule(vpc_cidr, PortRange::HTTP, "Load balancer to target")]),
            ),
    )?;

    let load_balancer = stack.add(
        Resource::new("LoadBalancer", ResourceType::LoadBalancer)
            .property("Name", balancer.name.clone())
            .property("Scheme", "internet-facing")
            .property("Type", "application")
            .property("IpAddressType", "ipv4")
            .property("Subnets", balancer_subnets)
            .property("SecurityGroups", json!([balancer_group.attr("GroupId")]))
            .property(
                "LoadBalancerAttributes",
                json!([
                    { "Key": "deletion_protection.enabled", "Value": balancer.deletion_protection.to_string() },
                    { "Key": "routing.http2.enabled", "Value": balancer.http2_enabled.to_string() },
                    { "Key": "idle_timeout.timeout_seconds", "Value": balancer.idle_timeout_seconds.to_string() },
                ]),
            ),
    )?;

    let target_group = stack.add(
        Resource::new("TargetGroup", ResourceType::TargetGroup)
            .property("Name", balancer.target_group_name.clone())
            .property("Port", 80)
            .property("Protocol", "HTTP")
            .property("TargetType", "ip")
            .property("VpcId", vpc_id)
            .property("HealthCheckPath", balancer.health_check_path.clone())
            .property(
                "TargetGroupAttributes",
                json!([{
                    "Key": "deregistration_delay.timeout_seconds",
                    "Value": balancer.deregistration_delay_seconds.to_string(),
                }]),
            ),
    )?;

    let https_listener = stack.add(
        Resource::new("HttpsListener", ResourceType::Listener)
            .property("LoadBalancerArn", load_balancer.to_ref())
            .property("Port", PortRange::HTTPS.start())
            .property("Protocol", "HTTPS")
            .property("SslPolicy", balancer.ssl_policy.clone())
            .property("Certificates", json!([{ "CertificateArn": certificate.to_ref() }]))
            .property(
                "DefaultActions",
                json!([{ "Type": "forward", "TargetGroupArn": target_group.to_ref() }]),
            ),
    )?;

    stack.add(
        Resource::new("HttpListener", ResourceType::Listener)
            .property("LoadBalancerArn", load_balancer.to_ref())
            .property("Port", PortRange::HTTP.start())
            .property("Protocol", "HTTP")
            .property(
                "DefaultActions",
                json!([{
                    "Type": "redirect",
                    "RedirectConfig": {
                        "Protocol": "HTTPS",
                        "Port": PortRange::HTTPS.start().to_string(),
                        "StatusCode": "HTTP_301",
                    },
                }]),
            ),
    )?;

    // Service
    let default_container = task
        .default_container()
        .ok_or_else(|| InfrastructureError::Configuration("task has no exposed port".to_string()))?;
    let fargate_service = stack.add(
        Resource::new("Service", ResourceType::Service)
            .property("ServiceName", service.service_name.clone())
            .property("Cluster", cluster.to_ref())
            .property("TaskDefinition", task_definition.to_ref())
            .property("LaunchType", "FARGATE")
            .property("PlatformVersion", service.platform_version.clone())
            .property("DesiredCount", service.desired_count)
            .property(
                "DeploymentConfiguration",
                json!({
                    "MinimumHealthyPercent": service.min_healthy_percent,
                    "MaximumPercent": service.max_healthy_percent,
                }),
            )
            .property(
                "NetworkConfiguration",
                json!({
                    "AwsvpcConfiguration": {
                        "AssignPublicIp": "DISABLED",
                        "Subnets": service_subnets,
                        "SecurityGroups": [service_group.attr("GroupId")],
                    }
                }),
            )
            .property(
                "LoadBalancers",
                json!([{
                    "ContainerName": default_container.name,
                    "ContainerPort": default_container.port,
                    "TargetGroupArn": target_group.to_ref(),
                }]),
            )
            .depends_on(&https_listener),
    )?;

    zone.alias(
        &mut stack,
        "Alias",
        &api_domain,
        "Domain for Beep API.",
        AliasTarget::load_balancer(&load_balancer),
    )?;

    // Scaling
    let scaling_role = format!(
        "arn:aws:iam::{}:role/aws-service-role/ecs.application-autoscaling.amazonaws.com/AWSServiceRoleForApplicationAutoScaling_ECSService",
        config.account
    );
    let scalable_target = stack.add(
        Resource::new("ServiceTaskCountTarget", ResourceType::ScalableTarget)
            .property("MinCapacity", scaling.min_capacity)
            .property("MaxCapacity", scaling.max_capacity)
            .property(
                "ResourceId",
                intrinsics::join(
                    "",
                    vec![
                        json!("service/"),
                        cluster.to_ref(),
                        json!("/"),
                        fargate_service.attr("Name"),
                    ],
                ),
            )
            .property("RoleARN", scaling_role)
            .property("ScalableDimension", "ecs:service:DesiredCount")
            .property("ServiceNamespace", "ecs"),
    )?;

    // app/<name>/<id> of the load balancer, taken from the listener ARN
    let listener_part = |index| intrinsics::select(index, intrinsics::split("/", https_listener.to_ref()));
    stack.add(
        Resource::new("ServiceTaskCountTargetScaling", ResourceType::ScalingPolicy)
            .property("PolicyName", "ApiServiceRequestCountScaling")
            .property("PolicyType", "TargetTrackingScaling")
            .property("ScalingTargetId", scalable_target.to_ref())
            .property(
                "TargetTrackingScalingPolicyConfiguration",
                json!({
                    "PredefinedMetricSpecification": {
                        "PredefinedMetricType": "ALBRequestCountPerTarget",
                        "ResourceLabel": intrinsics::join("/", vec![
                            listener_part(1),
                            listener_part(2),
                            listener_part(3),
                            target_group.attr("TargetGroupFullName"),
                        ]),
                    },
                    "TargetValue": scaling.requests_per_target,
                    "ScaleInCooldown": scaling.scale_in_cooldown_seconds,
                    "ScaleOutCooldown": scaling.scale_out_cooldown_seconds,
                }),
            ),
    )?;

    let exports = ComputeExports {
        cluster_name: stack.export("ClusterName", cluster.to_ref()),
        service_name: stack.export("ServiceName", fargate_service.attr("Name")),
    };

    info!(
        stack = %stack.name(),
        domain = %api_domain,
        containers = task.containers().len(),
        "Built compute stack"
    );

    Ok(ComputeStack {
        stack,
        task,
        exports,
    })
}

fn ingress_rule(cidr: impl Into<Value>, ports: PortRange, description: &str) -> Value {
    json!({
        "CidrIp": cidr.into(),
        "Description": description,
        "FromPort": ports.start(),
        "ToPort": ports.end(),
        "IpProtocol": "tcp",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nginx_first() -> TaskDefinition {
        TaskDefinition::new("apiTask", 256, 2048)
            .add_container(
                ContainerDefinition::new("Nginx", json!("nginx"), "nginx")
                    .with_port(80)
                    .waits_for("Api", ContainerCondition::Start),
            )
            .add_container(ContainerDefinition::new("Api", json!("api"), "php"))
    }

    #[test]
    fn test_task_validation() {
        assert!(nginx_first().validate().is_ok());

        let dangling = TaskDefinition::new("apiTask", 256, 2048).add_container(
            ContainerDefinition::new("Nginx", json!("nginx"), "nginx")
                .with_port(80)
                .waits_for("Php", ContainerCondition::Start),
        );
        assert!(dangling.validate().is_err());

        let no_port = TaskDefinition::new("apiTask", 256, 2048)
            .add_container(ContainerDefinition::new("Api", json!("api"), "php"));
        assert!(no_port.validate().is_err());
    }

    #[test]
    fn test_container_json() {
        let task = nginx_first();
        let logs = {
            let mut stack = Stack::new("Api", PlatformConfig::default().environment()).unwrap();
            stack.add(Resource::new("Logs", ResourceType::LogGroup)).unwrap()
        };
        let nginx = task.containers()[0].to_json(&logs, "eu-west-1");
        assert_eq!(
            nginx["DependsOn"],
            json!([{ "ContainerName": "Api", "Condition": "START" }])
        );
        assert_eq!(nginx["PortMappings"][0]["ContainerPort"], 80);
        assert_eq!(nginx["LogConfiguration"]["Options"]["awslogs-stream-prefix"], "nginx");
    }

    #[test]
    fn test_scaling_validation() {
        assert!(ScalingSettings::default().validate().is_ok());
        let inverted = ScalingSettings {
            min_capacity: 3,
            max_capacity: 2,
            ..ScalingSettings::default()
        };
        assert!(inverted.validate().is_err());
    }
}
