// Copyright (c) 2025 - Stichting Beep
//! Relational store
//!
//! One managed MySQL instance in the isolated database tier. Master
//! credentials are generated by the secret store and attached to the
//! instance afterwards; the `host:port` endpoint is published to the
//! parameter store for consumers outside the platform.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::config::PlatformConfig;
use crate::construct::{intrinsics, DeletionPolicy, Export, PolicyStatement, Reference, Resource, Role, Stack};
use crate::domain::invariants::{validate_database_instance, validate_not_empty};
use crate::domain::{PortRange, ResourceType};
use crate::errors::InfrastructureResult;
use crate::network::NetworkExports;

/// Subnet tier the instance is placed in
pub const DATABASE_TIER: &str = "Database";

/// Generated master credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterCredentials {
    pub secret_name: String,
    pub description: String,
    pub username: String,
    pub password_length: u32,
    pub exclude_characters: String,
}

impl Default for MasterCredentials {
    fn default() -> Self {
        Self {
            secret_name: "Beep/Production/Api/DatabaseMasterCredentials".to_string(),
            description: "Password for the RDS master user.".to_string(),
            username: "QueenBee".to_string(),
            password_length: 32,
            exclude_characters: "\"@/\\".to_string(),
        }
    }
}

/// Instance settings
///
/// Performance insights and encrypted storage are unavailable on micro
/// instance classes; enable both when moving to a larger class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub database_name: String,
    pub engine: String,
    pub engine_version: String,
    pub instance_class: String,
    pub multi_az: bool,
    pub storage_type: String,
    pub allocated_storage_gib: u32,
    pub storage_encrypted: bool,
    pub performance_insights: bool,
    pub delete_automated_backups: bool,
    pub backup_window: String,
    pub backup_retention_days: u32,
    pub maintenance_window: String,
    pub auto_minor_version_upgrade: bool,
    pub deletion_protection: bool,
    pub endpoint_parameter: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            database_name: "beepproduction".to_string(),
            engine: "mysql".to_string(),
            engine_version: "5.7".to_string(),
            instance_class: "db.t2.micro".to_string(),
            multi_az: false,
            storage_type: "gp2".to_string(),
            allocated_storage_gib: 20,
            storage_encrypted: false,
            performance_insights: false,
            delete_automated_backups: false,
            backup_window: "01:00-02:00".to_string(),
            backup_retention_days: 30,
            maintenance_window: "Sun:02:00-Sun:03:00".to_string(),
            auto_minor_version_upgrade: true,
            deletion_protection: false,
            endpoint_parameter: "/Beep/Production/DbEndpoint".to_string(),
        }
    }
}

impl DatabaseSettings {
    pub fn validate(&self) -> InfrastructureResult<()> {
        validate_not_empty("database name", &self.database_name)?;
        validate_not_empty("endpoint parameter", &self.endpoint_parameter)?;
        validate_database_instance(
            &self.instance_class,
            self.storage_encrypted,
            self.performance_insights,
        )?;
        Ok(())
    }
}

/// Cross-stack handles to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseExports {
    pub secret_arn: Export,
    pub endpoint_parameter_name: Export,
    /// Parameter path, needed to build its ARN
    pub endpoint_parameter: String,
}

impl DatabaseExports {
    /// Container secret reference to one JSON field of the master credentials
    pub fn credential_field(&self, stack: &mut Stack, field: &str) -> Value {
        let arn = stack.import(&self.secret_arn);
        intrinsics::join("", vec![arn, json!(format!(":{field}::"))])
    }

    /// ARN of the endpoint parameter
    pub fn endpoint_parameter_arn(&self, stack: &mut Stack) -> Value {
        // the name export is imported so the dependency is recorded
        stack.import(&self.endpoint_parameter_name);
        intrinsics::arn(
            "ssm",
            json!(format!("parameter{}", self.endpoint_parameter)),
        )
    }

    pub fn grant_read_credentials(&self, stack: &mut Stack, role: &mut Role) {
        let arn = stack.import(&self.secret_arn);
        role.grant(
            PolicyStatement::allow()
                .actions(&["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"])
                .resource(arn),
        );
    }

    pub fn grant_read_endpoint(&self, stack: &mut Stack, role: &mut Role) {
        let arn = self.endpoint_parameter_arn(stack);
        role.grant(
            PolicyStatement::allow()
                .actions(&[
                    "ssm:DescribeParameters",
                    "ssm:GetParameters",
                    "ssm:GetParameter",
                    "ssm:GetParameterHistory",
                ])
                .resource(arn),
        );
    }
}

/// Synthesized database stack
#[derive(Debug, Clone)]
pub struct DatabaseStack {
    pub stack: Stack,
    pub instance: Reference,
    pub exports: DatabaseExports,
}

/// Build the `Rds` stack
pub fn database_stack(
    config: &PlatformConfig,
    network: &NetworkExports,
) -> InfrastructureResult<DatabaseStack> {
    build(config, network, &DatabaseSettings::default(), &MasterCredentials::default())
}

pub fn build(
    config: &PlatformConfig,
    network: &NetworkExports,
    settings: &DatabaseSettings,
    credentials: &MasterCredentials,
) -> InfrastructureResult<DatabaseStack> {
    settings.validate()?;

    let mut stack = Stack::new("Rds", config.environment())?
        .with_description("Production relational store");

    let secret_template = serde_json::to_string(&json!({ "username": credentials.username }))?;
    let secret = stack.add(
        Resource::new("DatabaseMasterCredentials", ResourceType::Secret)
            .property("Name", credentials.secret_name.clone())
            .property("Description", credentials.description.clone())
            .property(
                "GenerateSecretString",
                json!({
                    "SecretStringTemplate": secret_template,
                    "GenerateStringKey": "password",
                    "PasswordLength": credentials.password_length,
                    "ExcludeCharacters": credentials.exclude_characters,
                }),
            ),
    )?;

    let subnet_ids = network.import_subnet_ids(&mut stack, DATABASE_TIER)?;
    let subnet_group = stack.add(
        Resource::new("DatabaseSubnetGroup", ResourceType::DbSubnetGroup)
            .property("DBSubnetGroupDescription", "Subnet group for Database database")
            .property("SubnetIds", subnet_ids),
    )?;

    let vpc_id = stack.import(&network.vpc_id);
    let vpc_cidr = stack.import(&network.vpc_cidr);
    let port = PortRange::MYSQL;
    let security_group = stack.add(
        Resource::new("DatabaseSecurityGroup", ResourceType::SecurityGroup)
            .property("GroupDescription", "Security group for Database database")
            .property("VpcId", vpc_id)
            .property(
                "SecurityGroupIngress",
                json!([{
                    "CidrIp": vpc_cidr,
                    "Description": "MySQL from inside the network",
                    "FromPort": port.start(),
                    "ToPort": port.end(),
                    "IpProtocol": "tcp",
                }]),
            ),
    )?;

    let instance = stack.add(
        Resource::new("Database", ResourceType::DbInstance)
            .property("DBName", settings.database_name.clone())
            .property("Engine", settings.engine.clone())
            .property("EngineVersion", settings.engine_version.clone())
            .property("DBInstanceClass", settings.instance_class.clone())
            .property("MultiAZ", settings.multi_az)
            .property("MasterUsername", intrinsics::resolve_secret_ref(&secret.to_ref(), "username"))
            .property("MasterUserPassword", intrinsics::resolve_secret_ref(&secret.to_ref(), "password"))
            .property("StorageType", settings.storage_type.clone())
            .property("AllocatedStorage", settings.allocated_storage_gib.to_string())
            .property("StorageEncrypted", settings.storage_encrypted)
            .property("EnablePerformanceInsights", settings.performance_insights)
            .property("DeleteAutomatedBackups", settings.delete_automated_backups)
            .property("PreferredBackupWindow", settings.backup_window.clone())
            .property("BackupRetentionPeriod", settings.backup_retention_days)
            .property("PreferredMaintenanceWindow", settings.maintenance_window.clone())
            .property("AutoMinorVersionUpgrade", settings.auto_minor_version_upgrade)
            .property("DeletionProtection", settings.deletion_protection)
            .property("DBSubnetGroupName", subnet_group.to_ref())
            .property("VPCSecurityGroups", json!([security_group.attr("GroupId")]))
            .deletion_policy(DeletionPolicy::Delete),
    )?;

    let endpoint = stack.add(
        Resource::new("DatabaseEndpoint", ResourceType::Parameter)
            .property("Type", "String")
            .property("Name", settings.endpoint_parameter.clone())
            .property("Description", "Combination of HOSTNAME:PORT for the database endpoint.")
            .property(
                "Value",
                intrinsics::join(
                    ":",
                    vec![instance.attr("Endpoint.Address"), instance.attr("Endpoint.Port")],
                ),
            ),
    )?;

    stack.add(
        Resource::new("DbCredentialsAttachment", ResourceType::SecretTargetAttachment)
            .property("SecretId", secret.to_ref())
            .property("TargetId", instance.to_ref())
            .property("TargetType", ResourceType::DbInstance.as_str()),
    )?;

    let exports = DatabaseExports {
        secret_arn: stack.export("DatabaseSecretArn", secret.to_ref()),
        endpoint_parameter_name: stack.export("DatabaseEndpointParameterName", endpoint.to_ref()),
        endpoint_parameter: settings.endpoint_parameter.clone(),
    };

    info!(
        stack = %stack.name(),
        engine = %settings.engine,
        instance_class = %settings.instance_class,
        "Built database stack"
    );

    Ok(DatabaseStack {
        stack,
        instance,
        exports,
    })
}
