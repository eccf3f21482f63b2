// Copyright (c) 2025 - Stichting Beep
//! Platform configuration
//!
//! [`PlatformConfig::default`] carries the production values. The binary
//! calls [`PlatformConfig::from_env`], which lets `BEEP_*` variables override
//! them and validates the result.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::construct::Environment;
use crate::domain::invariants::validate_not_empty;
use crate::domain::Ipv4Cidr;
use crate::errors::{InfrastructureError, InfrastructureResult};

/// Hosted zone of the production root domain
pub const PRODUCTION_HOSTED_ZONE_ID: &str = "Z03027193A9KXJ6MEWS8K";

/// Source-control settings shared by every pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceControlConfig {
    pub owner: String,
    pub branch: String,
    /// Secret holding the access token
    pub token_secret: String,
    /// JSON field of the secret holding the token
    pub token_field: String,
}

impl Default for SourceControlConfig {
    fn default() -> Self {
        Self {
            owner: "beepnl".to_string(),
            branch: "master".to_string(),
            token_secret: "Beep/Production/GithubToken".to_string(),
            token_field: "token".to_string(),
        }
    }
}

/// Everything the platform definition needs from the outside
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub account: String,
    pub region: String,
    /// Root domain with a pre-existing hosted zone
    pub domain_name: String,
    /// Id of that hosted zone; certificates write their validation records into it
    pub hosted_zone_id: String,
    pub availability_zones: Vec<String>,
    pub network_cidr: Ipv4Cidr,
    pub source_control: SourceControlConfig,
    /// Verified sender identity for user pool mail
    pub email_identity_arn: String,
    /// Base URL of the UI when run locally
    pub development_ui_url: String,
    /// Directory the assembly is written to
    pub output_dir: PathBuf,
    /// Publish the assembly here instead of writing it to disk
    pub nats_url: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            account: "038855593698".to_string(),
            region: "eu-west-1".to_string(),
            domain_name: "stichtingbeep.nl".to_string(),
            hosted_zone_id: PRODUCTION_HOSTED_ZONE_ID.to_string(),
            availability_zones: vec![
                "eu-west-1a".to_string(),
                "eu-west-1b".to_string(),
                "eu-west-1c".to_string(),
            ],
            network_cidr: Ipv4Cidr::DEFAULT_VPC,
            source_control: SourceControlConfig::default(),
            email_identity_arn: "arn:aws:ses:eu-west-1:038855593698:identity/noreply@stichtingbeep.nl"
                .to_string(),
            development_ui_url: "localhost:8080".to_string(),
            output_dir: PathBuf::from("cdk.out"),
            nats_url: None,
        }
    }
}

impl PlatformConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> InfrastructureResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> InfrastructureResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let availability_zones = lookup("BEEP_AVAILABILITY_ZONES")
            .map(|zones| {
                zones
                    .split(',')
                    .map(str::trim)
                    .filter(|z| !z.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.availability_zones);

        let network_cidr = match lookup("BEEP_NETWORK_CIDR") {
            Some(cidr) => cidr.parse::<Ipv4Cidr>()?,
            None => defaults.network_cidr,
        };

        let config = Self {
            account: lookup("BEEP_ACCOUNT").unwrap_or(defaults.account),
            region: lookup("BEEP_REGION").unwrap_or(defaults.region),
            domain_name: lookup("BEEP_DOMAIN_NAME").unwrap_or(defaults.domain_name),
            hosted_zone_id: lookup("BEEP_HOSTED_ZONE_ID").unwrap_or(defaults.hosted_zone_id),
            availability_zones,
            network_cidr,
            source_control: SourceControlConfig {
                owner: lookup("BEEP_SOURCE_OWNER").unwrap_or(defaults.source_control.owner),
                branch: lookup("BEEP_SOURCE_BRANCH").unwrap_or(defaults.source_control.branch),
                ..defaults.source_control
            },
            email_identity_arn: lookup("BEEP_EMAIL_IDENTITY_ARN")
                .unwrap_or(defaults.email_identity_arn),
            development_ui_url: lookup("BEEP_DEVELOPMENT_UI_URL")
                .unwrap_or(defaults.development_ui_url),
            output_dir: lookup("BEEP_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            nats_url: lookup("NATS_URL").filter(|url| !url.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the values every stack relies on
    pub fn validate(&self) -> InfrastructureResult<()> {
        validate_not_empty("account", &self.account)?;
        validate_not_empty("region", &self.region)?;
        validate_not_empty("domain name", &self.domain_name)?;
        validate_not_empty("hosted zone id", &self.hosted_zone_id)?;
        validate_not_empty("source control owner", &self.source_control.owner)?;
        validate_not_empty("source control branch", &self.source_control.branch)?;

        if self.availability_zones.is_empty() {
            return Err(InfrastructureError::Configuration(
                "at least one availability zone is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Account and region every stack is provisioned into
    pub fn environment(&self) -> Environment {
        Environment::new(self.account.clone(), self.region.clone())
    }

    /// `<prefix>.<domain>`
    pub fn subdomain(&self, prefix: &str) -> String {
        format!("{prefix}.{}", self.domain_name)
    }
}
