// Copyright (c) 2025 - Stichting Beep
//! User directory and OAuth clients

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::config::PlatformConfig;
use crate::construct::{Export, Reference, Resource, Stack};
use crate::domain::invariants::{validate_logical_id, validate_not_empty};
use crate::domain::ResourceType;
use crate::errors::InfrastructureResult;
use crate::site::UI_SUBDOMAIN;

pub const CALLBACK_PATH: &str = "/callback";
pub const LOGOUT_PATH: &str = "/logout";

/// OAuth client of the user pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClient {
    pub name: String,
    pub base_url: String,
}

impl OAuthClient {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }

    pub fn callback_urls(&self) -> Vec<String> {
        vec![format!("{}{CALLBACK_PATH}", self.base_url)]
    }

    pub fn logout_urls(&self) -> Vec<String> {
        vec![format!("{}{LOGOUT_PATH}", self.base_url)]
    }

    fn synthesize(&self, stack: &mut Stack, pool: &Reference) -> InfrastructureResult<Reference> {
        validate_logical_id(&self.name)?;
        validate_not_empty("client base url", &self.base_url)?;

        stack.add(
            Resource::new(self.name.clone(), ResourceType::UserPoolClient)
                .property("UserPoolId", pool.to_ref())
                .property("ClientName", self.name.clone())
                .property("GenerateSecret", false)
                .property("AllowedOAuthFlowsUserPoolClient", true)
                .property("AllowedOAuthFlows", json!(["code", "implicit"]))
                .property("AllowedOAuthScopes", json!(["email", "openid", "profile"]))
                .property("SupportedIdentityProviders", json!(["COGNITO"]))
                .property("CallbackURLs", json!(self.callback_urls()))
                .property("LogoutURLs", json!(self.logout_urls())),
        )
    }
}

/// Clients of the platform: the deployed UI and a locally served one
pub fn platform_clients(config: &PlatformConfig) -> Vec<OAuthClient> {
    vec![
        OAuthClient::new(
            "BeepUiProduction",
            format!("https://{}", config.subdomain(UI_SUBDOMAIN)),
        ),
        OAuthClient::new("BeepUiDevelopment", config.development_ui_url.clone()),
    ]
}

/// Synthesized identity stack
#[derive(Debug, Clone)]
pub struct IdentityStack {
    pub stack: Stack,
    pub user_pool_id: Export,
    pub client_ids: Vec<Export>,
}

/// Build the `Identity` stack
pub fn identity_stack(config: &PlatformConfig) -> InfrastructureResult<IdentityStack> {
    let mut stack = Stack::new("Identity", config.environment())?
        .with_description("Beep user pool and OAuth clients");

    let pool = stack.add(
        Resource::new("BeepProduction", ResourceType::UserPool)
            .property("UserPoolName", "BeepProduction")
            .property("UsernameAttributes", json!(["email"]))
            .property("AutoVerifiedAttributes", json!(["email"]))
            .property(
                "EmailConfiguration",
                json!({
                    "EmailSendingAccount": "DEVELOPER",
                    "SourceArn": config.email_identity_arn,
                }),
            ),
    )?;

    let mut client_ids = Vec::new();
    for client in platform_clients(config) {
        let reference = client.synthesize(&mut stack, &pool)?;
        client_ids.push(stack.export(&format!("{}ClientId", client.name), reference.to_ref()));
    }

    let user_pool_id = stack.export("UserPoolId", pool.to_ref());

    info!(
        stack = %stack.name(),
        clients = client_ids.len(),
        "Built identity stack"
    );

    Ok(IdentityStack {
        stack,
        user_pool_id,
        client_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_urls() {
        let clients = platform_clients(&PlatformConfig::default());
        assert_eq!(
            clients[0].callback_urls(),
            vec!["https://app.stichtingbeep.nl/callback"]
        );
        assert_eq!(clients[1].logout_urls(), vec!["localhost:8080/logout"]);
    }

    #[test]
    fn test_identity_stack() {
        let identity = identity_stack(&PlatformConfig::default()).unwrap();
        let clients = identity.stack.resources_of_type(ResourceType::UserPoolClient);
        assert_eq!(clients.len(), 2);
        assert_eq!(
            clients[1].get("CallbackURLs").unwrap(),
            &json!(["localhost:8080/callback"])
        );

        let pool = identity.stack.resource("BeepProduction").unwrap();
        assert_eq!(
            pool.get("EmailConfiguration").unwrap()["SourceArn"],
            "arn:aws:ses:eu-west-1:038855593698:identity/noreply@stichtingbeep.nl"
        );
        assert!(identity.stack.imports().is_empty());
    }
}
