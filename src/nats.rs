// Copyright (c) 2025 - Stichting Beep
//! NATS client abstraction for assembly submission

use async_nats::{Client, ConnectOptions};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{InfrastructureError, InfrastructureResult};

/// Where and how the submitter connects
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// Server URLs, tried in order
    pub servers: Vec<String>,
    /// Name the server lists the connection under
    pub name: String,
    /// Give up connecting after this long
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "beep-synth".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl NatsConfig {
    /// Configuration for a comma-separated server list
    pub fn from_url(url: &str) -> Self {
        Self {
            servers: url
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            ..Self::default()
        }
    }
}

/// Publishing handle shared by the submitter
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to the first reachable server
    pub async fn new(config: NatsConfig) -> InfrastructureResult<Self> {
        if config.servers.is_empty() {
            return Err(InfrastructureError::NatsConnection(
                "no NATS servers configured".to_string(),
            ));
        }

        let connect_options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
            .await
            .map_err(|e| InfrastructureError::NatsConnection(e.to_string()))?;

        info!(servers = ?config.servers, client = %config.name, "Connected to NATS");

        Ok(Self { client })
    }

    /// Publish `message` as JSON
    pub async fn publish<T>(&self, subject: &str, message: &T) -> InfrastructureResult<()>
    where
        T: Serialize,
    {
        let payload = serde_json::to_vec(message)?;
        let payload_len = payload.len();

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| InfrastructureError::NatsPublish(e.to_string()))?;

        debug!(subject, bytes = payload_len, "Published");
        Ok(())
    }

    /// Wait until everything published so far has reached the server
    pub async fn flush(&self) -> InfrastructureResult<()> {
        self.client
            .flush()
            .await
            .map_err(|e| InfrastructureError::NatsPublish(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_url() {
        let config = NatsConfig::from_url("nats://a:4222, nats://b:4222");
        assert_eq!(config.servers, vec!["nats://a:4222", "nats://b:4222"]);
        assert_eq!(config.name, "beep-synth");
    }

    #[tokio::test]
    async fn test_no_servers_rejected() {
        let config = NatsConfig::from_url(" , ");
        assert!(matches!(
            NatsClient::new(config).await,
            Err(InfrastructureError::NatsConnection(_))
        ));
    }
}
