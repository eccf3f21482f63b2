// Copyright (c) 2025 - Stichting Beep
//! Submission over NATS

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ControlPlane, SubmissionReceipt};
use crate::assembly::CloudAssembly;
use crate::errors::InfrastructureResult;
use crate::nats::{NatsClient, NatsConfig};
use crate::subjects::subjects;

/// Payload published for each stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSubmission {
    pub assembly_id: Uuid,
    pub stack: String,
    /// Position in provisioning order, starting at 0
    pub position: usize,
    pub dependencies: Vec<String>,
    pub template: Value,
}

/// Publishes every stack template, then the manifest
#[derive(Clone)]
pub struct NatsControlPlane {
    client: NatsClient,
}

impl NatsControlPlane {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> InfrastructureResult<Self> {
        let client = NatsClient::new(NatsConfig::from_url(url)).await?;
        Ok(Self::new(client))
    }
}

/// Messages in publish order: one per stack, then the manifest
pub fn submission_messages(assembly: &CloudAssembly) -> InfrastructureResult<Vec<(String, Value)>> {
    let mut messages = Vec::with_capacity(assembly.stacks.len() + 1);

    for (position, stack) in assembly.stacks.iter().enumerate() {
        let submission = StackSubmission {
            assembly_id: assembly.id,
            stack: stack.name.clone(),
            position,
            dependencies: stack.dependencies.clone(),
            template: stack.template.clone(),
        };
        messages.push((
            subjects::stack_submitted(&stack.name)?,
            serde_json::to_value(&submission)?,
        ));
    }

    messages.push((
        subjects::assembly_submitted(),
        serde_json::to_value(assembly.manifest())?,
    ));

    Ok(messages)
}

#[async_trait]
impl ControlPlane for NatsControlPlane {
    async fn submit(&self, assembly: &CloudAssembly) -> InfrastructureResult<SubmissionReceipt> {
        for (subject, payload) in submission_messages(assembly)? {
            self.client.publish(&subject, &payload).await?;
            debug!(subject = %subject, "Submitted");
        }
        self.client.flush().await?;

        info!(
            assembly_id = %assembly.id,
            stacks = assembly.stacks.len(),
            "Published cloud assembly"
        );

        Ok(SubmissionReceipt::for_assembly(assembly))
    }
}
