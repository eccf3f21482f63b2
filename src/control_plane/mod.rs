// Copyright (c) 2025 - Stichting Beep
//! Control Plane Submission
//!
//! Provisioning is owned by an external control plane. This module only
//! hands it the synthesized assembly, stack by stack in provisioning order,
//! followed by the manifest.
//!
//! ```text
//! BeepPlatform → CloudAssembly → ControlPlane ─┬─ AssemblyDirectory (files)
//!                                              └─ NatsControlPlane (subjects)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use beep_infrastructure::control_plane::{AssemblyDirectory, ControlPlane};
//! use beep_infrastructure::{BeepPlatform, PlatformConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let assembly = BeepPlatform::synthesize(&PlatformConfig::default())?;
//!     let receipt = AssemblyDirectory::new("cdk.out").submit(&assembly).await?;
//!     println!("submitted {:?}", receipt.stacks);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::assembly::{template_file, AssemblyManifest, CloudAssembly, MANIFEST_FILE};
use crate::errors::{InfrastructureError, InfrastructureResult};

pub mod nats;

pub use nats::NatsControlPlane;

/// Acknowledgement that an assembly was handed over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub assembly_id: Uuid,
    /// Stacks in the order they were submitted
    pub stacks: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionReceipt {
    pub fn for_assembly(assembly: &CloudAssembly) -> Self {
        Self {
            assembly_id: assembly.id,
            stacks: assembly.stacks.iter().map(|s| s.name.clone()).collect(),
            submitted_at: Utc::now(),
        }
    }
}

/// Destination for a synthesized assembly
///
/// Implementations submit every stack before the manifest, in the order the
/// assembly lists them, and never wait for provisioning to finish.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn submit(&self, assembly: &CloudAssembly) -> InfrastructureResult<SubmissionReceipt>;
}

/// Writes the assembly as a directory of JSON files
#[derive(Debug, Clone)]
pub struct AssemblyDirectory {
    root: PathBuf,
}

impl AssemblyDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn template_path(&self, stack: &str) -> PathBuf {
        self.root.join(template_file(stack))
    }

    /// Read back a manifest written earlier
    pub async fn read_manifest(&self) -> InfrastructureResult<AssemblyManifest> {
        let bytes = tokio::fs::read(self.manifest_path()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> InfrastructureResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, bytes).await.map_err(|e| {
            InfrastructureError::Io(format!("writing {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Wrote assembly file");
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for AssemblyDirectory {
    async fn submit(&self, assembly: &CloudAssembly) -> InfrastructureResult<SubmissionReceipt> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            InfrastructureError::Io(format!("creating {}: {e}", self.root.display()))
        })?;

        for stack in &assembly.stacks {
            self.write_json(&self.template_path(&stack.name), &stack.template)
                .await?;
        }
        self.write_json(&self.manifest_path(), &assembly.manifest())
            .await?;

        info!(
            assembly_id = %assembly.id,
            directory = %self.root.display(),
            stacks = assembly.stacks.len(),
            "Wrote cloud assembly"
        );

        Ok(SubmissionReceipt::for_assembly(assembly))
    }
}
