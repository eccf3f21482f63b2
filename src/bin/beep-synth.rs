// Copyright (c) 2025 - Stichting Beep
//! Beep Synth
//!
//! Synthesizes the platform into a cloud assembly and submits it.
//!
//! Run with: cargo run --bin beep-synth
//!
//! With `NATS_URL` set the assembly is published to NATS, otherwise it is
//! written to `BEEP_OUTPUT_DIR` (default `cdk.out`). Other `BEEP_*` variables
//! override the production configuration.

use anyhow::{Context, Result};
use beep_infrastructure::{
    AssemblyDirectory, BeepPlatform, ControlPlane, NatsControlPlane, PlatformConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Synthesizing Beep platform");

    let config = PlatformConfig::from_env().context("Invalid platform configuration")?;
    info!("📋 Configuration loaded:");
    info!("  - Account: {}", config.account);
    info!("  - Region: {}", config.region);
    info!("  - Domain: {}", config.domain_name);
    info!("  - Network: {}", config.network_cidr);

    let assembly = BeepPlatform::synthesize(&config).context("Failed to synthesize platform")?;
    info!("✅ Assembly {} synthesized", assembly.id);
    for (position, stack) in assembly.stacks.iter().enumerate() {
        info!(
            "  {}. {} ({} resources, after {:?})",
            position + 1,
            stack.name,
            stack.resource_count(),
            stack.dependencies
        );
    }

    let receipt = match &config.nats_url {
        Some(url) => {
            info!("🔌 Connecting to NATS at {}", url);
            let control_plane = NatsControlPlane::connect(url)
                .await
                .context("Failed to connect to NATS")?;
            control_plane
                .submit(&assembly)
                .await
                .context("Failed to publish assembly")?
        }
        None => {
            info!("📝 Writing assembly to {}", config.output_dir.display());
            AssemblyDirectory::new(config.output_dir.clone())
                .submit(&assembly)
                .await
                .context("Failed to write assembly")?
        }
    };

    info!(
        "✅ Submitted {} stacks of assembly {}",
        receipt.stacks.len(),
        receipt.assembly_id
    );

    Ok(())
}
