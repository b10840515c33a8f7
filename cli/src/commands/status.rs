// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Read-only and resource commands: ps, provision

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::lifecycle::ServiceArgs;
use super::{as_refs, output, ProjectContext, ProjectSource};

#[derive(Args, Debug, Clone)]
pub struct PsArgs {
    #[command(flatten)]
    pub services: ServiceArgs,

    /// Only show running containers
    #[arg(long)]
    pub running: bool,

    /// Only print container IDs
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn ps(args: PsArgs, source: &ProjectSource) -> Result<()> {
    let ctx = ProjectContext::load(source).await?;
    let services = as_refs(&args.services.services);
    let containers = ctx.orchestrator.containers(&services, !args.running).await?;
    output::print_containers(&containers, args.quiet);
    Ok(())
}

/// Create the project's declared volumes and networks without touching any
/// container.
pub async fn provision(source: &ProjectSource) -> Result<()> {
    let ctx = ProjectContext::load(source).await?;
    let progress = output::spawn_progress(&ctx.event_bus);

    let result = ctx.orchestrator.provision_resources().await;
    tokio::task::yield_now().await;
    progress.abort();
    result?;

    let project = ctx.orchestrator.project();
    println!(
        "{}",
        format!("✓ Resources for project '{}' are in place", project.name()).green()
    );
    if let Some(network) = ctx.orchestrator.default_network().await? {
        println!("  Default network: {} ({})", network.name, network.driver);
    }
    Ok(())
}
