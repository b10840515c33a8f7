// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Project lifecycle commands
//!
//! Commands: up, create, start, stop, pause, unpause, kill, rm, scale, down

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use stevedore_core::application::{OperationReport, UpOptions};
use stevedore_core::domain::convergence::ConvergenceStrategy;
use stevedore_core::domain::error::ProjectError;

use super::output;
use super::{as_refs, interrupt_token, parse_scale, ProjectContext, ProjectSource};

/// Services to operate on; none means the whole project.
#[derive(Args, Debug, Clone, Default)]
pub struct ServiceArgs {
    #[arg(value_name = "SERVICE")]
    pub services: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RecreateArgs {
    /// Recreate containers even if their configuration is unchanged
    #[arg(long, conflicts_with = "no_recreate")]
    pub force_recreate: bool,

    /// Never recreate existing containers
    #[arg(long)]
    pub no_recreate: bool,
}

impl RecreateArgs {
    pub fn strategy(&self) -> ConvergenceStrategy {
        if self.force_recreate {
            ConvergenceStrategy::Always
        } else if self.no_recreate {
            ConvergenceStrategy::Never
        } else {
            ConvergenceStrategy::Changed
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct UpArgs {
    #[command(flatten)]
    pub services: ServiceArgs,

    #[command(flatten)]
    pub recreate: RecreateArgs,

    /// Do not bring up the dependencies of the named services
    #[arg(long)]
    pub no_deps: bool,

    /// Run COUNT containers of SERVICE (repeatable)
    #[arg(long, value_name = "SERVICE=COUNT", value_parser = parse_scale)]
    pub scale: Vec<(String, u32)>,
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    #[command(flatten)]
    pub services: ServiceArgs,

    #[command(flatten)]
    pub recreate: RecreateArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StopArgs {
    #[command(flatten)]
    pub services: ServiceArgs,

    /// Seconds to wait before killing (default: execution.stop_timeout_secs)
    #[arg(short, long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct KillArgs {
    #[command(flatten)]
    pub services: ServiceArgs,

    /// Signal to send
    #[arg(short, long, default_value = "SIGKILL")]
    pub signal: String,
}

#[derive(Args, Debug, Clone)]
pub struct ScaleArgs {
    /// Target container counts
    #[arg(value_name = "SERVICE=COUNT", required = true, value_parser = parse_scale)]
    pub targets: Vec<(String, u32)>,
}

#[derive(Args, Debug, Clone)]
pub struct DownArgs {
    /// Also remove the project's named volumes
    #[arg(short, long)]
    pub volumes: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn up(args: UpArgs, source: &ProjectSource) -> Result<()> {
    let services = as_refs(&args.services.services);
    let options = UpOptions {
        strategy: args.recreate.strategy(),
        start_deps: !args.no_deps,
        scale: args.scale.into_iter().collect(),
    };
    run(source, |ctx, cancel| async move {
        ctx.orchestrator.up(&services, options, &cancel).await
    })
    .await
}

pub async fn create(args: CreateArgs, source: &ProjectSource) -> Result<()> {
    let services = as_refs(&args.services.services);
    let strategy = args.recreate.strategy();
    run(source, |ctx, cancel| async move {
        ctx.orchestrator.create(&services, strategy, &cancel).await
    })
    .await
}

pub async fn start(args: ServiceArgs, source: &ProjectSource) -> Result<()> {
    let services = as_refs(&args.services);
    run(source, |ctx, cancel| async move {
        ctx.orchestrator.start(&services, &cancel).await
    })
    .await
}

pub async fn stop(args: StopArgs, source: &ProjectSource) -> Result<()> {
    let services = as_refs(&args.services.services);
    let timeout = args.timeout.map(Duration::from_secs);
    run(source, |ctx, cancel| async move {
        ctx.orchestrator.stop(&services, timeout, &cancel).await
    })
    .await
}

pub async fn pause(args: ServiceArgs, source: &ProjectSource) -> Result<()> {
    let services = as_refs(&args.services);
    run(source, |ctx, cancel| async move {
        ctx.orchestrator.pause(&services, &cancel).await
    })
    .await
}

pub async fn unpause(args: ServiceArgs, source: &ProjectSource) -> Result<()> {
    let services = as_refs(&args.services);
    run(source, |ctx, cancel| async move {
        ctx.orchestrator.unpause(&services, &cancel).await
    })
    .await
}

pub async fn kill(args: KillArgs, source: &ProjectSource) -> Result<()> {
    let services = as_refs(&args.services.services);
    let signal = args.signal;
    run(source, |ctx, cancel| async move {
        ctx.orchestrator.kill(&services, &signal, &cancel).await
    })
    .await
}

pub async fn rm(args: ServiceArgs, source: &ProjectSource) -> Result<()> {
    let services = as_refs(&args.services);
    run(source, |ctx, cancel| async move {
        ctx.orchestrator.remove_stopped(&services, &cancel).await
    })
    .await
}

/// Scale each named service in turn; stops at the first hard error.
pub async fn scale(args: ScaleArgs, source: &ProjectSource) -> Result<()> {
    let ctx = ProjectContext::load(source).await?;
    let cancel = interrupt_token();
    let progress = output::spawn_progress(&ctx.event_bus);

    let mut outcome = Ok(());
    for (service, count) in args.targets {
        println!("{} {} to {}", "Scaling".bold(), service, count);
        let result = ctx.orchestrator.scale(&service, count, &cancel).await;
        outcome = settle(result);
        if outcome.is_err() {
            break;
        }
    }

    tokio::task::yield_now().await;
    progress.abort();
    outcome
}

pub async fn down(args: DownArgs, source: &ProjectSource) -> Result<()> {
    let remove_volumes = args.volumes;
    run(source, |ctx, cancel| async move {
        ctx.orchestrator.down(&[], remove_volumes, &cancel).await
    })
    .await
}

/// Load the project, stream progress while `operation` runs, then print the
/// report.
async fn run<F, Fut>(source: &ProjectSource, operation: F) -> Result<()>
where
    F: FnOnce(Arc<ProjectContext>, CancellationToken) -> Fut,
    Fut: Future<Output = Result<OperationReport, ProjectError>>,
{
    let ctx = Arc::new(ProjectContext::load(source).await?);
    let cancel = interrupt_token();
    let progress = output::spawn_progress(&ctx.event_bus);

    let result = operation(ctx.clone(), cancel).await;

    tokio::task::yield_now().await;
    progress.abort();
    settle(result)
}

fn settle(result: Result<OperationReport, ProjectError>) -> Result<()> {
    match result {
        Ok(report) => output::finish(&report),
        Err(err) => Err(err.into()),
    }
}
