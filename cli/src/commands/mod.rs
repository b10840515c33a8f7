// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Stevedore CLI

pub mod config;
pub mod lifecycle;
pub mod output;
pub mod status;

pub use self::config::ConfigCommand;
pub use self::lifecycle::{
    CreateArgs, DownArgs, KillArgs, ScaleArgs, ServiceArgs, StopArgs, UpArgs,
};
pub use self::status::PsArgs;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use stevedore_core::application::ProjectOrchestrator;
use stevedore_core::domain::config::OrchestratorConfig;
use stevedore_core::infrastructure::{DockerEngine, EventBus, ProjectManifestParser};

/// Where the project comes from, as given on the command line.
#[derive(Debug, Clone)]
pub struct ProjectSource {
    pub file: PathBuf,
    pub project_name: Option<String>,
    pub config: Option<PathBuf>,
}

/// Everything a lifecycle command needs: the loaded project wired to a live
/// engine, plus the event bus the orchestrator publishes to.
pub struct ProjectContext {
    pub orchestrator: ProjectOrchestrator,
    pub event_bus: Arc<EventBus>,
    pub config: OrchestratorConfig,
}

impl ProjectContext {
    pub async fn load(source: &ProjectSource) -> Result<Self> {
        let config = OrchestratorConfig::load_or_default(source.config.clone())
            .context("Failed to load configuration")?;

        let project = ProjectManifestParser::load_project(&source.file, source.project_name.as_deref())
            .with_context(|| format!("Failed to load project from {}", source.file.display()))?;
        info!(
            "Loaded project '{}' with {} service(s)",
            project.name(),
            project.services().len()
        );

        let engine = DockerEngine::new(&config.engine).context("Failed to connect to Docker")?;
        engine.healthcheck().await?;
        debug!("Docker engine is reachable");

        let event_bus = Arc::new(EventBus::with_default_capacity());
        let orchestrator = ProjectOrchestrator::new(
            project,
            Arc::new(engine),
            event_bus.clone(),
            config.execution.clone(),
        );

        Ok(Self {
            orchestrator,
            event_bus,
            config,
        })
    }
}

/// Cancellation token that fires on Ctrl-C. Services already being worked on
/// finish; nothing new is started.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, waiting for in-flight services to finish...");
            trigger.cancel();
        }
    });
    token
}

/// Parse a `SERVICE=COUNT` pair.
pub fn parse_scale(value: &str) -> Result<(String, u32)> {
    let Some((service, count)) = value.split_once('=') else {
        bail!("Expected SERVICE=COUNT, got '{}'", value);
    };
    let service = service.trim();
    if service.is_empty() {
        bail!("Missing service name in '{}'", value);
    }
    let count = count
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid container count in '{}'", value))?;
    Ok((service.to_string(), count))
}

pub(crate) fn as_refs(services: &[String]) -> Vec<&str> {
    services.iter().map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scale() {
        assert_eq!(parse_scale("web=3").unwrap(), ("web".to_string(), 3));
        assert_eq!(parse_scale(" worker = 0 ").unwrap(), ("worker".to_string(), 0));
    }

    #[test]
    fn test_parse_scale_rejects_malformed_input() {
        assert!(parse_scale("web").is_err());
        assert!(parse_scale("=2").is_err());
        assert!(parse_scale("web=-1").is_err());
        assert!(parse_scale("web=many").is_err());
    }
}
