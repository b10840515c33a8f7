// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use stevedore_core::domain::config::OrchestratorConfig;
use stevedore_core::domain::graph::{DependencyGraph, WalkDirection};
use stevedore_core::infrastructure::ProjectManifestParser;

use super::ProjectSource;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate the configuration file and the project manifest
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with default settings
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./stevedore-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, source: &ProjectSource) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(source.config.clone(), paths).await,
        ConfigCommand::Validate { file } => {
            validate(file.or_else(|| source.config.clone()), source).await
        }
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = OrchestratorConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. STEVEDORE_CONFIG_PATH: {}",
            std::env::var("STEVEDORE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./stevedore-config.yaml");
        println!("  4. ~/.stevedore/config.yaml");
        println!("  5. /etc/stevedore/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Engine:".bold());
    println!(
        "  Socket: {}",
        config.engine.socket_path.as_deref().unwrap_or("(local default)")
    );
    println!("  Timeout: {}s", config.engine.timeout_secs);
    println!();

    println!("{}", "Execution:".bold());
    println!("  Parallelism: {}", config.execution.parallelism);
    println!("  Stop timeout: {}s", config.execution.stop_timeout_secs);
    println!("  Pull images: {}", config.execution.pull_images);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>, source: &ProjectSource) -> Result<()> {
    println!("Validating configuration...");

    let config = OrchestratorConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    println!("{}", "✓ Configuration is valid".green());

    println!("Validating project {}...", source.file.display());
    let project = ProjectManifestParser::load_project(&source.file, source.project_name.as_deref())?;
    let graph = DependencyGraph::build(&project)?;
    let names: Vec<String> = project.service_names().iter().map(|s| s.to_string()).collect();
    let plan = graph.plan(&names, WalkDirection::DependenciesFirst);

    println!(
        "{}",
        format!(
            "✓ Project '{}' is valid ({} services, {} volumes, {} networks)",
            project.name(),
            project.services().len(),
            project.volumes().len(),
            project.networks().len()
        )
        .green()
    );
    for (i, layer) in plan.layers().iter().enumerate() {
        println!("  Layer {}: {}", i + 1, layer.join(", "));
    }

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    let sample = format!(
        "# Stevedore orchestrator configuration\n{}",
        OrchestratorConfig::default().to_yaml()?
    );

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generated_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stevedore-config.yaml");

        generate(path.clone()).await.unwrap();

        let config = OrchestratorConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }
}
