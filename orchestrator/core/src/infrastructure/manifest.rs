// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Project Manifest YAML Parser
//!
//! Translates an already-resolved project file into the domain [`Project`].
//! There is no variable interpolation and no multi-file merging; values are
//! taken as written.
//!
//! # Manifest Format
//!
//! ```yaml
//! name: shop
//! services:
//!   db:
//!     image: postgres:16
//!     environment:
//!       POSTGRES_PASSWORD: secret
//!     volumes:
//!       - pgdata:/var/lib/postgresql/data
//!   web:
//!     image: shop/web:latest
//!     command: ["gunicorn", "shop.wsgi"]
//!     links:
//!       - db:database
//!     scale: 2
//! volumes:
//!   pgdata:
//!     driver: local
//! ```
//!
//! Services keep the order in which they are written; it breaks ties between
//! services of the same dependency layer.

use crate::domain::project::{NetworkConfig, Project, VolumeConfig};
use crate::domain::service::{
    Link, LoggingConfig, NetworkMode, Service, VolumeBinding, VolumeFromSpec,
};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// Manifest Model
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectManifest {
    #[serde(default)]
    pub name: Option<String>,
    /// Mapping rather than a map type so declaration order survives.
    pub services: serde_yaml::Mapping,
    #[serde(default)]
    pub volumes: BTreeMap<String, Option<VolumeConfig>>,
    #[serde(default)]
    pub networks: BTreeMap<String, Option<NetworkConfig>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CommandLine {
    Line(String),
    Args(Vec<String>),
}

impl CommandLine {
    fn into_args(self) -> Vec<String> {
        match self {
            Self::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            Self::Args(args) => args,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Environment {
    Map(BTreeMap<String, serde_yaml::Value>),
    List(Vec<String>),
}

impl Default for Environment {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl Environment {
    fn into_map(self) -> Result<BTreeMap<String, String>> {
        match self {
            Self::Map(map) => map
                .into_iter()
                .map(|(key, value)| Ok((key, scalar_to_string(&value)?)))
                .collect(),
            Self::List(entries) => Ok(entries
                .into_iter()
                .map(|entry| match entry.split_once('=') {
                    Some((key, value)) => (key.to_string(), value.to_string()),
                    None => (entry, String::new()),
                })
                .collect()),
        }
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::String(s) => Ok(s.clone()),
        other => Err(anyhow!("Environment values must be scalars, got {:?}", other)),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceManifest {
    image: String,
    #[serde(default)]
    command: Option<CommandLine>,
    #[serde(default)]
    entrypoint: Option<CommandLine>,
    #[serde(default)]
    environment: Environment,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    volumes: Vec<VolumeBinding>,
    #[serde(default)]
    volumes_from: Vec<VolumeFromSpec>,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    network_mode: NetworkMode,
    #[serde(default)]
    scale: Option<u32>,
    #[serde(default)]
    logging: Option<LoggingConfig>,
}

impl ServiceManifest {
    fn into_service(self, name: String) -> Result<Service> {
        let mut service = Service::new(name, self.image);
        service.command = self.command.map(CommandLine::into_args);
        service.entrypoint = self.entrypoint.map(CommandLine::into_args);
        service.environment = self
            .environment
            .into_map()
            .with_context(|| format!("Invalid environment for service '{}'", service.name))?;
        service.labels = self.labels;
        service.volumes = self.volumes;
        service.volumes_from = self.volumes_from;
        service.links = self.links;
        service.depends_on = self.depends_on;
        service.network_mode = self.network_mode;
        if let Some(scale) = self.scale {
            service.scale = scale;
        }
        service.logging = self.logging;
        Ok(service)
    }
}

impl ProjectManifest {
    /// Convert into a validated [`Project`]. `name` wins over the manifest's
    /// own `name` field.
    pub fn into_project(self, name: Option<&str>) -> Result<Project> {
        let project_name = name
            .map(str::to_string)
            .or(self.name)
            .ok_or_else(|| anyhow!("No project name given and the manifest does not declare one"))?;

        let mut services = Vec::with_capacity(self.services.len());
        for (key, value) in self.services {
            let service_name = key
                .as_str()
                .ok_or_else(|| anyhow!("Service names must be strings, got {:?}", key))?
                .to_string();
            let manifest: ServiceManifest = serde_yaml::from_value(value)
                .with_context(|| format!("Invalid definition for service '{}'", service_name))?;
            services.push(manifest.into_service(service_name)?);
        }

        let volumes = self
            .volumes
            .into_iter()
            .map(|(name, config)| (name, config.unwrap_or_default()))
            .collect();
        let networks = self
            .networks
            .into_iter()
            .map(|(name, config)| (name, config.unwrap_or_default()))
            .collect();

        Project::with_resources(project_name, services, volumes, networks)
            .context("Invalid project definition")
    }
}

// ============================================================================
// Parser API
// ============================================================================

pub struct ProjectManifestParser;

impl ProjectManifestParser {
    pub fn parse_yaml(yaml: &str) -> Result<ProjectManifest> {
        serde_yaml::from_str(yaml).context("Failed to parse project manifest")
    }

    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<ProjectManifest> {
        let yaml = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read manifest file: {:?}", path.as_ref()))?;

        Self::parse_yaml(&yaml)
    }

    /// Load a project from a manifest file. Without an explicit name or a
    /// `name` field, the name of the manifest's directory is used.
    pub fn load_project<P: AsRef<Path>>(path: P, name: Option<&str>) -> Result<Project> {
        let path = path.as_ref();
        let manifest = Self::parse_file(path)?;

        let fallback = path
            .canonicalize()
            .ok()
            .and_then(|p| p.parent().and_then(|d| d.file_name()).map(|n| n.to_string_lossy().into_owned()));
        let name = name
            .map(str::to_string)
            .or_else(|| manifest.name.clone())
            .or(fallback);

        manifest.into_project(name.as_deref())
    }
}

// ============================================================================
// Tests
// ============================================================================
