// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Resource Provisioner Application Service
//!
//! Idempotently ensures the named volumes and networks a set of services
//! needs exist in the engine:
//! - absent resources are created with the declared driver and options
//! - present resources are checked against the declaration; a conflicting
//!   driver is a `Configuration` error and the resource is left untouched
//! - external resources are never created, only required to exist
//!
//! All checks for one call complete before the first resource is created,
//! so a conflict on any resource aborts without mutating the engine.

use crate::domain::engine::{ContainerEngine, EngineError, NetworkInfo, ResourceSpec, VolumeInfo};
use crate::domain::error::ProjectError;
use crate::domain::events::ResourceEvent;
use crate::domain::labels;
use crate::domain::project::{NetworkConfig, Project, VolumeConfig};
use crate::domain::service::{NetworkMode, Service, VolumeBinding};
use crate::infrastructure::event_bus::EventBus;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Declared resources a set of services needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequirements {
    /// Declared (short) volume names.
    pub volumes: BTreeSet<String>,
    /// Declared (short) network names.
    pub networks: BTreeSet<String>,
    pub default_network: bool,
}

impl ResourceRequirements {
    pub fn for_services<'a>(
        project: &Project,
        services: impl IntoIterator<Item = &'a Service>,
    ) -> Self {
        let mut requirements = Self::default();
        for service in services {
            for volume in &service.volumes {
                if let VolumeBinding::Named { volume, .. } = volume {
                    requirements.volumes.insert(volume.clone());
                }
            }
            match &service.network_mode {
                NetworkMode::ProjectDefault => requirements.default_network = true,
                NetworkMode::Network(name) if project.networks().contains_key(name) => {
                    requirements.networks.insert(name.clone());
                }
                _ => {}
            }
        }
        requirements
    }

    /// Every declared resource, plus the default network when any service
    /// uses it.
    pub fn all(project: &Project) -> Self {
        Self {
            volumes: project.volumes().keys().cloned().collect(),
            networks: project.networks().keys().cloned().collect(),
            default_network: project.uses_default_network(project.services()),
        }
    }
}

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Ensure every required resource exists and matches its declaration.
    async fn provision(
        &self,
        project: &Project,
        requirements: &ResourceRequirements,
    ) -> Result<(), ProjectError>;

    /// Remove the project's non-external networks, including the default one.
    async fn remove_networks(&self, project: &Project) -> Result<Vec<String>, ProjectError>;

    /// Remove the project's non-external volumes.
    async fn remove_volumes(&self, project: &Project) -> Result<Vec<String>, ProjectError>;
}

// ============================================================================
// Standard Implementation
// ============================================================================

enum Pending<'a> {
    Volume {
        name: &'a str,
        config: &'a VolumeConfig,
    },
    Network {
        name: &'a str,
        engine_name: String,
        config: Option<&'a NetworkConfig>,
    },
}

pub struct StandardResourceProvisioner {
    engine: Arc<dyn ContainerEngine>,
    event_bus: Arc<EventBus>,
}

impl StandardResourceProvisioner {
    pub fn new(engine: Arc<dyn ContainerEngine>, event_bus: Arc<EventBus>) -> Self {
        Self { engine, event_bus }
    }

    fn engine_error(resource: &str, error: EngineError) -> ProjectError {
        ProjectError::OperationFailed {
            service: resource.to_string(),
            message: error.to_string(),
        }
    }

    /// Returns true when the volume still has to be created.
    async fn check_volume(
        &self,
        project: &Project,
        name: &str,
        config: &VolumeConfig,
    ) -> Result<bool, ProjectError> {
        let engine_name = project.volume_name(name);
        let existing = self
            .engine
            .inspect_volume(&engine_name)
            .await
            .map_err(|e| Self::engine_error(&engine_name, e))?;

        if config.external {
            return match existing {
                Some(_) => Ok(false),
                None => Err(ProjectError::Configuration(format!(
                    "External volume \"{}\" not found. Please create it before running this project",
                    engine_name
                ))),
            };
        }

        match existing {
            Some(info) => {
                check_driver_conflict("volume", name, &engine_name, config.driver.as_deref(), &info.driver)?;
                debug!("Volume {} already exists", engine_name);
                Ok(false)
            }
            None => Ok(true),
        }
    }

    async fn check_network(
        &self,
        project: &Project,
        name: &str,
        engine_name: &str,
        config: Option<&NetworkConfig>,
    ) -> Result<bool, ProjectError> {
        let existing = self
            .engine
            .inspect_network(engine_name)
            .await
            .map_err(|e| Self::engine_error(engine_name, e))?;

        if config.map(|c| c.external).unwrap_or(false) {
            return match existing {
                Some(_) => Ok(false),
                None => Err(ProjectError::Configuration(format!(
                    "External network \"{}\" not found. Please create it before running this project",
                    engine_name
                ))),
            };
        }

        let Some(info) = existing else {
            return Ok(true);
        };

        if let Some(config) = config {
            check_driver_conflict("network", name, engine_name, config.driver.as_deref(), &info.driver)?;
            check_network_options(name, config, &info)?;
        }
        debug!("Network {} already exists in project {}", engine_name, project.name());
        Ok(false)
    }

    async fn create_volume(
        &self,
        project: &Project,
        name: &str,
        config: &VolumeConfig,
    ) -> Result<VolumeInfo, ProjectError> {
        let engine_name = project.volume_name(name);
        info!("Creating volume {} (driver: {:?})", engine_name, config.driver);

        let spec = ResourceSpec {
            name: engine_name.clone(),
            driver: config.driver.clone().filter(|d| !d.is_empty()),
            options: config.driver_opts.clone().into_iter().collect(),
            labels: labels::volume_labels(project.name(), name),
        };

        let created = self.engine.create_volume(spec).await.map_err(|e| match e {
            EngineError::NotFound(_) => ProjectError::Configuration(format!(
                "Volume {} specifies nonexistent driver {}",
                name,
                config.driver.as_deref().unwrap_or_default()
            )),
            other => Self::engine_error(&engine_name, other),
        })?;

        metrics::counter!("stevedore_resources_created_total", "kind" => "volume").increment(1);
        self.event_bus.publish_resource_event(ResourceEvent::VolumeCreated {
            project: project.name().to_string(),
            volume: created.name.clone(),
            driver: created.driver.clone(),
            created_at: Utc::now(),
        });
        Ok(created)
    }

    async fn create_network(
        &self,
        project: &Project,
        name: &str,
        engine_name: &str,
        config: Option<&NetworkConfig>,
    ) -> Result<NetworkInfo, ProjectError> {
        let driver = config.and_then(|c| c.driver.clone()).filter(|d| !d.is_empty());
        info!("Creating network {} (driver: {:?})", engine_name, driver);

        let spec = ResourceSpec {
            name: engine_name.to_string(),
            driver: driver.clone(),
            options: config
                .map(|c| c.driver_opts.clone().into_iter().collect())
                .unwrap_or_default(),
            labels: labels::network_labels(project.name(), name),
        };

        let created = self.engine.create_network(spec).await.map_err(|e| match e {
            EngineError::NotFound(_) => ProjectError::Configuration(format!(
                "Network {} specifies nonexistent driver {}",
                name,
                driver.as_deref().unwrap_or_default()
            )),
            other => Self::engine_error(engine_name, other),
        })?;

        metrics::counter!("stevedore_resources_created_total", "kind" => "network").increment(1);
        self.event_bus.publish_resource_event(ResourceEvent::NetworkCreated {
            project: project.name().to_string(),
            network: created.name.clone(),
            driver: created.driver.clone(),
            created_at: Utc::now(),
        });
        Ok(created)
    }
}

#[async_trait]
impl ResourceProvisioner for StandardResourceProvisioner {
    async fn provision(
        &self,
        project: &Project,
        requirements: &ResourceRequirements,
    ) -> Result<(), ProjectError> {
        let mut pending = Vec::new();

        for name in &requirements.volumes {
            let config = project.volumes().get(name).ok_or_else(|| {
                ProjectError::Configuration(format!("Volume {} is not declared", name))
            })?;
            if self.check_volume(project, name, config).await? {
                pending.push(Pending::Volume { name, config });
            }
        }

        for name in &requirements.networks {
            let config = project.networks().get(name);
            let engine_name = project.network_name(name);
            if self.check_network(project, name, &engine_name, config).await? {
                pending.push(Pending::Network {
                    name,
                    engine_name,
                    config,
                });
            }
        }

        let default_name = project.default_network_name();
        if requirements.default_network
            && !requirements.networks.contains("default")
            && self.check_network(project, "default", &default_name, None).await?
        {
            pending.push(Pending::Network {
                name: "default",
                engine_name: default_name,
                config: None,
            });
        }

        for resource in pending {
            match resource {
                Pending::Volume { name, config } => {
                    self.create_volume(project, name, config).await?;
                }
                Pending::Network {
                    name,
                    engine_name,
                    config,
                } => {
                    self.create_network(project, name, &engine_name, config).await?;
                }
            }
        }

        Ok(())
    }

    async fn remove_networks(&self, project: &Project) -> Result<Vec<String>, ProjectError> {
        let mut names: Vec<String> = project
            .networks()
            .iter()
            .filter(|(_, config)| !config.external)
            .map(|(name, _)| project.network_name(name))
            .collect();
        names.push(project.default_network_name());

        let mut removed = Vec::new();
        for name in names {
            match self.engine.inspect_network(&name).await {
                Ok(Some(_)) => {}
                Ok(None) => continue,
                Err(e) => return Err(Self::engine_error(&name, e)),
            }
            info!("Removing network {}", name);
            self.engine
                .remove_network(&name)
                .await
                .map_err(|e| Self::engine_error(&name, e))?;
            self.event_bus.publish_resource_event(ResourceEvent::NetworkRemoved {
                project: project.name().to_string(),
                network: name.clone(),
                removed_at: Utc::now(),
            });
            removed.push(name);
        }
        Ok(removed)
    }

    async fn remove_volumes(&self, project: &Project) -> Result<Vec<String>, ProjectError> {
        let mut removed = Vec::new();
        for (name, config) in project.volumes() {
            if config.external {
                continue;
            }
            let engine_name = project.volume_name(name);
            match self.engine.inspect_volume(&engine_name).await {
                Ok(Some(_)) => {}
                Ok(None) => continue,
                Err(e) => return Err(Self::engine_error(&engine_name, e)),
            }
            info!("Removing volume {}", engine_name);
            self.engine
                .remove_volume(&engine_name)
                .await
                .map_err(|e| Self::engine_error(&engine_name, e))?;
            self.event_bus.publish_resource_event(ResourceEvent::VolumeRemoved {
                project: project.name().to_string(),
                volume: engine_name.clone(),
                removed_at: Utc::now(),
            });
            removed.push(engine_name);
        }
        Ok(removed)
    }
}

/// An empty or absent declared driver means "engine default" and never
/// conflicts.
fn check_driver_conflict(
    kind: &str,
    name: &str,
    engine_name: &str,
    declared: Option<&str>,
    existing: &str,
) -> Result<(), ProjectError> {
    match declared {
        Some(driver) if !driver.is_empty() && driver != existing => {
            Err(ProjectError::Configuration(format!(
                "Configuration for {kind} {name} specifies driver {driver}, but a {kind} with the same name uses a different driver ({existing}). If you wish to use the new configuration, please remove the existing {kind} \"{engine_name}\" first"
            )))
        }
        _ => Ok(()),
    }
}

fn check_network_options(
    name: &str,
    config: &NetworkConfig,
    existing: &NetworkInfo,
) -> Result<(), ProjectError> {
    let existing_options: &HashMap<String, String> = &existing.options;
    for (key, value) in &config.driver_opts {
        if existing_options.get(key) != Some(value) {
            return Err(ProjectError::Configuration(format!(
                "Network \"{}\" needs to be recreated - option \"{}\" has changed",
                name, key
            )));
        }
    }
    Ok(())
}
