// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Project Aggregate
//!
//! A project is a name plus an ordered collection of services and the named
//! volumes / networks they share. The project name is the namespace for all
//! label-based discovery.
//!
//! # Invariants
//! - Service names are unique
//! - Every service reference (link, volumes-from, network namespace,
//!   depends_on) names a service of this project
//! - Every named volume a service binds is declared at project level

use crate::domain::error::ProjectError;
use crate::domain::service::{NetworkMode, Service, VolumeBinding};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Project-level declaration of a named volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
    /// External volumes are never created and never driver-checked.
    #[serde(default)]
    pub external: bool,
    /// Engine-side name of an external volume; defaults to the declared name.
    #[serde(default)]
    pub name: Option<String>,
}

impl VolumeConfig {
    pub fn with_driver(driver: impl Into<String>) -> Self {
        Self {
            driver: Some(driver.into()),
            ..Default::default()
        }
    }

    pub fn external() -> Self {
        Self {
            external: true,
            ..Default::default()
        }
    }
}

/// Project-level declaration of a named network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub name: Option<String>,
}

impl NetworkConfig {
    pub fn with_driver(driver: impl Into<String>) -> Self {
        Self {
            driver: Some(driver.into()),
            ..Default::default()
        }
    }

    pub fn external() -> Self {
        Self {
            external: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    name: String,
    services: Vec<Service>,
    volumes: BTreeMap<String, VolumeConfig>,
    networks: BTreeMap<String, NetworkConfig>,
}

impl Project {
    /// Create a project without named volumes or networks.
    pub fn new(name: impl Into<String>, services: Vec<Service>) -> Result<Self, ProjectError> {
        Self::with_resources(name, services, BTreeMap::new(), BTreeMap::new())
    }

    pub fn with_resources(
        name: impl Into<String>,
        services: Vec<Service>,
        volumes: BTreeMap<String, VolumeConfig>,
        networks: BTreeMap<String, NetworkConfig>,
    ) -> Result<Self, ProjectError> {
        let name = normalize_name(&name.into());
        if name.is_empty() {
            return Err(ProjectError::Configuration(
                "Project name must contain at least one alphanumeric character".to_string(),
            ));
        }

        let project = Self {
            name,
            services,
            volumes,
            networks,
        };
        project.validate()?;
        Ok(project)
    }

    fn validate(&self) -> Result<(), ProjectError> {
        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.is_empty() {
                return Err(ProjectError::Configuration(
                    "Service name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(ProjectError::Configuration(format!(
                    "Service '{}' is defined more than once",
                    service.name
                )));
            }
        }

        for service in &self.services {
            for dependency in service.dependency_names() {
                if !seen.contains(dependency) {
                    return Err(ProjectError::Configuration(format!(
                        "Service '{}' references undefined service '{}'",
                        service.name, dependency
                    )));
                }
            }

            if service.network_mode.source_service() == Some(service.name.as_str()) {
                return Err(ProjectError::Configuration(format!(
                    "Service '{}' cannot join its own network namespace",
                    service.name
                )));
            }

            for volume in &service.volumes {
                if let VolumeBinding::Named { volume, .. } = volume {
                    if !self.volumes.contains_key(volume) {
                        return Err(ProjectError::Configuration(format!(
                            "Named volume '{}' is used in service '{}' but no declaration was found in the volumes section",
                            volume, service.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn get_service(&self, name: &str) -> Result<&Service, ProjectError> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ProjectError::NoSuchService(name.to_string()))
    }

    pub fn volumes(&self) -> &BTreeMap<String, VolumeConfig> {
        &self.volumes
    }

    pub fn networks(&self) -> &BTreeMap<String, NetworkConfig> {
        &self.networks
    }

    /// Resolve a selection; an empty selection means every service. Unknown
    /// names fail with `NoSuchService`. The result follows project order.
    pub fn select(&self, names: &[&str]) -> Result<Vec<&Service>, ProjectError> {
        if names.is_empty() {
            return Ok(self.services.iter().collect());
        }
        for name in names {
            self.get_service(name)?;
        }
        Ok(self
            .services
            .iter()
            .filter(|s| names.contains(&s.name.as_str()))
            .collect())
    }

    /// Engine-side name of a declared volume.
    pub fn volume_name(&self, volume: &str) -> String {
        match self.volumes.get(volume) {
            Some(config) if config.external => {
                config.name.clone().unwrap_or_else(|| volume.to_string())
            }
            _ => format!("{}_{}", self.name, volume),
        }
    }

    /// Engine-side name of a network referenced by a service. Undeclared
    /// names pass through untouched.
    pub fn network_name(&self, network: &str) -> String {
        match self.networks.get(network) {
            Some(config) if config.external => {
                config.name.clone().unwrap_or_else(|| network.to_string())
            }
            Some(_) => format!("{}_{}", self.name, network),
            None => network.to_string(),
        }
    }

    pub fn default_network_name(&self) -> String {
        format!("{}_default", self.name)
    }

    /// Whether any of `services` runs on the project default network.
    pub fn uses_default_network<'a>(&self, services: impl IntoIterator<Item = &'a Service>) -> bool {
        services
            .into_iter()
            .any(|s| s.network_mode == NetworkMode::ProjectDefault)
    }
}

/// Lowercase and strip everything but `[a-z0-9]`, so the name is safe to use
/// as a resource prefix.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::{AccessMode, Link, VolumeFromSpec};

    #[test]
    fn test_project_name_is_normalized() {
        let project = Project::new("Compose-Test_1", vec![]).unwrap();
        assert_eq!(project.name(), "composetest1");
        assert!(Project::new("--", vec![]).is_err());
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let err = Project::new(
            "shop",
            vec![Service::new("web", "nginx"), Service::new("web", "nginx")],
        )
        .unwrap_err();
        assert!(matches!(err, ProjectError::Configuration(msg) if msg.contains("more than once")));
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let err = Project::new(
            "shop",
            vec![Service::new("web", "nginx").with_link(Link::new("db"))],
        )
        .unwrap_err();
        assert!(matches!(err, ProjectError::Configuration(msg) if msg.contains("'db'")));
    }

    #[test]
    fn test_container_volume_source_needs_no_service() {
        let project = Project::new(
            "shop",
            vec![Service::new("db", "postgres")
                .with_volumes_from(VolumeFromSpec::container("legacy_data", AccessMode::ReadOnly))],
        );
        assert!(project.is_ok());
    }

    #[test]
    fn test_undeclared_named_volume_rejected() {
        let err = Project::new(
            "shop",
            vec![Service::new("db", "postgres").with_volume("pgdata:/var/lib/pg".parse().unwrap())],
        )
        .unwrap_err();
        assert!(matches!(err, ProjectError::Configuration(msg) if msg.contains("pgdata")));
    }

    #[test]
    fn test_resource_names_are_project_scoped() {
        let volumes = BTreeMap::from([
            ("data".to_string(), VolumeConfig::default()),
            (
                "legacy".to_string(),
                VolumeConfig {
                    external: true,
                    name: Some("old_data".to_string()),
                    ..Default::default()
                },
            ),
        ]);
        let networks = BTreeMap::from([("back".to_string(), NetworkConfig::default())]);
        let project = Project::with_resources("shop", vec![], volumes, networks).unwrap();

        assert_eq!(project.volume_name("data"), "shop_data");
        assert_eq!(project.volume_name("legacy"), "old_data");
        assert_eq!(project.network_name("back"), "shop_back");
        assert_eq!(project.network_name("outside"), "outside");
        assert_eq!(project.default_network_name(), "shop_default");
    }

    #[test]
    fn test_select_preserves_project_order() {
        let project = Project::new(
            "shop",
            vec![
                Service::new("db", "postgres"),
                Service::new("web", "nginx"),
                Service::new("cache", "redis"),
            ],
        )
        .unwrap();

        let selected: Vec<&str> = project
            .select(&["cache", "db"])
            .unwrap()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(selected, vec!["db", "cache"]);
        assert_eq!(project.select(&[]).unwrap().len(), 3);
        assert!(matches!(
            project.select(&["nope"]),
            Err(ProjectError::NoSuchService(name)) if name == "nope"
        ));
    }
}
