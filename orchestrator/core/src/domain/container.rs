// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Container handle
//!
//! A [`Container`] is a value snapshot of one engine-side instance, recomputed
//! from the engine on every query. Holding one does not keep it current.

use crate::domain::labels::{self, ContainerIdentity};
use crate::domain::service::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
}

impl ContainerState {
    /// Paused containers count as running, as the engine reports them.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Restarting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Exited => "exited",
            Self::Dead => "dead",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Bind,
    Volume,
}

/// A mount as reported by container inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub kind: MountKind,
    /// Volume name, for `MountKind::Volume`.
    pub name: Option<String>,
    /// Host path backing the mount.
    pub source: String,
    pub destination: String,
    pub read_write: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub state: ContainerState,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub log_config: Option<LoggingConfig>,
}

impl Container {
    pub fn identity(&self) -> Option<ContainerIdentity> {
        labels::decode(&self.labels)
    }

    pub fn service(&self) -> Option<&str> {
        self.labels.get(labels::LABEL_SERVICE).map(String::as_str)
    }

    pub fn ordinal(&self) -> Option<u32> {
        self.identity().map(|identity| identity.ordinal)
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.labels.get(labels::LABEL_CONFIG_HASH).map(String::as_str)
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.state == ContainerState::Paused
    }

    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }

    /// The mount at `destination`, if any.
    pub fn mount(&self, destination: &str) -> Option<&Mount> {
        self.mounts.iter().find(|m| m.destination == destination)
    }

    /// `web_1` for `shop_web_1`.
    pub fn name_without_project(&self) -> String {
        match self.identity() {
            Some(identity) => format!("{}_{}", identity.service, identity.ordinal),
            None => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn container(state: ContainerState) -> Container {
        Container {
            id: "0123456789abcdef0123".to_string(),
            name: "shop_web_2".to_string(),
            image: "nginx".to_string(),
            labels: labels::encode("shop", "web", 2, "cafe", &BTreeMap::new()),
            state,
            mounts: vec![Mount {
                kind: MountKind::Volume,
                name: Some("v1".to_string()),
                source: "/var/lib/volumes/v1/_data".to_string(),
                destination: "/data".to_string(),
                read_write: true,
            }],
            network_mode: None,
            log_config: None,
        }
    }

    #[test]
    fn test_identity_accessors() {
        let c = container(ContainerState::Running);
        assert_eq!(c.service(), Some("web"));
        assert_eq!(c.ordinal(), Some(2));
        assert_eq!(c.fingerprint(), Some("cafe"));
        assert_eq!(c.short_id(), "0123456789ab");
        assert_eq!(c.name_without_project(), "web_2");
        assert!(c.mount("/data").is_some());
        assert!(c.mount("/other").is_none());
    }

    #[test]
    fn test_paused_counts_as_running() {
        assert!(container(ContainerState::Paused).is_running());
        assert!(container(ContainerState::Paused).is_paused());
        assert!(!container(ContainerState::Exited).is_running());
        assert!(!container(ContainerState::Created).is_running());
    }
}
