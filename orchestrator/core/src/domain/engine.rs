// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Container engine port.
//!
//! Every method is a blocking network call in a real deployment and is the
//! unit of concurrency for the execution engine.

use crate::domain::container::Container;
use crate::domain::labels::LabelFilter;
use crate::domain::service::LoggingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Engine API error: {0}")]
    Api(String),
    #[error("Engine connection error: {0}")]
    Connection(String),
}

/// Everything needed to create one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    /// `KEY=VALUE`
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Container paths for engine-managed (anonymous) volumes.
    pub volumes: Vec<String>,
    /// `source:target:mode` where source is a host path or a volume name.
    pub binds: Vec<String>,
    /// `container-id:mode`
    pub volumes_from: Vec<String>,
    /// `container-name:alias`
    pub links: Vec<String>,
    pub network_mode: Option<String>,
    pub log_config: Option<LoggingConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub name: String,
    pub driver: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
    pub driver: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Request to create a volume or a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    /// `None` lets the engine pick its default driver.
    pub driver: Option<String>,
    pub options: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Make sure `image` is available locally, pulling it if needed.
    async fn ensure_image(&self, image: &str) -> Result<(), EngineError>;

    /// Returns the new container id.
    async fn create_container(&self, spec: ContainerSpec) -> Result<String, EngineError>;
    async fn start_container(&self, id: &str) -> Result<(), EngineError>;
    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), EngineError>;
    async fn kill_container(&self, id: &str, signal: &str) -> Result<(), EngineError>;
    async fn pause_container(&self, id: &str) -> Result<(), EngineError>;
    async fn unpause_container(&self, id: &str) -> Result<(), EngineError>;
    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), EngineError>;
    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;

    /// Inspect by id or name.
    async fn inspect_container(&self, id: &str) -> Result<Container, EngineError>;
    async fn list_containers(
        &self,
        filter: &LabelFilter,
        include_stopped: bool,
    ) -> Result<Vec<Container>, EngineError>;

    async fn create_network(&self, spec: ResourceSpec) -> Result<NetworkInfo, EngineError>;
    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkInfo>, EngineError>;
    async fn remove_network(&self, name: &str) -> Result<(), EngineError>;

    async fn create_volume(&self, spec: ResourceSpec) -> Result<VolumeInfo, EngineError>;
    async fn inspect_volume(&self, name: &str) -> Result<Option<VolumeInfo>, EngineError>;
    async fn remove_volume(&self, name: &str) -> Result<(), EngineError>;
}
