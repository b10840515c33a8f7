// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Container Engine
//!
//! A process-local [`ContainerEngine`] with the observable behaviour of a
//! Docker daemon, for development and tests:
//!
//! - container names are unique (`Conflict` on reuse)
//! - named volumes referenced by a bind are created on first use, anonymous
//!   volumes get a generated name
//! - `volumes_from` copies the source container's mounts
//! - joining another container's network namespace requires that container
//!   to be running at start, as do link targets
//! - unknown volume / network drivers are reported as `NotFound`
//!
//! Faults can be injected per image or container name, and every engine call
//! is recorded so tests can assert on ordering.

use crate::domain::container::{Container, ContainerState, Mount, MountKind};
use crate::domain::engine::{
    ContainerEngine, ContainerSpec, EngineError, NetworkInfo, ResourceSpec, VolumeInfo,
};
use crate::domain::labels::LabelFilter;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const DEFAULT_VOLUME_DRIVER: &str = "local";
const DEFAULT_NETWORK_DRIVER: &str = "bridge";
const NETWORK_DRIVERS: &[&str] = &["bridge", "overlay", "host", "macvlan", "ipvlan", "null"];

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    pub method: &'static str,
    /// Container name, or the resource / image name for non-container calls.
    pub target: String,
}

#[derive(Default)]
struct Faults {
    create: HashSet<String>,
    start: HashSet<String>,
    missing_images: HashSet<String>,
    latency: Option<Duration>,
}

struct Instance {
    container: Container,
    links: Vec<String>,
}

#[derive(Default)]
struct EngineState {
    containers: BTreeMap<String, Instance>,
    volumes: BTreeMap<String, VolumeInfo>,
    networks: BTreeMap<String, NetworkInfo>,
    images: BTreeSet<String>,
    volume_drivers: BTreeSet<String>,
    faults: Faults,
    calls: Vec<EngineCall>,
}

impl EngineState {
    /// Resolve a container by id, id prefix or name.
    fn find_id(&self, reference: &str) -> Option<String> {
        if self.containers.contains_key(reference) {
            return Some(reference.to_string());
        }
        let name = reference.trim_start_matches('/');
        self.containers
            .iter()
            .find(|(id, instance)| instance.container.name == name || id.starts_with(reference))
            .map(|(id, _)| id.clone())
    }

    fn instance_mut(&mut self, reference: &str) -> Result<&mut Instance, EngineError> {
        let id = self
            .find_id(reference)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", reference)))?;
        self.containers
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", reference)))
    }

    fn record(&mut self, method: &'static str, target: impl Into<String>) {
        self.calls.push(EngineCall {
            method,
            target: target.into(),
        });
    }

    fn name_of(&self, reference: &str) -> String {
        self.find_id(reference)
            .and_then(|id| self.containers.get(&id))
            .map(|instance| instance.container.name.clone())
            .unwrap_or_else(|| reference.to_string())
    }

    fn is_running(&self, reference: &str) -> bool {
        self.find_id(reference)
            .and_then(|id| self.containers.get(&id))
            .map(|instance| instance.container.state == ContainerState::Running)
            .unwrap_or(false)
    }

    fn ensure_volume(&mut self, name: &str) -> VolumeInfo {
        self.volumes
            .entry(name.to_string())
            .or_insert_with(|| VolumeInfo {
                name: name.to_string(),
                driver: DEFAULT_VOLUME_DRIVER.to_string(),
                options: Default::default(),
                labels: Default::default(),
            })
            .clone()
    }

    fn volume_mount(&mut self, name: &str, destination: &str, read_write: bool) -> Mount {
        self.ensure_volume(name);
        Mount {
            kind: MountKind::Volume,
            name: Some(name.to_string()),
            source: format!("/var/lib/docker/volumes/{}/_data", name),
            destination: destination.to_string(),
            read_write,
        }
    }

    fn volume_in_use(&self, name: &str) -> bool {
        self.containers.values().any(|instance| {
            instance
                .container
                .mounts
                .iter()
                .any(|m| m.name.as_deref() == Some(name))
        })
    }
}

/// Docker-like engine kept entirely in memory.
#[derive(Clone)]
pub struct InMemoryEngine {
    state: Arc<Mutex<EngineState>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        let state = EngineState {
            volume_drivers: BTreeSet::from([DEFAULT_VOLUME_DRIVER.to_string()]),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, EngineState>, EngineError> {
        self.state
            .lock()
            .map_err(|_| EngineError::Api("engine state lock poisoned".to_string()))
    }

    async fn round_trip(&self) {
        let latency = self.state().ok().and_then(|state| state.faults.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Register an additional volume driver plugin.
    pub fn with_volume_driver(self, driver: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state() {
            state.volume_drivers.insert(driver.into());
        }
        self
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Make container creation fail for a container name or an image.
    pub fn fail_create(&self, name_or_image: impl Into<String>) {
        if let Ok(mut state) = self.state() {
            state.faults.create.insert(name_or_image.into());
        }
    }

    /// Make starting the named container fail.
    pub fn fail_start(&self, name: impl Into<String>) {
        if let Ok(mut state) = self.state() {
            state.faults.start.insert(name.into());
        }
    }

    /// Make pulling `image` fail as if the registry did not know it.
    pub fn missing_image(&self, image: impl Into<String>) {
        if let Ok(mut state) = self.state() {
            state.faults.missing_images.insert(image.into());
        }
    }

    /// Delay every container create and list by `latency`, so concurrent
    /// callers interleave the way they do against a real daemon.
    pub fn delay_calls(&self, latency: Duration) {
        if let Ok(mut state) = self.state() {
            state.faults.latency = Some(latency);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut state) = self.state() {
            state.faults = Faults::default();
        }
    }

    // ========================================================================
    // Inspection helpers
    // ========================================================================

    /// Every container, including stopped ones, sorted by name.
    pub fn snapshot(&self) -> Vec<Container> {
        let Ok(state) = self.state() else {
            return Vec::new();
        };
        let mut containers: Vec<Container> = state
            .containers
            .values()
            .map(|instance| instance.container.clone())
            .collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        containers
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().map(|state| state.calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .map(|state| state.calls.iter().filter(|c| c.method == method).count())
            .unwrap_or(0)
    }

    /// Names of containers in the order they were started.
    pub fn start_order(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == "start_container")
            .map(|c| c.target)
            .collect()
    }

    pub fn volume(&self, name: &str) -> Option<VolumeInfo> {
        self.state().ok()?.volumes.get(name).cloned()
    }

    pub fn network(&self, name: &str) -> Option<NetworkInfo> {
        self.state().ok()?.networks.get(name).cloned()
    }

    pub fn images(&self) -> Vec<String> {
        self.state()
            .map(|state| state.images.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_id() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn is_host_path(source: &str) -> bool {
    source.starts_with('/') || source.starts_with('.') || source.starts_with('~')
}

fn put_mount(mounts: &mut Vec<Mount>, mount: Mount) {
    mounts.retain(|m| m.destination != mount.destination);
    mounts.push(mount);
}

#[async_trait]
impl ContainerEngine for InMemoryEngine {
    async fn ensure_image(&self, image: &str) -> Result<(), EngineError> {
        let mut state = self.state()?;
        state.record("ensure_image", image);
        if state.images.contains(image) {
            return Ok(());
        }
        if state.faults.missing_images.contains(image) {
            return Err(EngineError::NotFound(format!(
                "pull access denied for {}, repository does not exist",
                image
            )));
        }
        debug!("Pulled image {}", image);
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, EngineError> {
        self.round_trip().await;
        let mut state = self.state()?;
        state.record("create_container", spec.name.clone());

        if state.faults.create.contains(&spec.name) || state.faults.create.contains(&spec.image) {
            return Err(EngineError::Api(format!(
                "injected failure creating {}",
                spec.name
            )));
        }
        if !state.images.contains(&spec.image) {
            return Err(EngineError::NotFound(format!("No such image: {}", spec.image)));
        }
        if state.find_id(&spec.name).is_some() {
            return Err(EngineError::Conflict(format!(
                "The container name \"/{}\" is already in use",
                spec.name
            )));
        }

        if let Some(mode) = &spec.network_mode {
            if let Some(target) = mode.strip_prefix("container:") {
                if state.find_id(target).is_none() {
                    return Err(EngineError::NotFound(format!("No such container: {}", target)));
                }
            } else if !matches!(mode.as_str(), "host" | "none" | "bridge" | "default")
                && !state.networks.contains_key(mode)
            {
                return Err(EngineError::NotFound(format!("network {} not found", mode)));
            }
        }

        for link in &spec.links {
            let target = link.split(':').next().unwrap_or(link);
            if state.find_id(target).is_none() {
                return Err(EngineError::NotFound(format!(
                    "Could not get container for {}",
                    target
                )));
            }
        }

        let mut mounts: Vec<Mount> = Vec::new();

        for source in &spec.volumes_from {
            let (reference, mode) = match source.rsplit_once(':') {
                Some((reference, mode)) if mode == "ro" || mode == "rw" => (reference, mode),
                _ => (source.as_str(), "rw"),
            };
            let id = state
                .find_id(reference)
                .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", reference)))?;
            let inherited: Vec<Mount> = state
                .containers
                .get(&id)
                .map(|instance| instance.container.mounts.clone())
                .unwrap_or_default();
            for mut mount in inherited {
                mount.read_write = mount.read_write && mode == "rw";
                put_mount(&mut mounts, mount);
            }
        }

        for target in &spec.volumes {
            let name = generate_id();
            let mount = state.volume_mount(&name, target, true);
            put_mount(&mut mounts, mount);
        }

        for bind in &spec.binds {
            let parts: Vec<&str> = bind.split(':').collect();
            let (source, destination, mode) = match parts.as_slice() {
                [source, destination] => (*source, *destination, "rw"),
                [source, destination, mode] => (*source, *destination, *mode),
                _ => return Err(EngineError::Api(format!("invalid bind specification: {}", bind))),
            };
            let read_write = mode != "ro";
            let mount = if is_host_path(source) {
                Mount {
                    kind: MountKind::Bind,
                    name: None,
                    source: source.to_string(),
                    destination: destination.to_string(),
                    read_write,
                }
            } else {
                state.volume_mount(source, destination, read_write)
            };
            put_mount(&mut mounts, mount);
        }

        let id = generate_id();
        let container = Container {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            labels: spec.labels.clone(),
            state: ContainerState::Created,
            mounts,
            network_mode: spec.network_mode.clone(),
            log_config: spec.log_config.clone(),
        };
        state.containers.insert(
            id.clone(),
            Instance {
                container,
                links: spec.links.clone(),
            },
        );
        debug!("Created container {} ({})", spec.name, &id[..12]);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state()?;
        let name = state.name_of(id);
        state.record("start_container", name.clone());

        let (network_mode, links, current) = {
            let instance = state.instance_mut(id)?;
            (
                instance.container.network_mode.clone(),
                instance.links.clone(),
                instance.container.state,
            )
        };

        match current {
            ContainerState::Running => return Ok(()),
            ContainerState::Paused => {
                return Err(EngineError::Conflict(format!(
                    "cannot start a paused container {}, try unpause instead",
                    name
                )))
            }
            _ => {}
        }
        if state.faults.start.contains(&name) {
            return Err(EngineError::Api(format!("injected failure starting {}", name)));
        }
        if let Some(target) = network_mode.as_deref().and_then(|m| m.strip_prefix("container:")) {
            if !state.is_running(target) {
                return Err(EngineError::Api(format!(
                    "cannot join network of a non running container: {}",
                    target
                )));
            }
        }
        for link in &links {
            let target = link.split(':').next().unwrap_or(link);
            if !state.is_running(target) {
                return Err(EngineError::Api(format!(
                    "Cannot link to a non running container: /{}",
                    target
                )));
            }
        }

        state.instance_mut(id)?.container.state = ContainerState::Running;
        Ok(())
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> Result<(), EngineError> {
        let mut state = self.state()?;
        let name = state.name_of(id);
        state.record("stop_container", name);

        let instance = state.instance_mut(id)?;
        if instance.container.state.is_running() {
            instance.container.state = ContainerState::Exited;
        }
        Ok(())
    }

    async fn kill_container(&self, id: &str, _signal: &str) -> Result<(), EngineError> {
        let mut state = self.state()?;
        let name = state.name_of(id);
        state.record("kill_container", name.clone());

        let instance = state.instance_mut(id)?;
        if !instance.container.state.is_running() {
            return Err(EngineError::Conflict(format!("Container {} is not running", name)));
        }
        instance.container.state = ContainerState::Exited;
        Ok(())
    }

    async fn pause_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state()?;
        let name = state.name_of(id);
        state.record("pause_container", name.clone());

        let instance = state.instance_mut(id)?;
        match instance.container.state {
            ContainerState::Running => {
                instance.container.state = ContainerState::Paused;
                Ok(())
            }
            ContainerState::Paused => Err(EngineError::Conflict(format!(
                "Container {} is already paused",
                name
            ))),
            _ => Err(EngineError::Conflict(format!("Container {} is not running", name))),
        }
    }

    async fn unpause_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state()?;
        let name = state.name_of(id);
        state.record("unpause_container", name.clone());

        let instance = state.instance_mut(id)?;
        if instance.container.state != ContainerState::Paused {
            return Err(EngineError::Conflict(format!("Container {} is not paused", name)));
        }
        instance.container.state = ContainerState::Running;
        Ok(())
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), EngineError> {
        let mut state = self.state()?;
        let name = state.name_of(id);
        state.record("rename_container", name);

        if state.find_id(new_name).is_some() {
            return Err(EngineError::Conflict(format!(
                "The container name \"/{}\" is already in use",
                new_name
            )));
        }
        state.instance_mut(id)?.container.name = new_name.to_string();
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let mut state = self.state()?;
        let name = state.name_of(id);
        state.record("remove_container", name.clone());

        let key = state
            .find_id(id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", id)))?;
        let running = state
            .containers
            .get(&key)
            .map(|instance| instance.container.state.is_running())
            .unwrap_or(false);
        if running && !force {
            return Err(EngineError::Conflict(format!(
                "You cannot remove a running container {}. Stop the container before attempting removal or force remove",
                name
            )));
        }
        state.containers.remove(&key);
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<Container, EngineError> {
        let mut state = self.state()?;
        state.record("inspect_container", id);
        state.instance_mut(id).map(|instance| instance.container.clone())
    }

    async fn list_containers(
        &self,
        filter: &LabelFilter,
        include_stopped: bool,
    ) -> Result<Vec<Container>, EngineError> {
        self.round_trip().await;
        let mut state = self.state()?;
        state.record("list_containers", filter.project_name());

        let mut containers: Vec<Container> = state
            .containers
            .values()
            .map(|instance| &instance.container)
            .filter(|c| filter.matches(&c.labels))
            .filter(|c| include_stopped || c.state.is_running())
            .cloned()
            .collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn create_network(&self, spec: ResourceSpec) -> Result<NetworkInfo, EngineError> {
        let mut state = self.state()?;
        state.record("create_network", spec.name.clone());

        let driver = spec
            .driver
            .clone()
            .unwrap_or_else(|| DEFAULT_NETWORK_DRIVER.to_string());
        if !NETWORK_DRIVERS.contains(&driver.as_str()) {
            return Err(EngineError::NotFound(format!("plugin \"{}\" not found", driver)));
        }
        if state.networks.contains_key(&spec.name) {
            return Err(EngineError::Conflict(format!(
                "network with name {} already exists",
                spec.name
            )));
        }

        let network = NetworkInfo {
            id: generate_id(),
            name: spec.name.clone(),
            driver,
            options: spec.options,
            labels: spec.labels,
        };
        state.networks.insert(spec.name, network.clone());
        Ok(network)
    }

    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkInfo>, EngineError> {
        let mut state = self.state()?;
        state.record("inspect_network", name);
        Ok(state.networks.get(name).cloned())
    }

    async fn remove_network(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state()?;
        state.record("remove_network", name);

        if !state.networks.contains_key(name) {
            return Err(EngineError::NotFound(format!("network {} not found", name)));
        }
        let attached = state
            .containers
            .values()
            .any(|instance| instance.container.network_mode.as_deref() == Some(name));
        if attached {
            return Err(EngineError::Conflict(format!(
                "error while removing network: network {} has active endpoints",
                name
            )));
        }
        state.networks.remove(name);
        Ok(())
    }

    async fn create_volume(&self, spec: ResourceSpec) -> Result<VolumeInfo, EngineError> {
        let mut state = self.state()?;
        state.record("create_volume", spec.name.clone());

        let driver = spec
            .driver
            .clone()
            .unwrap_or_else(|| DEFAULT_VOLUME_DRIVER.to_string());
        if !state.volume_drivers.contains(&driver) {
            return Err(EngineError::NotFound(format!(
                "error looking up volume plugin {}: plugin \"{}\" not found",
                driver, driver
            )));
        }
        if let Some(existing) = state.volumes.get(&spec.name) {
            if existing.driver != driver {
                return Err(EngineError::Conflict(format!(
                    "volume name {} already in use with driver {}",
                    spec.name, existing.driver
                )));
            }
            return Ok(existing.clone());
        }

        let volume = VolumeInfo {
            name: spec.name.clone(),
            driver,
            options: spec.options,
            labels: spec.labels,
        };
        state.volumes.insert(spec.name, volume.clone());
        Ok(volume)
    }

    async fn inspect_volume(&self, name: &str) -> Result<Option<VolumeInfo>, EngineError> {
        let mut state = self.state()?;
        state.record("inspect_volume", name);
        Ok(state.volumes.get(name).cloned())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state()?;
        state.record("remove_volume", name);

        if !state.volumes.contains_key(name) {
            return Err(EngineError::NotFound(format!("no such volume: {}", name)));
        }
        if state.volume_in_use(name) {
            return Err(EngineError::Conflict(format!("volume is in use - [{}]", name)));
        }
        state.volumes.remove(name);
        Ok(())
    }
}
