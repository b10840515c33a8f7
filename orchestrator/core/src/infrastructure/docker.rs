// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::config::EngineConfig;
use crate::domain::container::{Container, ContainerState, Mount, MountKind};
use crate::domain::engine::{
    ContainerEngine, ContainerSpec, EngineError, NetworkInfo, ResourceSpec, VolumeInfo,
};
use crate::domain::labels::LabelFilter;
use crate::domain::service::LoggingConfig;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, RemoveContainerOptions, RenameContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{
    ContainerInspectResponse, ContainerStateStatusEnum, HostConfig, HostConfigLogConfig,
    MountPointTypeEnum,
};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        // Connect to Docker daemon (custom socket or auto-detect)
        let docker = if let Some(path) = &config.socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(path, config.timeout_secs, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(path, config.timeout_secs, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| EngineError::Connection(format!(
                "Failed to connect to Docker at {}: {}\n\n\
                 Ensure Docker is running and the socket path is correct.",
                path, e
            )))?
        } else {
            Docker::connect_with_local_defaults()
                .map_err(|e| EngineError::Connection(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\
                     - On Linux: Current user not in 'docker' group",
                    e
                )))?
                .with_timeout(Duration::from_secs(config.timeout_secs))
        };

        Ok(Self { docker })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), EngineError> {
        self.docker.ping().await.map_err(|e| {
            EngineError::Connection(format!(
                "Cannot connect to Docker daemon: {}\n\n\
                 Docker healthcheck failed. Ensure Docker is running.\n\
                 Verify with: docker ps",
                e
            ))
        })?;
        Ok(())
    }
}

fn map_error(error: BollardError) -> EngineError {
    match error {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        BollardError::DockerResponseServerError {
            status_code: 409,
            message,
        } => EngineError::Conflict(message),
        BollardError::DockerResponseServerError { message, .. } => EngineError::Api(message),
        other => EngineError::Api(other.to_string()),
    }
}

/// The daemon answers 304 when a container is already in the requested state.
fn ignore_not_modified(result: Result<(), BollardError>) -> Result<(), EngineError> {
    match result {
        Err(BollardError::DockerResponseServerError {
            status_code: 304, ..
        }) => Ok(()),
        other => other.map_err(map_error),
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn container_state(status: Option<ContainerStateStatusEnum>) -> ContainerState {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
        Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
        Some(ContainerStateStatusEnum::PAUSED) => ContainerState::Paused,
        Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Restarting,
        Some(ContainerStateStatusEnum::EXITED) => ContainerState::Exited,
        _ => ContainerState::Dead,
    }
}

fn to_container(inspect: ContainerInspectResponse) -> Container {
    let config = inspect.config.unwrap_or_default();
    let host_config = inspect.host_config.unwrap_or_default();

    let mounts = inspect
        .mounts
        .unwrap_or_default()
        .into_iter()
        .filter_map(|m| {
            let kind = match m.typ {
                Some(MountPointTypeEnum::BIND) => MountKind::Bind,
                Some(MountPointTypeEnum::VOLUME) => MountKind::Volume,
                _ => return None,
            };
            Some(Mount {
                kind,
                name: m.name,
                source: m.source.unwrap_or_default(),
                destination: m.destination?,
                read_write: m.rw.unwrap_or(true),
            })
        })
        .collect();

    let log_config = host_config.log_config.and_then(|log| {
        log.typ.map(|driver| LoggingConfig {
            driver,
            options: log.config.unwrap_or_default().into_iter().collect(),
        })
    });

    Container {
        id: inspect.id.unwrap_or_default(),
        name: inspect
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string(),
        image: config.image.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
        state: container_state(inspect.state.and_then(|s| s.status)),
        mounts,
        network_mode: host_config.network_mode,
        log_config,
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ensure_image(&self, image: &str) -> Result<(), EngineError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!("Pulling image: {}", image);
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!("Pull {}: {}", image, status);
                    }
                }
                Err(e) => return Err(map_error(e)),
            }
        }
        info!("Successfully pulled image: {}", image);
        Ok(())
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, EngineError> {
        let host_config = HostConfig {
            binds: non_empty(spec.binds),
            volumes_from: non_empty(spec.volumes_from),
            links: non_empty(spec.links),
            network_mode: spec.network_mode,
            log_config: spec.log_config.map(|log| HostConfigLogConfig {
                typ: Some(log.driver),
                config: Some(log.options.into_iter().collect()),
            }),
            ..Default::default()
        };

        let volumes: HashMap<String, HashMap<(), ()>> = spec
            .volumes
            .into_iter()
            .map(|target| (target, HashMap::new()))
            .collect();

        let config = Config {
            image: Some(spec.image),
            cmd: spec.command,
            entrypoint: spec.entrypoint,
            env: non_empty(spec.env),
            labels: Some(spec.labels),
            volumes: if volumes.is_empty() { None } else { Some(volumes) },
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(map_error)?;
        for warning in &response.warnings {
            debug!("Create {}: {}", spec.name, warning);
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        ignore_not_modified(
            self.docker
                .start_container(id, None::<StartContainerOptions<String>>)
                .await,
        )
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), EngineError> {
        let options = StopContainerOptions {
            t: timeout.as_secs() as i64,
        };
        ignore_not_modified(self.docker.stop_container(id, Some(options)).await)
    }

    async fn kill_container(&self, id: &str, signal: &str) -> Result<(), EngineError> {
        let options = KillContainerOptions { signal };
        self.docker
            .kill_container(id, Some(options))
            .await
            .map_err(map_error)
    }

    async fn pause_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker.pause_container(id).await.map_err(map_error)
    }

    async fn unpause_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker.unpause_container(id).await.map_err(map_error)
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), EngineError> {
        let options = RenameContainerOptions { name: new_name };
        self.docker
            .rename_container(id, options)
            .await
            .map_err(map_error)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(map_error)
    }

    async fn inspect_container(&self, id: &str) -> Result<Container, EngineError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(map_error)?;
        Ok(to_container(inspect))
    }

    async fn list_containers(
        &self,
        filter: &LabelFilter,
        include_stopped: bool,
    ) -> Result<Vec<Container>, EngineError> {
        let filters: HashMap<String, Vec<String>> =
            [("label".to_string(), filter.to_engine_filters())]
                .into_iter()
                .collect();

        let options = ListContainersOptions {
            all: include_stopped,
            filters,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_error)?;

        // The listing lacks mounts and log config detail, so inspect each.
        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else { continue };
            match self.inspect_container(&id).await {
                Ok(container) => containers.push(container),
                // Removed between listing and inspection
                Err(EngineError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn create_network(&self, spec: ResourceSpec) -> Result<NetworkInfo, EngineError> {
        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            check_duplicate: true,
            driver: spec.driver.unwrap_or_else(|| "bridge".to_string()),
            options: spec.options,
            labels: spec.labels,
            ..Default::default()
        };

        self.docker
            .create_network(options)
            .await
            .map_err(map_error)?;

        self.inspect_network(&spec.name).await?.ok_or_else(|| {
            EngineError::Api(format!("network {} disappeared after creation", spec.name))
        })
    }

    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkInfo>, EngineError> {
        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(network) => Ok(Some(NetworkInfo {
                id: network.id.unwrap_or_default(),
                name: network.name.unwrap_or_else(|| name.to_string()),
                driver: network.driver.unwrap_or_default(),
                options: network.options.unwrap_or_default(),
                labels: network.labels.unwrap_or_default(),
            })),
            Err(e) => match map_error(e) {
                EngineError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn remove_network(&self, name: &str) -> Result<(), EngineError> {
        self.docker.remove_network(name).await.map_err(map_error)
    }

    async fn create_volume(&self, spec: ResourceSpec) -> Result<VolumeInfo, EngineError> {
        let options = CreateVolumeOptions {
            name: spec.name,
            driver: spec.driver.unwrap_or_else(|| "local".to_string()),
            driver_opts: spec.options,
            labels: spec.labels,
        };

        let volume = self
            .docker
            .create_volume(options)
            .await
            .map_err(map_error)?;

        Ok(VolumeInfo {
            name: volume.name,
            driver: volume.driver,
            options: volume.options,
            labels: volume.labels,
        })
    }

    async fn inspect_volume(&self, name: &str) -> Result<Option<VolumeInfo>, EngineError> {
        match self.docker.inspect_volume(name).await {
            Ok(volume) => Ok(Some(VolumeInfo {
                name: volume.name,
                driver: volume.driver,
                options: volume.options,
                labels: volume.labels,
            })),
            Err(e) => match map_error(e) {
                EngineError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await
            .map_err(map_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, ContainerState as InspectState, MountPoint};

    #[test]
    fn test_status_codes_map_to_engine_errors() {
        let not_found = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".to_string(),
        };
        assert!(matches!(map_error(not_found), EngineError::NotFound(_)));

        let conflict = BollardError::DockerResponseServerError {
            status_code: 409,
            message: "name in use".to_string(),
        };
        assert!(matches!(map_error(conflict), EngineError::Conflict(_)));

        let not_modified = Err(BollardError::DockerResponseServerError {
            status_code: 304,
            message: String::new(),
        });
        assert!(ignore_not_modified(not_modified).is_ok());
    }

    #[test]
    fn test_inspect_response_conversion() {
        let inspect = ContainerInspectResponse {
            id: Some("0123456789abcdef".to_string()),
            name: Some("/shop_web_1".to_string()),
            config: Some(ContainerConfig {
                image: Some("nginx:1.25".to_string()),
                labels: Some(HashMap::from([(
                    "io.stevedore.project".to_string(),
                    "shop".to_string(),
                )])),
                ..Default::default()
            }),
            state: Some(InspectState {
                status: Some(ContainerStateStatusEnum::PAUSED),
                ..Default::default()
            }),
            mounts: Some(vec![MountPoint {
                typ: Some(MountPointTypeEnum::VOLUME),
                name: Some("abc".to_string()),
                source: Some("/var/lib/docker/volumes/abc/_data".to_string()),
                destination: Some("/data".to_string()),
                rw: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let container = to_container(inspect);
        assert_eq!(container.name, "shop_web_1");
        assert_eq!(container.state, ContainerState::Paused);
        assert!(container.is_running());
        assert_eq!(container.mount("/data").and_then(|m| m.name.as_deref()), Some("abc"));
    }
}
