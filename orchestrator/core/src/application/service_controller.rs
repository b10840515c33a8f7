// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service Controller
//!
//! Per-service lifecycle work executed by the layered executor: converging a
//! service to its desired containers, recreating drifted containers and the
//! plain start / stop / pause / unpause / kill / remove transitions.
//!
//! References to other services (links, volumes-from, network namespaces)
//! are resolved here, against live containers, at the moment a container is
//! created.

use crate::application::executor::{ChangeAction, ServiceSummary};
use crate::domain::config::ExecutionConfig;
use crate::domain::container::{Container, MountKind};
use crate::domain::convergence::{self, ContainerAction, ConvergenceStrategy};
use crate::domain::engine::{ContainerEngine, ContainerSpec, EngineError};
use crate::domain::error::ProjectError;
use crate::domain::events::ContainerEvent;
use crate::domain::labels::{self, LabelFilter};
use crate::domain::project::Project;
use crate::domain::scaling;
use crate::domain::service::{container_name, NetworkMode, Service, VolumeBinding, VolumeSource};
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parameters of a converge pass over one service.
#[derive(Debug, Clone, Copy)]
pub struct ConvergeOptions {
    pub strategy: ConvergenceStrategy,
    /// Explicit desired scale; `None` keeps the current container count.
    pub scale: Option<u32>,
    /// Start retained and new containers (`up`, `scale`) or only create
    /// them (`create`).
    pub start: bool,
}

pub struct ServiceController {
    engine: Arc<dyn ContainerEngine>,
    event_bus: Arc<EventBus>,
    settings: ExecutionConfig,
}

impl ServiceController {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        event_bus: Arc<EventBus>,
        settings: ExecutionConfig,
    ) -> Self {
        Self {
            engine,
            event_bus,
            settings,
        }
    }

    /// Containers of `service`, discovered by label and sorted by ordinal.
    pub async fn containers(
        &self,
        project: &Project,
        service: &str,
        include_stopped: bool,
    ) -> Result<Vec<Container>, ProjectError> {
        let filter = LabelFilter::service(project.name(), service);
        let mut containers = self
            .engine
            .list_containers(&filter, include_stopped)
            .await
            .map_err(|e| ProjectError::from_engine(service, e))?;

        containers.retain(|c| c.identity().is_some());
        containers.sort_by_key(|c| c.ordinal());
        Ok(containers)
    }

    // ========================================================================
    // Convergence
    // ========================================================================

    pub async fn converge(
        &self,
        project: &Project,
        service: &Service,
        options: ConvergeOptions,
    ) -> Result<ServiceSummary, ProjectError> {
        let existing = self.containers(project, &service.name, true).await?;
        let desired = scaling::resolve_desired_scale(options.scale, existing.len(), service.scale);
        let plan = convergence::plan(service, options.strategy, existing, desired);

        debug!(
            "Convergence plan for {} (strategy: {}, scale: {}): {} keep, {} recreate, {} create, {} remove",
            service.name,
            options.strategy,
            desired,
            plan.count("keep"),
            plan.count("recreate"),
            plan.count("create"),
            plan.count("remove")
        );

        let needs_image = plan
            .actions
            .iter()
            .any(|a| matches!(a, ContainerAction::Recreate(_) | ContainerAction::Create { .. }));
        if needs_image {
            self.ensure_image(service).await?;
        }

        let mut summary = ServiceSummary::default();
        for action in plan.actions {
            match action {
                ContainerAction::Remove(container) => {
                    self.stop_and_remove(project, &service.name, &container, &mut summary)
                        .await?;
                }
                ContainerAction::Keep(container) => {
                    if options.start && !container.is_running() {
                        self.start_container(project, &service.name, &container.name, &container.id, &mut summary)
                            .await?;
                    }
                }
                ContainerAction::Recreate(container) => {
                    let name = container.name.clone();
                    let new_id = self
                        .recreate_container(project, service, container, &mut summary)
                        .await?;
                    if options.start {
                        self.start_container(project, &service.name, &name, &new_id, &mut summary)
                            .await?;
                    }
                }
                ContainerAction::Create { ordinal } => {
                    let name = container_name(project.name(), &service.name, ordinal);
                    let id = self.create_container(project, service, ordinal, None).await?;
                    summary.record(&name, &id, ChangeAction::Created);
                    if options.start {
                        self.start_container(project, &service.name, &name, &id, &mut summary)
                            .await?;
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn ensure_image(&self, service: &Service) -> Result<(), ProjectError> {
        if !self.settings.pull_images {
            return Ok(());
        }
        self.engine
            .ensure_image(&service.image)
            .await
            .map_err(|e| ProjectError::operation_failed(&service.name, e))
    }

    /// Create container `ordinal` of `service`, returning its id. When
    /// `previous` is given, its anonymous volumes are bound into the new
    /// container at the same destinations.
    fn create_container<'a>(
        &'a self,
        project: &'a Project,
        service: &'a Service,
        ordinal: u32,
        previous: Option<&'a Container>,
    ) -> BoxFuture<'a, Result<String, ProjectError>> {
        async move {
            let spec = self.container_spec(project, service, ordinal, previous).await?;
            let name = spec.name.clone();

            debug!("Creating container {} from {}", name, service.image);
            let id = self
                .engine
                .create_container(spec)
                .await
                .map_err(|e| ProjectError::operation_failed(&service.name, e))?;

            info!("Created container {} ({})", name, short(&id));
            metrics::counter!("stevedore_containers_created_total").increment(1);
            self.event_bus.publish_container_event(ContainerEvent::ContainerCreated {
                project: project.name().to_string(),
                service: service.name.clone(),
                container: name,
                container_id: id.clone(),
                created_at: Utc::now(),
            });
            Ok(id)
        }
        .boxed()
    }

    async fn container_spec(
        &self,
        project: &Project,
        service: &Service,
        ordinal: u32,
        previous: Option<&Container>,
    ) -> Result<ContainerSpec, ProjectError> {
        let fingerprint = service.fingerprint();
        let mut spec = ContainerSpec {
            name: container_name(project.name(), &service.name, ordinal),
            image: service.image.clone(),
            command: service.command.clone(),
            entrypoint: service.entrypoint.clone(),
            env: service
                .environment
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect(),
            labels: labels::encode(project.name(), &service.name, ordinal, &fingerprint, &service.labels),
            log_config: service.logging.clone(),
            ..Default::default()
        };

        for binding in &service.volumes {
            match binding {
                VolumeBinding::Anonymous { target } => {
                    let carried = previous
                        .and_then(|p| p.mount(target))
                        .filter(|m| m.kind == MountKind::Volume)
                        .and_then(|m| m.name.as_deref());
                    match carried {
                        Some(volume) => spec.binds.push(format!("{}:{}:rw", volume, target)),
                        None => spec.volumes.push(target.clone()),
                    }
                }
                VolumeBinding::Bind {
                    source,
                    target,
                    mode,
                } => spec.binds.push(format!("{}:{}:{}", source, target, mode.as_str())),
                VolumeBinding::Named {
                    volume,
                    target,
                    mode,
                } => spec.binds.push(format!(
                    "{}:{}:{}",
                    project.volume_name(volume),
                    target,
                    mode.as_str()
                )),
            }
        }

        spec.volumes_from = self.resolve_volumes_from(project, service).await?;
        spec.links = self.resolve_links(project, service).await?;
        spec.network_mode = self.resolve_network_mode(project, service).await?;
        Ok(spec)
    }

    // ========================================================================
    // Reference resolution
    // ========================================================================

    async fn resolve_volumes_from(
        &self,
        project: &Project,
        service: &Service,
    ) -> Result<Vec<String>, ProjectError> {
        let mut resolved = Vec::new();
        for spec in &service.volumes_from {
            let id = match &spec.source {
                VolumeSource::Service(name) => {
                    let source = project.get_service(name)?;
                    self.source_container(project, &service.name, source).await?
                }
                VolumeSource::Container(name) => self.external_container(&service.name, name).await?,
            };
            resolved.push(format!("{}:{}", id, spec.mode.as_str()));
        }
        Ok(resolved)
    }

    async fn resolve_network_mode(
        &self,
        project: &Project,
        service: &Service,
    ) -> Result<Option<String>, ProjectError> {
        let mode = match &service.network_mode {
            NetworkMode::ProjectDefault => project.default_network_name(),
            NetworkMode::Network(name) => project.network_name(name),
            NetworkMode::Host => "host".to_string(),
            NetworkMode::None => "none".to_string(),
            NetworkMode::Service(name) => {
                let source = project.get_service(name)?;
                format!("container:{}", self.source_container(project, &service.name, source).await?)
            }
            NetworkMode::Container(name) => {
                format!("container:{}", self.external_container(&service.name, name).await?)
            }
        };
        Ok(Some(mode))
    }

    /// Every container of each linked service is reachable under its full
    /// name and its `service_n` name; the lowest ordinal also answers to the
    /// link alias.
    async fn resolve_links(
        &self,
        project: &Project,
        service: &Service,
    ) -> Result<Vec<String>, ProjectError> {
        let mut links: Vec<String> = Vec::new();
        for link in &service.links {
            let containers = self.containers(project, &link.service, true).await?;
            for (position, container) in containers.iter().enumerate() {
                let mut candidates = Vec::with_capacity(3);
                if position == 0 {
                    candidates.push(format!("{}:{}", container.name, link.alias()));
                }
                candidates.push(format!("{}:{}", container.name, container.name));
                candidates.push(format!("{}:{}", container.name, container.name_without_project()));
                for candidate in candidates {
                    if !links.contains(&candidate) {
                        links.push(candidate);
                    }
                }
            }
        }
        Ok(links)
    }

    /// Id of the lowest-ordinal container of `source`. When the service has
    /// no container yet, one is created but not started. A concurrent
    /// `dependent` may create it first; the container that won is reused.
    fn source_container<'a>(
        &'a self,
        project: &'a Project,
        dependent: &'a str,
        source: &'a Service,
    ) -> BoxFuture<'a, Result<String, ProjectError>> {
        async move {
            let existing = self.containers(project, &source.name, true).await?;
            if let Some(container) = existing.first() {
                return Ok(container.id.clone());
            }

            info!(
                "Service {} has no container yet, creating one so {} can reference it",
                source.name, dependent
            );
            self.ensure_image(source)
                .await
                .map_err(|e| referenced_source_failed(dependent, source, e))?;
            match self.create_container(project, source, 1, None).await {
                Ok(id) => Ok(id),
                Err(err) => {
                    let existing = self.containers(project, &source.name, true).await?;
                    match existing.first() {
                        Some(container) => {
                            debug!(
                                "Container {} was created concurrently, reusing it for {}",
                                container.name, dependent
                            );
                            Ok(container.id.clone())
                        }
                        None => Err(referenced_source_failed(dependent, source, err)),
                    }
                }
            }
        }
        .boxed()
    }

    async fn external_container(&self, service: &str, name: &str) -> Result<String, ProjectError> {
        match self.engine.inspect_container(name).await {
            Ok(container) => Ok(container.id),
            Err(EngineError::NotFound(_)) => Err(ProjectError::NotFound(format!(
                "container {} referenced by service {}",
                name, service
            ))),
            Err(e) => Err(ProjectError::operation_failed(service, e)),
        }
    }

    // ========================================================================
    // Recreate
    // ========================================================================

    /// Replace `old` with a container built from the current service
    /// definition. The old container is renamed out of the way first and is
    /// only stopped and removed once the replacement exists; if creating the
    /// replacement fails the old container gets its name back.
    async fn recreate_container(
        &self,
        project: &Project,
        service: &Service,
        old: Container,
        summary: &mut ServiceSummary,
    ) -> Result<String, ProjectError> {
        let ordinal = old.ordinal().unwrap_or(1);
        let parked = format!("{}_{}", old.short_id(), old.name);

        info!("Recreating {}", old.name);
        self.rename_container(project, &service.name, &old.id, &old.name, &parked)
            .await?;

        let new_id = match self.create_container(project, service, ordinal, Some(&old)).await {
            Ok(id) => id,
            Err(error) => {
                warn!(
                    "Failed to create replacement for {}, restoring the original container: {}",
                    old.name, error
                );
                if let Err(e) = self
                    .rename_container(project, &service.name, &old.id, &parked, &old.name)
                    .await
                {
                    warn!("Could not restore name of {}: {}", old.name, e);
                }
                return Err(match error {
                    ProjectError::OperationFailed { .. } => error,
                    other => ProjectError::operation_failed(&service.name, other),
                });
            }
        };

        if old.is_running() {
            self.stop_container(project, &service.name, &parked, &old.id, None)
                .await?;
        }
        self.remove_container(project, &service.name, &parked, &old.id, None)
            .await?;

        summary.record(&old.name, &new_id, ChangeAction::Recreated);
        Ok(new_id)
    }

    // ========================================================================
    // Lifecycle transitions
    // ========================================================================

    pub async fn start_service(
        &self,
        project: &Project,
        service: &str,
    ) -> Result<ServiceSummary, ProjectError> {
        let mut summary = ServiceSummary::default();
        for container in self.containers(project, service, true).await? {
            if !container.is_running() {
                self.start_container(project, service, &container.name, &container.id, &mut summary)
                    .await?;
            }
        }
        Ok(summary)
    }

    pub async fn stop_service(
        &self,
        project: &Project,
        service: &str,
        timeout: Duration,
    ) -> Result<ServiceSummary, ProjectError> {
        let mut summary = ServiceSummary::default();
        for container in self.containers(project, service, false).await? {
            self.stop_container_with(project, service, &container, timeout, &mut summary)
                .await?;
        }
        Ok(summary)
    }

    pub async fn pause_service(
        &self,
        project: &Project,
        service: &str,
    ) -> Result<ServiceSummary, ProjectError> {
        let mut summary = ServiceSummary::default();
        for container in self.containers(project, service, false).await? {
            if container.is_paused() {
                continue;
            }
            self.engine
                .pause_container(&container.id)
                .await
                .map_err(|e| ProjectError::from_engine(service, e))?;
            debug!("Paused {}", container.name);
            self.event_bus.publish_container_event(ContainerEvent::ContainerPaused {
                project: project.name().to_string(),
                service: service.to_string(),
                container: container.name.clone(),
                paused_at: Utc::now(),
            });
            summary.record(&container.name, &container.id, ChangeAction::Paused);
        }
        Ok(summary)
    }

    pub async fn unpause_service(
        &self,
        project: &Project,
        service: &str,
    ) -> Result<ServiceSummary, ProjectError> {
        let mut summary = ServiceSummary::default();
        for container in self.containers(project, service, false).await? {
            if !container.is_paused() {
                continue;
            }
            self.engine
                .unpause_container(&container.id)
                .await
                .map_err(|e| ProjectError::from_engine(service, e))?;
            debug!("Unpaused {}", container.name);
            self.event_bus.publish_container_event(ContainerEvent::ContainerUnpaused {
                project: project.name().to_string(),
                service: service.to_string(),
                container: container.name.clone(),
                unpaused_at: Utc::now(),
            });
            summary.record(&container.name, &container.id, ChangeAction::Unpaused);
        }
        Ok(summary)
    }

    pub async fn kill_service(
        &self,
        project: &Project,
        service: &str,
        signal: &str,
    ) -> Result<ServiceSummary, ProjectError> {
        let mut summary = ServiceSummary::default();
        for container in self.containers(project, service, false).await? {
            self.engine
                .kill_container(&container.id, signal)
                .await
                .map_err(|e| ProjectError::from_engine(service, e))?;
            info!("Killed {} with {}", container.name, signal);
            self.event_bus.publish_container_event(ContainerEvent::ContainerKilled {
                project: project.name().to_string(),
                service: service.to_string(),
                container: container.name.clone(),
                signal: signal.to_string(),
                killed_at: Utc::now(),
            });
            summary.record(&container.name, &container.id, ChangeAction::Killed);
        }
        Ok(summary)
    }

    /// Remove containers that are not running; running ones are reported as
    /// skipped.
    pub async fn remove_stopped_service(
        &self,
        project: &Project,
        service: &str,
    ) -> Result<ServiceSummary, ProjectError> {
        let mut summary = ServiceSummary::default();
        for container in self.containers(project, service, true).await? {
            if container.is_running() {
                summary.skip(&container.name);
                continue;
            }
            self.remove_container(project, service, &container.name, &container.id, Some(&mut summary))
                .await?;
        }
        Ok(summary)
    }

    /// Stop and remove every container of the service.
    pub async fn down_service(
        &self,
        project: &Project,
        service: &str,
        timeout: Duration,
    ) -> Result<ServiceSummary, ProjectError> {
        let mut summary = ServiceSummary::default();
        for container in self.containers(project, service, true).await? {
            if container.is_running() {
                self.stop_container_with(project, service, &container, timeout, &mut summary)
                    .await?;
            }
            self.remove_container(project, service, &container.name, &container.id, Some(&mut summary))
                .await?;
        }
        Ok(summary)
    }

    // ========================================================================
    // Single-container engine calls
    // ========================================================================

    async fn start_container(
        &self,
        project: &Project,
        service: &str,
        name: &str,
        id: &str,
        summary: &mut ServiceSummary,
    ) -> Result<(), ProjectError> {
        self.engine
            .start_container(id)
            .await
            .map_err(|e| ProjectError::operation_failed(service, e))?;
        info!("Started {}", name);
        self.event_bus.publish_container_event(ContainerEvent::ContainerStarted {
            project: project.name().to_string(),
            service: service.to_string(),
            container: name.to_string(),
            started_at: Utc::now(),
        });
        summary.record(name, id, ChangeAction::Started);
        Ok(())
    }

    async fn stop_container_with(
        &self,
        project: &Project,
        service: &str,
        container: &Container,
        timeout: Duration,
        summary: &mut ServiceSummary,
    ) -> Result<(), ProjectError> {
        self.engine
            .stop_container(&container.id, timeout)
            .await
            .map_err(|e| ProjectError::from_engine(service, e))?;
        info!("Stopped {}", container.name);
        self.event_bus.publish_container_event(ContainerEvent::ContainerStopped {
            project: project.name().to_string(),
            service: service.to_string(),
            container: container.name.clone(),
            stopped_at: Utc::now(),
        });
        summary.record(&container.name, &container.id, ChangeAction::Stopped);
        Ok(())
    }

    async fn stop_container(
        &self,
        project: &Project,
        service: &str,
        name: &str,
        id: &str,
        summary: Option<&mut ServiceSummary>,
    ) -> Result<(), ProjectError> {
        self.engine
            .stop_container(id, self.settings.stop_timeout())
            .await
            .map_err(|e| ProjectError::from_engine(service, e))?;
        debug!("Stopped {}", name);
        self.event_bus.publish_container_event(ContainerEvent::ContainerStopped {
            project: project.name().to_string(),
            service: service.to_string(),
            container: name.to_string(),
            stopped_at: Utc::now(),
        });
        if let Some(summary) = summary {
            summary.record(name, id, ChangeAction::Stopped);
        }
        Ok(())
    }

    async fn stop_and_remove(
        &self,
        project: &Project,
        service: &str,
        container: &Container,
        summary: &mut ServiceSummary,
    ) -> Result<(), ProjectError> {
        if container.is_running() {
            self.stop_container(project, service, &container.name, &container.id, Some(&mut *summary))
                .await?;
        }
        self.remove_container(project, service, &container.name, &container.id, Some(summary))
            .await
    }

    async fn remove_container(
        &self,
        project: &Project,
        service: &str,
        name: &str,
        id: &str,
        summary: Option<&mut ServiceSummary>,
    ) -> Result<(), ProjectError> {
        self.engine
            .remove_container(id, false)
            .await
            .map_err(|e| ProjectError::from_engine(service, e))?;
        info!("Removed {}", name);
        metrics::counter!("stevedore_containers_removed_total").increment(1);
        self.event_bus.publish_container_event(ContainerEvent::ContainerRemoved {
            project: project.name().to_string(),
            service: service.to_string(),
            container: name.to_string(),
            removed_at: Utc::now(),
        });
        if let Some(summary) = summary {
            summary.record(name, id, ChangeAction::Removed);
        }
        Ok(())
    }

    async fn rename_container(
        &self,
        project: &Project,
        service: &str,
        id: &str,
        from: &str,
        to: &str,
    ) -> Result<(), ProjectError> {
        self.engine
            .rename_container(id, to)
            .await
            .map_err(|e| ProjectError::from_engine(service, e))?;
        debug!("Renamed {} to {}", from, to);
        self.event_bus.publish_container_event(ContainerEvent::ContainerRenamed {
            project: project.name().to_string(),
            service: service.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            renamed_at: Utc::now(),
        });
        Ok(())
    }
}

fn short(id: &str) -> &str {
    &id[..id.len().min(12)]
}

fn referenced_source_failed(dependent: &str, source: &Service, error: ProjectError) -> ProjectError {
    ProjectError::operation_failed(
        dependent,
        format!("could not create a container for referenced service {}: {}", source.name, error),
    )
}
