// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Project Orchestrator
//!
//! Entry point for every project-wide verb. Each call:
//! 1. resolves the selected services (`NoSuchService` on unknown names)
//! 2. builds the dependency graph (`DependencyCycle` before any engine call)
//! 3. provisions the volumes / networks the plan needs (`Configuration` on
//!    conflicts, still before any container is touched)
//! 4. hands the layered plan to the executor and returns its report
//!
//! No container state is cached between calls; only explicit scale overrides
//! are remembered for the lifetime of the orchestrator.

use crate::application::executor::{ChangeAction, LayeredExecutor, OperationReport};
use crate::application::provisioner::{
    ResourceProvisioner, ResourceRequirements, StandardResourceProvisioner,
};
use crate::application::service_controller::{ConvergeOptions, ServiceController};
use crate::domain::config::ExecutionConfig;
use crate::domain::container::Container;
use crate::domain::convergence::ConvergenceStrategy;
use crate::domain::engine::{ContainerEngine, NetworkInfo};
use crate::domain::error::ProjectError;
use crate::domain::graph::{DependencyGraph, ExecutionPlan};
use crate::domain::labels::LabelFilter;
use crate::domain::operation::Operation;
use crate::domain::project::Project;
use crate::infrastructure::event_bus::EventBus;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Options for [`ProjectOrchestrator::up`].
#[derive(Debug, Clone)]
pub struct UpOptions {
    pub strategy: ConvergenceStrategy,
    /// Also bring up the transitive dependencies of the selected services.
    pub start_deps: bool,
    /// Explicit per-service scale; remembered for later calls.
    pub scale: BTreeMap<String, u32>,
}

impl Default for UpOptions {
    fn default() -> Self {
        Self {
            strategy: ConvergenceStrategy::Changed,
            start_deps: true,
            scale: BTreeMap::new(),
        }
    }
}

pub struct ProjectOrchestrator {
    project: Arc<Project>,
    engine: Arc<dyn ContainerEngine>,
    provisioner: Arc<dyn ResourceProvisioner>,
    controller: ServiceController,
    executor: LayeredExecutor,
    settings: ExecutionConfig,
    scale_overrides: RwLock<HashMap<String, u32>>,
}

impl ProjectOrchestrator {
    pub fn new(
        project: Project,
        engine: Arc<dyn ContainerEngine>,
        event_bus: Arc<EventBus>,
        settings: ExecutionConfig,
    ) -> Self {
        let provisioner: Arc<dyn ResourceProvisioner> = Arc::new(
            StandardResourceProvisioner::new(engine.clone(), event_bus.clone()),
        );
        Self {
            project: Arc::new(project),
            controller: ServiceController::new(engine.clone(), event_bus.clone(), settings.clone()),
            executor: LayeredExecutor::new(settings.parallelism, event_bus),
            engine,
            provisioner,
            settings,
            scale_overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the default resource provisioner.
    pub fn with_provisioner(mut self, provisioner: Arc<dyn ResourceProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    // ========================================================================
    // Pre-flight
    // ========================================================================

    fn prepare(
        &self,
        services: &[&str],
        operation: Operation,
        include_dependencies: bool,
    ) -> Result<(DependencyGraph, ExecutionPlan), ProjectError> {
        let selected: Vec<&str> = self
            .project
            .select(services)?
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        let graph = DependencyGraph::build(&self.project)?;

        let targets: Vec<String> = if include_dependencies {
            graph.with_dependencies(&selected)
        } else {
            selected.iter().map(|s| s.to_string()).collect()
        };

        let plan = graph.plan(&targets, operation.direction());
        Ok((graph, plan))
    }

    /// Provision resources for the planned services and everything they
    /// reference, since referenced services may get containers created on
    /// demand even when they are not part of the plan.
    async fn provision_for(
        &self,
        graph: &DependencyGraph,
        plan: &ExecutionPlan,
    ) -> Result<(), ProjectError> {
        let planned: Vec<&str> = plan.services().collect();
        let services = graph
            .with_dependencies(&planned)
            .into_iter()
            .map(|name| self.project.get_service(&name))
            .collect::<Result<Vec<_>, _>>()?;

        let requirements = ResourceRequirements::for_services(&self.project, services);
        self.provisioner.provision(&self.project, &requirements).await
    }

    /// Converge every service of `plan`. A service whose direct dependency
    /// had a container created or recreated during this walk is itself
    /// recreated, since its links, `volumes_from` and network namespace were
    /// bound to the previous container; `never` disables the cascade.
    async fn converge_plan(
        &self,
        operation: Operation,
        graph: &DependencyGraph,
        plan: &ExecutionPlan,
        strategy: ConvergenceStrategy,
        start: bool,
        cancel: &CancellationToken,
    ) -> OperationReport {
        let overrides = self.scale_overrides.read().await.clone();
        let project = self.project.as_ref();
        let controller = &self.controller;
        let overrides = &overrides;
        let replaced: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
        let replaced = &replaced;

        self.executor
            .execute(project.name(), operation, plan, cancel, move |name| async move {
                let service = project.get_service(&name)?;
                let strategy = {
                    let replaced = replaced.lock().await;
                    let cascade = strategy != ConvergenceStrategy::Never
                        && graph
                            .dependencies(&name)
                            .iter()
                            .any(|dependency| replaced.contains(dependency));
                    if cascade {
                        debug!("Recreating {} since a dependency was replaced", name);
                        ConvergenceStrategy::Always
                    } else {
                        strategy
                    }
                };
                let options = ConvergeOptions {
                    strategy,
                    scale: overrides.get(&name).copied(),
                    start,
                };
                let summary = controller.converge(project, service, options).await?;
                if summary.count(ChangeAction::Created) + summary.count(ChangeAction::Recreated) > 0 {
                    replaced.lock().await.insert(name);
                }
                Ok(summary)
            })
            .await
    }

    // ========================================================================
    // Verbs
    // ========================================================================

    /// Create containers for the selected services and their dependencies
    /// without starting them.
    pub async fn create(
        &self,
        services: &[&str],
        strategy: ConvergenceStrategy,
        cancel: &CancellationToken,
    ) -> Result<OperationReport, ProjectError> {
        let (graph, plan) = self.prepare(services, Operation::Create, true)?;
        self.provision_for(&graph, &plan).await?;
        info!("Creating {} service(s) in project {}", plan.len(), self.project.name());
        Ok(self
            .converge_plan(Operation::Create, &graph, &plan, strategy, false, cancel)
            .await)
    }

    /// Converge and start the selected services.
    pub async fn up(
        &self,
        services: &[&str],
        options: UpOptions,
        cancel: &CancellationToken,
    ) -> Result<OperationReport, ProjectError> {
        for name in options.scale.keys() {
            self.project.get_service(name)?;
        }
        let (graph, plan) = self.prepare(services, Operation::Up, options.start_deps)?;
        self.provision_for(&graph, &plan).await?;

        if !options.scale.is_empty() {
            let mut overrides = self.scale_overrides.write().await;
            for (name, scale) in &options.scale {
                overrides.insert(name.clone(), *scale);
            }
        }

        info!(
            "Bringing up {} service(s) in project {} (strategy: {})",
            plan.len(),
            self.project.name(),
            options.strategy
        );
        Ok(self
            .converge_plan(Operation::Up, &graph, &plan, options.strategy, true, cancel)
            .await)
    }

    pub async fn start(
        &self,
        services: &[&str],
        cancel: &CancellationToken,
    ) -> Result<OperationReport, ProjectError> {
        let (_, plan) = self.prepare(services, Operation::Start, false)?;
        let project = self.project.as_ref();
        let controller = &self.controller;
        Ok(self
            .executor
            .execute(project.name(), Operation::Start, &plan, cancel, move |name| async move {
                controller.start_service(project, &name).await
            })
            .await)
    }

    /// Stop running containers; `timeout` defaults to the configured stop
    /// timeout.
    pub async fn stop(
        &self,
        services: &[&str],
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<OperationReport, ProjectError> {
        let (_, plan) = self.prepare(services, Operation::Stop, false)?;
        let timeout = timeout.unwrap_or_else(|| self.settings.stop_timeout());
        let project = self.project.as_ref();
        let controller = &self.controller;
        Ok(self
            .executor
            .execute(project.name(), Operation::Stop, &plan, cancel, move |name| async move {
                controller.stop_service(project, &name, timeout).await
            })
            .await)
    }

    pub async fn pause(
        &self,
        services: &[&str],
        cancel: &CancellationToken,
    ) -> Result<OperationReport, ProjectError> {
        let (_, plan) = self.prepare(services, Operation::Pause, false)?;
        let project = self.project.as_ref();
        let controller = &self.controller;
        Ok(self
            .executor
            .execute(project.name(), Operation::Pause, &plan, cancel, move |name| async move {
                controller.pause_service(project, &name).await
            })
            .await)
    }

    pub async fn unpause(
        &self,
        services: &[&str],
        cancel: &CancellationToken,
    ) -> Result<OperationReport, ProjectError> {
        let (_, plan) = self.prepare(services, Operation::Unpause, false)?;
        let project = self.project.as_ref();
        let controller = &self.controller;
        Ok(self
            .executor
            .execute(project.name(), Operation::Unpause, &plan, cancel, move |name| async move {
                controller.unpause_service(project, &name).await
            })
            .await)
    }

    pub async fn kill(
        &self,
        services: &[&str],
        signal: &str,
        cancel: &CancellationToken,
    ) -> Result<OperationReport, ProjectError> {
        let (_, plan) = self.prepare(services, Operation::Kill, false)?;
        let project = self.project.as_ref();
        let controller = &self.controller;
        Ok(self
            .executor
            .execute(project.name(), Operation::Kill, &plan, cancel, move |name| async move {
                controller.kill_service(project, &name, signal).await
            })
            .await)
    }

    /// Remove containers that are not running. Running containers are left
    /// alone and listed as skipped in the service summary.
    pub async fn remove_stopped(
        &self,
        services: &[&str],
        cancel: &CancellationToken,
    ) -> Result<OperationReport, ProjectError> {
        let (_, plan) = self.prepare(services, Operation::RemoveStopped, false)?;
        let project = self.project.as_ref();
        let controller = &self.controller;
        Ok(self
            .executor
            .execute(project.name(), Operation::RemoveStopped, &plan, cancel, move |name| async move {
                controller.remove_stopped_service(project, &name).await
            })
            .await)
    }

    /// Set the number of containers of one service. The count is remembered,
    /// so a later `up` without overrides keeps it, including zero.
    pub async fn scale(
        &self,
        service: &str,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<OperationReport, ProjectError> {
        let (graph, plan) = self.prepare(&[service], Operation::Scale, false)?;
        self.provision_for(&graph, &plan).await?;

        self.scale_overrides
            .write()
            .await
            .insert(service.to_string(), count);

        info!("Scaling {} to {}", service, count);
        Ok(self
            .converge_plan(Operation::Scale, &graph, &plan, ConvergenceStrategy::Never, true, cancel)
            .await)
    }

    /// Containers of the selected services, sorted by name.
    pub async fn containers(
        &self,
        services: &[&str],
        include_stopped: bool,
    ) -> Result<Vec<Container>, ProjectError> {
        let selected: Vec<&str> = self
            .project
            .select(services)?
            .iter()
            .map(|s| s.name.as_str())
            .collect();

        let filter = LabelFilter::project(self.project.name());
        let mut containers = self
            .engine
            .list_containers(&filter, include_stopped)
            .await
            .map_err(|e| ProjectError::from_engine(self.project.name(), e))?;

        containers.retain(|c| {
            c.identity()
                .map(|identity| selected.contains(&identity.service.as_str()))
                .unwrap_or(false)
        });
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    /// Ensure every declared volume and network exists.
    pub async fn provision_resources(&self) -> Result<(), ProjectError> {
        let requirements = ResourceRequirements::all(&self.project);
        self.provisioner
            .provision(&self.project, &requirements)
            .await
    }

    /// Stop and remove the containers of the selected services. When the
    /// whole project is targeted and every service came down cleanly, the
    /// project networks are removed too, and with `remove_volumes` its
    /// non-external volumes.
    pub async fn down(
        &self,
        services: &[&str],
        remove_volumes: bool,
        cancel: &CancellationToken,
    ) -> Result<OperationReport, ProjectError> {
        let (_, plan) = self.prepare(services, Operation::Down, false)?;
        let timeout = self.settings.stop_timeout();
        let project = self.project.as_ref();
        let controller = &self.controller;

        let report = self
            .executor
            .execute(project.name(), Operation::Down, &plan, cancel, move |name| async move {
                controller.down_service(project, &name, timeout).await
            })
            .await;

        if !services.is_empty() {
            return Ok(report);
        }
        if !report.is_success() {
            warn!("Keeping project networks and volumes since not every service was removed");
            return Ok(report);
        }

        self.provisioner.remove_networks(project).await?;
        if remove_volumes {
            self.provisioner.remove_volumes(project).await?;
        }
        self.scale_overrides.write().await.clear();
        Ok(report)
    }

    /// The project's default network, if it exists.
    pub async fn default_network(&self) -> Result<Option<NetworkInfo>, ProjectError> {
        let name = self.project.default_network_name();
        self.engine
            .inspect_network(&name)
            .await
            .map_err(|e| ProjectError::from_engine(self.project.name(), e))
    }
}
