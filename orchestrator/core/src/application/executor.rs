// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Execution Engine
//!
//! Walks an [`ExecutionPlan`] one layer at a time. Services inside a layer run
//! concurrently, bounded by the configured parallelism. A service whose
//! dependency (in walk direction) failed is not attempted and reports
//! `DependencyFailed`; independent branches keep going. Every planned service
//! ends up with exactly one [`ServiceOutcome`].

use crate::domain::error::ProjectError;
use crate::domain::events::ServiceEvent;
use crate::domain::graph::ExecutionPlan;
use crate::domain::operation::Operation;
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// Reporting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Recreated,
    Started,
    Stopped,
    Paused,
    Unpaused,
    Killed,
    Removed,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Recreated => "recreated",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Paused => "paused",
            Self::Unpaused => "unpaused",
            Self::Killed => "killed",
            Self::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// One container-level change made while operating on a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerChange {
    pub container: String,
    pub id: String,
    pub action: ChangeAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceSummary {
    pub changes: Vec<ContainerChange>,
    /// Containers deliberately left alone, e.g. running containers during
    /// `remove_stopped`.
    pub skipped: Vec<String>,
}

impl ServiceSummary {
    pub fn record(&mut self, container: &str, id: &str, action: ChangeAction) {
        self.changes.push(ContainerChange {
            container: container.to_string(),
            id: id.to_string(),
            action,
        });
    }

    pub fn skip(&mut self, container: &str) {
        self.skipped.push(container.to_string());
    }

    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    Completed(ServiceSummary),
    Failed(ProjectError),
    /// Not dispatched because cancellation was requested first.
    Cancelled,
}

impl ServiceOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResult {
    pub service: String,
    pub outcome: ServiceOutcome,
}

/// Aggregate result of a project-wide operation, one entry per targeted
/// service in plan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    pub project: String,
    pub operation: Operation,
    pub results: Vec<ServiceResult>,
}

impl OperationReport {
    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.outcome, ServiceOutcome::Completed(_)))
    }

    pub fn outcome(&self, service: &str) -> Option<&ServiceOutcome> {
        self.results
            .iter()
            .find(|r| r.service == service)
            .map(|r| &r.outcome)
    }

    pub fn summary(&self, service: &str) -> Option<&ServiceSummary> {
        match self.outcome(service) {
            Some(ServiceOutcome::Completed(summary)) => Some(summary),
            _ => None,
        }
    }

    pub fn error(&self, service: &str) -> Option<&ProjectError> {
        match self.outcome(service) {
            Some(ServiceOutcome::Failed(error)) => Some(error),
            _ => None,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ProjectError)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            ServiceOutcome::Failed(error) => Some((r.service.as_str(), error)),
            _ => None,
        })
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|r| r.outcome == ServiceOutcome::Cancelled)
            .map(|r| r.service.as_str())
    }

    /// All container changes across services, in plan order.
    pub fn changes(&self) -> impl Iterator<Item = (&str, &ContainerChange)> {
        self.results.iter().flat_map(|r| {
            let changes: &[ContainerChange] = match &r.outcome {
                ServiceOutcome::Completed(summary) => &summary.changes,
                _ => &[],
            };
            changes.iter().map(move |c| (r.service.as_str(), c))
        })
    }
}

// ============================================================================
// Layered Executor
// ============================================================================

pub struct LayeredExecutor {
    parallelism: usize,
    event_bus: Arc<EventBus>,
}

impl LayeredExecutor {
    pub fn new(parallelism: usize, event_bus: Arc<EventBus>) -> Self {
        Self {
            parallelism: parallelism.max(1),
            event_bus,
        }
    }

    /// Run `task` for every service of `plan`.
    ///
    /// Cancellation is observed when a service is about to be dispatched;
    /// a task already running is allowed to finish.
    pub async fn execute<F, Fut>(
        &self,
        project: &str,
        operation: Operation,
        plan: &ExecutionPlan,
        cancel: &CancellationToken,
        task: F,
    ) -> OperationReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<ServiceSummary, ProjectError>>,
    {
        let mut outcomes: HashMap<String, ServiceOutcome> = HashMap::new();

        for (depth, layer) in plan.layers().iter().enumerate() {
            let mut runnable = Vec::new();

            for service in layer {
                match blocked_outcome(service, plan.blockers(service), &outcomes) {
                    Some(outcome) => {
                        outcomes.insert(service.clone(), outcome);
                    }
                    None => runnable.push(service.clone()),
                }
            }

            debug!(
                "Layer {} of {} ({}): dispatching {:?}",
                depth + 1,
                plan.layers().len(),
                operation,
                runnable
            );

            let task = &task;
            let finished: Vec<(String, ServiceOutcome)> = stream::iter(runnable)
                .map(move |service| async move {
                    if cancel.is_cancelled() {
                        return (service, ServiceOutcome::Cancelled);
                    }
                    let outcome = match task(service.clone()).await {
                        Ok(summary) => ServiceOutcome::Completed(summary),
                        Err(error) => ServiceOutcome::Failed(error),
                    };
                    (service, outcome)
                })
                .buffer_unordered(self.parallelism)
                .collect()
                .await;

            for (service, outcome) in finished {
                outcomes.insert(service, outcome);
            }
        }

        let results: Vec<ServiceResult> = plan
            .services()
            .map(|service| ServiceResult {
                service: service.to_string(),
                outcome: outcomes
                    .remove(service)
                    .unwrap_or(ServiceOutcome::Cancelled),
            })
            .collect();

        for result in &results {
            self.report(project, operation, result);
        }

        OperationReport {
            project: project.to_string(),
            operation,
            results,
        }
    }

    fn report(&self, project: &str, operation: Operation, result: &ServiceResult) {
        metrics::counter!(
            "stevedore_service_operations_total",
            "operation" => operation.as_str(),
            "outcome" => result.outcome.as_str()
        )
        .increment(1);

        let event = match &result.outcome {
            ServiceOutcome::Completed(summary) => {
                info!(
                    "{} {}: {} change(s)",
                    operation,
                    result.service,
                    summary.changes.len()
                );
                ServiceEvent::ServiceCompleted {
                    project: project.to_string(),
                    service: result.service.clone(),
                    operation,
                    completed_at: Utc::now(),
                }
            }
            ServiceOutcome::Failed(error) => {
                error!("{} {} failed: {}", operation, result.service, error);
                ServiceEvent::ServiceFailed {
                    project: project.to_string(),
                    service: result.service.clone(),
                    operation,
                    error: error.to_string(),
                    failed_at: Utc::now(),
                }
            }
            ServiceOutcome::Cancelled => {
                warn!("{} {} cancelled before dispatch", operation, result.service);
                ServiceEvent::ServiceCancelled {
                    project: project.to_string(),
                    service: result.service.clone(),
                    operation,
                    cancelled_at: Utc::now(),
                }
            }
        };
        self.event_bus.publish_service_event(event);
    }
}

/// Outcome for a service that must not run because a blocker did not
/// complete. A failure wins over a cancellation.
fn blocked_outcome(
    service: &str,
    blockers: &[String],
    outcomes: &HashMap<String, ServiceOutcome>,
) -> Option<ServiceOutcome> {
    let mut cancelled = false;
    for blocker in blockers {
        match outcomes.get(blocker) {
            Some(ServiceOutcome::Failed(cause)) => {
                return Some(ServiceOutcome::Failed(ProjectError::DependencyFailed {
                    service: service.to_string(),
                    dependency: blocker.clone(),
                    cause: Box::new(cause.clone()),
                }));
            }
            Some(ServiceOutcome::Cancelled) => cancelled = true,
            _ => {}
        }
    }
    cancelled.then_some(ServiceOutcome::Cancelled)
}
