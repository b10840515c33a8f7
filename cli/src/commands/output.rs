// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal rendering for operation reports, live progress and container
//! listings.

use anyhow::{anyhow, Result};
use colored::Colorize;
use tokio::task::JoinHandle;

use stevedore_core::application::{ChangeAction, OperationReport, ServiceOutcome};
use stevedore_core::domain::container::{Container, ContainerState};
use stevedore_core::domain::events::{ContainerEvent, ResourceEvent};
use stevedore_core::infrastructure::{EventBus, EventBusError, ProjectEvent};

/// Print container and resource transitions as they happen. The returned
/// task runs until aborted or the bus closes.
pub fn spawn_progress(event_bus: &EventBus) -> JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(line) = progress_line(&event) {
                        println!("{}", line);
                    }
                }
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    })
}

fn progress_line(event: &ProjectEvent) -> Option<String> {
    let line = match event {
        ProjectEvent::Container(event) => match event {
            ContainerEvent::ContainerCreated { container, .. } => {
                format!("{} {}", "Created".green(), container)
            }
            ContainerEvent::ContainerStarted { container, .. } => {
                format!("{} {}", "Started".green(), container)
            }
            ContainerEvent::ContainerStopped { container, .. } => {
                format!("{} {}", "Stopped".yellow(), container)
            }
            ContainerEvent::ContainerPaused { container, .. } => {
                format!("{} {}", "Paused".yellow(), container)
            }
            ContainerEvent::ContainerUnpaused { container, .. } => {
                format!("{} {}", "Unpaused".green(), container)
            }
            ContainerEvent::ContainerKilled {
                container, signal, ..
            } => format!("{} {} ({})", "Killed".red(), container, signal),
            ContainerEvent::ContainerRenamed { from, to, .. } => {
                format!("{} {} -> {}", "Renamed".dimmed(), from, to)
            }
            ContainerEvent::ContainerRemoved { container, .. } => {
                format!("{} {}", "Removed".yellow(), container)
            }
        },
        ProjectEvent::Resource(event) => match event {
            ResourceEvent::VolumeCreated { volume, driver, .. } => {
                format!("{} volume {} ({})", "Created".green(), volume, driver)
            }
            ResourceEvent::VolumeRemoved { volume, .. } => {
                format!("{} volume {}", "Removed".yellow(), volume)
            }
            ResourceEvent::NetworkCreated { network, driver, .. } => {
                format!("{} network {} ({})", "Created".green(), network, driver)
            }
            ResourceEvent::NetworkRemoved { network, .. } => {
                format!("{} network {}", "Removed".yellow(), network)
            }
        },
        ProjectEvent::Service(_) => return None,
    };
    Some(line)
}

/// Print the per-service summary of an operation and turn any failure into
/// an error so the process exits non-zero.
pub fn finish(report: &OperationReport) -> Result<()> {
    println!();
    for result in &report.results {
        match &result.outcome {
            ServiceOutcome::Completed(summary) => {
                if summary.changes.is_empty() {
                    println!("  {} {} {}", "✓".green(), result.service.bold(), "up-to-date".dimmed());
                } else {
                    println!(
                        "  {} {} {}",
                        "✓".green(),
                        result.service.bold(),
                        describe_changes(summary.changes.iter().map(|c| c.action)).dimmed()
                    );
                }
                for skipped in &summary.skipped {
                    println!("      {} {}", "skipped".dimmed(), skipped);
                }
            }
            ServiceOutcome::Failed(err) => {
                println!("  {} {} {}", "✗".red(), result.service.bold(), err.to_string().red());
            }
            ServiceOutcome::Cancelled => {
                println!("  {} {} {}", "-".yellow(), result.service.bold(), "cancelled".yellow());
            }
        }
    }

    let failed = report.failures().count();
    let cancelled = report.cancelled().count();
    if failed == 0 && cancelled == 0 {
        println!();
        println!(
            "{}",
            format!("✓ {} completed for project '{}'", report.operation, report.project).green()
        );
        return Ok(());
    }

    Err(anyhow!(
        "{} failed for project '{}': {} service(s) failed, {} cancelled",
        report.operation,
        report.project,
        failed,
        cancelled
    ))
}

fn describe_changes(actions: impl Iterator<Item = ChangeAction>) -> String {
    let mut counts: Vec<(ChangeAction, usize)> = Vec::new();
    for action in actions {
        match counts.iter_mut().find(|(a, _)| *a == action) {
            Some((_, n)) => *n += 1,
            None => counts.push((action, 1)),
        }
    }
    counts
        .into_iter()
        .map(|(action, n)| format!("{} {}", n, action))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_containers(containers: &[Container], quiet: bool) {
    if quiet {
        for container in containers {
            println!("{}", container.id);
        }
        return;
    }

    if containers.is_empty() {
        println!("{}", "No containers found".dimmed());
        return;
    }

    println!(
        "{:<32} {:<16} {:<12} {:<12} {}",
        "NAME".bold(),
        "SERVICE".bold(),
        "STATE".bold(),
        "ID".bold(),
        "IMAGE".bold()
    );
    for container in containers {
        let state = match container.state {
            ContainerState::Running => container.state.as_str().green(),
            ContainerState::Paused | ContainerState::Restarting => container.state.as_str().yellow(),
            ContainerState::Created => container.state.as_str().normal(),
            ContainerState::Exited | ContainerState::Dead => container.state.as_str().red(),
        };
        println!(
            "{:<32} {:<16} {:<12} {:<12} {}",
            container.name,
            container.service().unwrap_or("-"),
            state,
            container.short_id(),
            container.image
        );
    }
}
