// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Convergence Planner
//!
//! Pure decision function from (service, strategy, existing containers,
//! desired scale) to a list of [`ContainerAction`]s. Engine calls happen in
//! the execution engine; nothing here blocks.

use crate::domain::container::Container;
use crate::domain::scaling;
use crate::domain::service::Service;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceStrategy {
    /// Recreate when the stored fingerprint differs from the service's.
    #[default]
    Changed,
    Always,
    Never,
}

impl ConvergenceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::Always => "always",
            Self::Never => "never",
        }
    }

    fn should_recreate(&self, container: &Container, fingerprint: &str) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Changed => container.fingerprint() != Some(fingerprint),
        }
    }
}

impl FromStr for ConvergenceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "changed" => Ok(Self::Changed),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(format!(
                "unknown convergence strategy '{}', expected changed, always or never",
                other
            )),
        }
    }
}

impl fmt::Display for ConvergenceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerAction {
    /// Leave the container in place; up-type operations still start it.
    Keep(Container),
    /// Replace the container, carrying its volumes forward.
    Recreate(Container),
    /// No container holds this ordinal yet.
    Create { ordinal: u32 },
    /// Surplus container beyond the desired scale.
    Remove(Container),
}

impl ContainerAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Keep(_) => "keep",
            Self::Recreate(_) => "recreate",
            Self::Create { .. } => "create",
            Self::Remove(_) => "remove",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergencePlan {
    pub service: String,
    /// Removals first (highest ordinal first), then keep / recreate by
    /// ordinal, then creations in ascending ordinal order.
    pub actions: Vec<ContainerAction>,
}

impl ConvergencePlan {
    pub fn count(&self, kind: &str) -> usize {
        self.actions.iter().filter(|a| a.kind() == kind).count()
    }

    /// True when executing the plan would not change any container.
    pub fn is_noop(&self) -> bool {
        self.actions
            .iter()
            .all(|a| matches!(a, ContainerAction::Keep(_)))
    }
}

/// Decide what to do with each container of `service`.
pub fn plan(
    service: &Service,
    strategy: ConvergenceStrategy,
    existing: Vec<Container>,
    desired_scale: u32,
) -> ConvergencePlan {
    let fingerprint = service.fingerprint();
    let decision = scaling::decide(existing, desired_scale);

    let mut actions: Vec<ContainerAction> = decision
        .remove
        .into_iter()
        .map(ContainerAction::Remove)
        .collect();

    for container in decision.retain {
        if strategy.should_recreate(&container, &fingerprint) {
            actions.push(ContainerAction::Recreate(container));
        } else {
            actions.push(ContainerAction::Keep(container));
        }
    }

    actions.extend(
        decision
            .create
            .into_iter()
            .map(|ordinal| ContainerAction::Create { ordinal }),
    );

    ConvergencePlan {
        service: service.name.clone(),
        actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::container::ContainerState;
    use crate::domain::labels;

    fn existing(service: &Service, ordinal: u32, fingerprint: &str) -> Container {
        Container {
            id: format!("{}{}", service.name, ordinal),
            name: format!("shop_{}_{}", service.name, ordinal),
            image: service.image.clone(),
            labels: labels::encode("shop", &service.name, ordinal, fingerprint, &service.labels),
            state: ContainerState::Exited,
            mounts: vec![],
            network_mode: None,
            log_config: None,
        }
    }

    #[test]
    fn test_changed_strategy_recreates_only_on_drift() {
        let service = Service::new("web", "nginx");
        let current = existing(&service, 1, &service.fingerprint());
        let stale = existing(&service, 2, "stale");

        let plan = plan(&service, ConvergenceStrategy::Changed, vec![current, stale], 2);

        assert_eq!(plan.actions[0].kind(), "keep");
        assert_eq!(plan.actions[1].kind(), "recreate");
        assert!(!plan.is_noop());
    }

    #[test]
    fn test_never_strategy_keeps_drifted_containers() {
        let service = Service::new("web", "nginx");
        let plan = plan(
            &service,
            ConvergenceStrategy::Never,
            vec![existing(&service, 1, "stale")],
            1,
        );
        assert!(plan.is_noop());
    }

    #[test]
    fn test_always_strategy_recreates_matching_containers() {
        let service = Service::new("web", "nginx");
        let plan = plan(
            &service,
            ConvergenceStrategy::Always,
            vec![existing(&service, 1, &service.fingerprint())],
            1,
        );
        assert_eq!(plan.count("recreate"), 1);
    }

    #[test]
    fn test_no_containers_means_create() {
        let service = Service::new("web", "nginx");
        let plan = plan(&service, ConvergenceStrategy::Changed, vec![], 2);
        assert_eq!(
            plan.actions,
            vec![
                ContainerAction::Create { ordinal: 1 },
                ContainerAction::Create { ordinal: 2 }
            ]
        );
    }

    #[test]
    fn test_surplus_removed_before_other_actions() {
        let service = Service::new("web", "nginx");
        let fingerprint = service.fingerprint();
        let plan = plan(
            &service,
            ConvergenceStrategy::Changed,
            vec![
                existing(&service, 1, &fingerprint),
                existing(&service, 2, &fingerprint),
            ],
            1,
        );
        assert_eq!(plan.actions.len(), 2);
        assert!(matches!(&plan.actions[0], ContainerAction::Remove(c) if c.ordinal() == Some(2)));
        assert!(matches!(&plan.actions[1], ContainerAction::Keep(c) if c.ordinal() == Some(1)));
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("never".parse::<ConvergenceStrategy>(), Ok(ConvergenceStrategy::Never));
        assert!("sometimes".parse::<ConvergenceStrategy>().is_err());
        assert_eq!(ConvergenceStrategy::default(), ConvergenceStrategy::Changed);
    }
}
