// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod executor;
pub mod orchestrator;
pub mod provisioner;
pub mod service_controller;

// Re-export use cases for convenience
pub use executor::{
    ChangeAction, ContainerChange, LayeredExecutor, OperationReport, ServiceOutcome,
    ServiceResult, ServiceSummary,
};
pub use orchestrator::{ProjectOrchestrator, UpOptions};
pub use provisioner::{ResourceProvisioner, ResourceRequirements, StandardResourceProvisioner};
pub use service_controller::{ConvergeOptions, ServiceController};
