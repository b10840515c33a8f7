// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Stevedore Core
//!
//! Convergence and dependency-ordering engine for multi-container projects.
//!
//! # Architecture
//!
//! - **domain:** services, projects, containers, labels, the dependency
//!   graph and the pure convergence / scaling decisions
//! - **application:** resource provisioning, layered execution and the
//!   [`application::ProjectOrchestrator`] facade
//! - **infrastructure:** Docker and in-memory engines, event bus, manifest
//!   loader

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
