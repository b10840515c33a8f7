// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Project model, pure planning logic and the container engine port.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Everything that does not talk to an engine

pub mod config;
pub mod container;
pub mod convergence;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod labels;
pub mod operation;
pub mod project;
pub mod scaling;
pub mod service;
