// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod docker;
pub mod event_bus;
pub mod manifest;
pub mod memory;

pub use docker::DockerEngine;
pub use event_bus::{EventBus, EventBusError, EventReceiver, ProjectEvent};
pub use manifest::{ProjectManifest, ProjectManifestParser};
pub use memory::{EngineCall, InMemoryEngine};
