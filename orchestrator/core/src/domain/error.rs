// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Project error taxonomy.
//!
//! Pre-flight errors (`Configuration`, `DependencyCycle`, `NoSuchService`) abort
//! an operation before any mutating engine call. The remaining variants are
//! reported per service inside an [`crate::application::executor::OperationReport`].

use crate::domain::engine::EngineError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectError {
    /// Invalid or conflicting declaration, e.g. a named volume whose driver
    /// differs from the one already present in the engine.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Circular dependency between services: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Service '{service}' was not attempted because its dependency '{dependency}' failed: {cause}")]
    DependencyFailed {
        service: String,
        dependency: String,
        cause: Box<ProjectError>,
    },

    /// An engine call failed.
    #[error("Operation failed for service '{service}': {message}")]
    OperationFailed { service: String, message: String },

    /// A referenced container or external resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No such service: {0}")]
    NoSuchService(String),
}

impl ProjectError {
    pub fn operation_failed(service: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            service: service.into(),
            message: error.to_string(),
        }
    }

    /// Map an engine error raised while working on `service`. Missing
    /// referenced objects surface as `NotFound`, everything else as
    /// `OperationFailed`.
    pub fn from_engine(service: &str, error: EngineError) -> Self {
        match error {
            EngineError::NotFound(what) => Self::NotFound(what),
            other => Self::operation_failed(service, other),
        }
    }

    /// Short machine-friendly kind, used for metrics labels and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::DependencyCycle(_) => "dependency_cycle",
            Self::DependencyFailed { .. } => "dependency_failed",
            Self::OperationFailed { .. } => "operation_failed",
            Self::NotFound(_) => "not_found",
            Self::NoSuchService(_) => "no_such_service",
        }
    }

    /// Whether this error class is detected before touching the engine.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::DependencyCycle(_) | Self::NoSuchService(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = ProjectError::DependencyCycle(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(err.to_string(), "Circular dependency between services: a -> b -> a");
        assert!(err.is_preflight());
    }

    #[test]
    fn test_dependency_failed_carries_cause() {
        let cause = ProjectError::operation_failed("db", "port already allocated");
        let err = ProjectError::DependencyFailed {
            service: "web".to_string(),
            dependency: "db".to_string(),
            cause: Box::new(cause),
        };
        let message = err.to_string();
        assert!(message.contains("'web'"));
        assert!(message.contains("port already allocated"));
        assert_eq!(err.kind(), "dependency_failed");
    }

    #[test]
    fn test_engine_not_found_maps_to_not_found() {
        let err = ProjectError::from_engine("db", EngineError::NotFound("container x".to_string()));
        assert_eq!(err, ProjectError::NotFound("container x".to_string()));

        let err = ProjectError::from_engine("db", EngineError::Api("boom".to_string()));
        assert_eq!(err.kind(), "operation_failed");
    }
}
