// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::operation::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container lifecycle transitions performed by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContainerEvent {
    ContainerCreated {
        project: String,
        service: String,
        container: String,
        container_id: String,
        created_at: DateTime<Utc>,
    },
    ContainerStarted {
        project: String,
        service: String,
        container: String,
        started_at: DateTime<Utc>,
    },
    ContainerStopped {
        project: String,
        service: String,
        container: String,
        stopped_at: DateTime<Utc>,
    },
    ContainerPaused {
        project: String,
        service: String,
        container: String,
        paused_at: DateTime<Utc>,
    },
    ContainerUnpaused {
        project: String,
        service: String,
        container: String,
        unpaused_at: DateTime<Utc>,
    },
    ContainerKilled {
        project: String,
        service: String,
        container: String,
        signal: String,
        killed_at: DateTime<Utc>,
    },
    ContainerRenamed {
        project: String,
        service: String,
        from: String,
        to: String,
        renamed_at: DateTime<Utc>,
    },
    ContainerRemoved {
        project: String,
        service: String,
        container: String,
        removed_at: DateTime<Utc>,
    },
}

impl ContainerEvent {
    pub fn service(&self) -> &str {
        match self {
            Self::ContainerCreated { service, .. }
            | Self::ContainerStarted { service, .. }
            | Self::ContainerStopped { service, .. }
            | Self::ContainerPaused { service, .. }
            | Self::ContainerUnpaused { service, .. }
            | Self::ContainerKilled { service, .. }
            | Self::ContainerRenamed { service, .. }
            | Self::ContainerRemoved { service, .. } => service,
        }
    }
}

/// Named volume / network provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResourceEvent {
    VolumeCreated {
        project: String,
        volume: String,
        driver: String,
        created_at: DateTime<Utc>,
    },
    VolumeRemoved {
        project: String,
        volume: String,
        removed_at: DateTime<Utc>,
    },
    NetworkCreated {
        project: String,
        network: String,
        driver: String,
        created_at: DateTime<Utc>,
    },
    NetworkRemoved {
        project: String,
        network: String,
        removed_at: DateTime<Utc>,
    },
}

/// Per-service outcome of a project-wide operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceEvent {
    ServiceCompleted {
        project: String,
        service: String,
        operation: Operation,
        completed_at: DateTime<Utc>,
    },
    ServiceFailed {
        project: String,
        service: String,
        operation: Operation,
        error: String,
        failed_at: DateTime<Utc>,
    },
    ServiceCancelled {
        project: String,
        service: String,
        operation: Operation,
        cancelled_at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_event_serialization() {
        let event = ContainerEvent::ContainerKilled {
            project: "shop".to_string(),
            service: "web".to_string(),
            container: "shop_web_1".to_string(),
            signal: "SIGINT".to_string(),
            killed_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ContainerKilled"));
        assert_eq!(event.service(), "web");
    }

    #[test]
    fn test_service_failed_round_trip() {
        let event = ServiceEvent::ServiceFailed {
            project: "shop".to_string(),
            service: "db".to_string(),
            operation: Operation::Up,
            error: "port already allocated".to_string(),
            failed_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: ServiceEvent = serde_json::from_str(&json).unwrap();
        if let ServiceEvent::ServiceFailed { operation, .. } = deserialized {
            assert_eq!(operation, Operation::Up);
        } else {
            panic!("unexpected variant");
        }
    }
}
