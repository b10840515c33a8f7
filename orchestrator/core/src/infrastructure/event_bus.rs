// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Project Events
//
// In-memory event streaming over a tokio broadcast channel. The CLI
// subscribes to render progress; publishing never blocks an operation.

use crate::domain::events::{ContainerEvent, ResourceEvent, ServiceEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjectEvent {
    Container(ContainerEvent),
    Resource(ResourceEvent),
    Service(ServiceEvent),
}

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ProjectEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity.
    /// Slow subscribers lose the oldest events once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_container_event(&self, event: ContainerEvent) {
        self.publish(ProjectEvent::Container(event));
    }

    pub fn publish_resource_event(&self, event: ResourceEvent) {
        self.publish(ProjectEvent::Resource(event));
    }

    pub fn publish_service_event(&self, event: ServiceEvent) {
        self.publish(ProjectEvent::Service(event));
    }

    fn publish(&self, event: ProjectEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to container events of a single service
    pub fn subscribe_service(&self, service: impl Into<String>) -> ServiceEventReceiver {
        ServiceEventReceiver {
            receiver: self.sender.subscribe(),
            service: service.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<ProjectEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<ProjectEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<ProjectEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to the container events of one service
pub struct ServiceEventReceiver {
    receiver: broadcast::Receiver<ProjectEvent>,
    service: String,
}

impl ServiceEventReceiver {
    pub async fn recv(&mut self) -> Result<ContainerEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;

            if let ProjectEvent::Container(container_event) = event {
                if container_event.service() == self.service {
                    return Ok(container_event);
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
