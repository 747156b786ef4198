// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! In-memory pub/sub for lifecycle events, built on tokio broadcast
//! channels. Attach/detach and start operations return before the agent
//! answers; subscribing here is how observers see the eventual outcome.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::{ConcentratorEvent, InstanceEvent, VolumeEvent};

/// Unified event type for the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterEvent {
    Instance(InstanceEvent),
    Volume(VolumeEvent),
    Concentrator(ConcentratorEvent),
}

/// Event bus for publishing and subscribing to cluster events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ClusterEvent>>,
}

impl EventBus {
    /// Create a bus with the given channel capacity; old events are
    /// dropped for lagging receivers once the buffer fills.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_instance_event(&self, event: InstanceEvent) {
        self.publish(ClusterEvent::Instance(event));
    }

    pub fn publish_volume_event(&self, event: VolumeEvent) {
        self.publish(ClusterEvent::Volume(event));
    }

    pub fn publish_concentrator_event(&self, event: ConcentratorEvent) {
        self.publish(ClusterEvent::Concentrator(event));
    }

    fn publish(&self, event: ClusterEvent) {
        debug!(?event, "publishing cluster event");
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("no subscribers listening");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for cluster events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<ClusterEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<ClusterEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<ClusterEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event bus is closed")]
    Closed,

    #[error("no events available")]
    Empty,

    #[error("receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instance::InstanceId;
    use crate::domain::tenant::TenantId;
    use chrono::Utc;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let instance_id = InstanceId::new();
        bus.publish_instance_event(InstanceEvent::InstanceLaunched {
            instance_id,
            tenant_id: TenantId::new(),
            launched_at: Utc::now(),
        });

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                ClusterEvent::Instance(InstanceEvent::InstanceLaunched {
                    instance_id: id,
                    ..
                }) => assert_eq!(id, instance_id),
                other => panic!("wrong event received: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn try_recv_on_empty_bus() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert!(matches!(rx.try_recv(), Err(EventBusError::Empty)));
    }
}
