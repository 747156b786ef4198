// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Instance aggregate and its lifecycle state machine.
//!
//! `pending → running → exiting`; the terminal "deleted" state is absence
//! from the store, not a stored tag. An instance has no node until a
//! compute agent accepts the workload, and operations that must address a
//! node fail on an unassigned instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::tenant::TenantId;
use crate::domain::workload::WorkloadId;

/// Unique identifier for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an agent node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stored lifecycle states of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Persisted, START dispatched, no agent confirmation yet.
    Pending,
    /// A compute agent accepted the workload.
    Running,
    /// DELETE dispatched, awaiting the InstanceDeleted event.
    Exiting,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Exiting => "exiting",
        };
        write!(f, "{s}")
    }
}

/// Instance aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub tenant_id: TenantId,
    pub workload_id: WorkloadId,
    pub state: InstanceState,
    pub node_id: Option<NodeId>,
    pub mac_address: String,
    pub ip_address: String,
    pub ssh_ip: String,
    pub ssh_port: i32,
    pub create_time: DateTime<Utc>,
}

impl Instance {
    pub fn new(tenant_id: TenantId, workload_id: WorkloadId) -> Self {
        Self {
            id: InstanceId::new(),
            tenant_id,
            workload_id,
            state: InstanceState::Pending,
            node_id: None,
            mac_address: String::new(),
            ip_address: String::new(),
            ssh_ip: String::new(),
            ssh_port: 0,
            create_time: Utc::now(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.node_id.is_some()
    }

    /// A compute agent accepted the workload: record its placement.
    pub fn mark_running(
        &mut self,
        node_id: NodeId,
        mac_address: String,
        ip_address: String,
    ) -> Result<(), InstanceError> {
        if self.state != InstanceState::Pending {
            return Err(InstanceError::InvalidStateTransition {
                from: self.state,
                to: InstanceState::Running,
            });
        }
        self.state = InstanceState::Running;
        self.node_id = Some(node_id);
        self.mac_address = mac_address;
        self.ip_address = ip_address;
        Ok(())
    }

    /// DELETE was dispatched to the owning node.
    pub fn mark_exiting(&mut self) -> Result<(), InstanceError> {
        if self.state == InstanceState::Exiting {
            return Err(InstanceError::InvalidStateTransition {
                from: self.state,
                to: InstanceState::Exiting,
            });
        }
        self.state = InstanceState::Exiting;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("invalid instance state transition from {from} to {to}")]
    InvalidStateTransition {
        from: InstanceState,
        to: InstanceState,
    },
}
