// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Outbound agent commands and inbound agent events.
//!
//! The controller talks to compute and network agents through a
//! fire-and-forget command protocol: commands are sent, and results or
//! errors arrive later as events correlated by subject identifier. The
//! payloads here are wire-agnostic; the transport behind `CommandSender`
//! owns the encoding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::instance::{InstanceId, NodeId};
use crate::domain::tenant::TenantId;
use crate::domain::volume::VolumeId;
use crate::domain::workload::LaunchConfig;

/// Command discriminant, used to correlate a result event with the most
/// recent command issued for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Stop,
    Restart,
    Delete,
    Evacuate,
    AttachVolume,
    DetachVolume,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Delete => "delete",
            Self::Evacuate => "evacuate",
            Self::AttachVolume => "attach_volume",
            Self::DetachVolume => "detach_volume",
        };
        write!(f, "{s}")
    }
}

/// A command dispatched to an agent node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AgentCommand {
    /// Launch an instance. Concentrator launches carry no launch config
    /// and are routed to network-agent-capable nodes.
    Start {
        instance_id: InstanceId,
        tenant_id: TenantId,
        concentrator: bool,
        config: Option<LaunchConfig>,
    },
    Stop {
        instance_id: InstanceId,
        node_id: NodeId,
    },
    Restart {
        instance_id: InstanceId,
        node_id: NodeId,
    },
    Delete {
        instance_id: InstanceId,
        node_id: NodeId,
    },
    Evacuate {
        node_id: NodeId,
    },
    AttachVolume {
        volume_id: VolumeId,
        instance_id: InstanceId,
        node_id: NodeId,
    },
    DetachVolume {
        volume_id: VolumeId,
        instance_id: InstanceId,
        node_id: NodeId,
    },
}

impl AgentCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Start { .. } => CommandKind::Start,
            Self::Stop { .. } => CommandKind::Stop,
            Self::Restart { .. } => CommandKind::Restart,
            Self::Delete { .. } => CommandKind::Delete,
            Self::Evacuate { .. } => CommandKind::Evacuate,
            Self::AttachVolume { .. } => CommandKind::AttachVolume,
            Self::DetachVolume { .. } => CommandKind::DetachVolume,
        }
    }

    /// The identifier a later result or error event will carry.
    pub fn subject(&self) -> Uuid {
        match self {
            Self::Start { instance_id, .. }
            | Self::Stop { instance_id, .. }
            | Self::Restart { instance_id, .. }
            | Self::Delete { instance_id, .. } => instance_id.0,
            Self::Evacuate { node_id } => node_id.0,
            Self::AttachVolume { volume_id, .. } | Self::DetachVolume { volume_id, .. } => {
                volume_id.0
            }
        }
    }
}

/// An asynchronous result or error event reported by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    StartSuccess {
        instance_id: InstanceId,
        node_id: NodeId,
        mac_address: String,
        ip_address: String,
    },
    StartFailure {
        instance_id: InstanceId,
        reason: String,
    },
    StopFailure {
        instance_id: InstanceId,
        reason: String,
    },
    RestartFailure {
        instance_id: InstanceId,
        reason: String,
    },
    InstanceDeleted {
        instance_id: InstanceId,
    },
    AttachVolumeSuccess {
        volume_id: VolumeId,
        instance_id: InstanceId,
    },
    AttachVolumeFailure {
        volume_id: VolumeId,
        instance_id: InstanceId,
        reason: String,
    },
    DetachVolumeSuccess {
        volume_id: VolumeId,
    },
    DetachVolumeFailure {
        volume_id: VolumeId,
        reason: String,
    },
    ConcentratorInstanceAdded {
        instance_id: InstanceId,
        tenant_id: TenantId,
        ip_address: String,
        mac_address: String,
    },
}

/// Transport seam the orchestration core dispatches commands through.
///
/// Implementations own delivery and encoding; a returned error means the
/// command never left the controller, not that the agent rejected it.
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send(&self, command: AgentCommand) -> Result<(), TransportError>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}
