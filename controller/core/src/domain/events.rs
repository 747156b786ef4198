// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Event log records and lifecycle events published on the event bus.
//!
//! Asynchronous failures have no synchronous caller left to report to;
//! the append-only `LogEntry` stream is their only user-visible trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::instance::{InstanceId, NodeId};
use crate::domain::tenant::TenantId;
use crate::domain::volume::{AttachmentId, VolumeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEventType {
    Info,
    Error,
    Trace,
}

impl std::fmt::Display for LogEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Error => "error",
            Self::Trace => "trace",
        };
        write!(f, "{s}")
    }
}

/// Append-only event log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub tenant_id: TenantId,
    pub event_type: LogEventType,
    pub message: String,
}

impl LogEntry {
    pub fn new(tenant_id: TenantId, event_type: LogEventType, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            tenant_id,
            event_type,
            message: message.into(),
        }
    }

    pub fn error(tenant_id: TenantId, message: impl Into<String>) -> Self {
        Self::new(tenant_id, LogEventType::Error, message)
    }

    pub fn info(tenant_id: TenantId, message: impl Into<String>) -> Self {
        Self::new(tenant_id, LogEventType::Info, message)
    }
}

/// Instance lifecycle events published for observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InstanceEvent {
    InstanceLaunched {
        instance_id: InstanceId,
        tenant_id: TenantId,
        launched_at: DateTime<Utc>,
    },
    InstanceRunning {
        instance_id: InstanceId,
        node_id: NodeId,
        running_at: DateTime<Utc>,
    },
    InstanceStartFailed {
        instance_id: InstanceId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    InstanceDeleted {
        instance_id: InstanceId,
        tenant_id: TenantId,
        deleted_at: DateTime<Utc>,
    },
}

/// Volume lifecycle events published for observers. The subscribe path is
/// how callers observe the final state of an attach or detach that
/// returned before the agent responded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VolumeEvent {
    VolumeCreated {
        volume_id: VolumeId,
        tenant_id: TenantId,
        size_gb: i64,
        created_at: DateTime<Utc>,
    },
    VolumeAttached {
        volume_id: VolumeId,
        instance_id: InstanceId,
        attachment_id: AttachmentId,
        attached_at: DateTime<Utc>,
    },
    VolumeAttachFailed {
        volume_id: VolumeId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    VolumeDetached {
        volume_id: VolumeId,
        detached_at: DateTime<Utc>,
    },
    VolumeDetachFailed {
        volume_id: VolumeId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    VolumeDeleted {
        volume_id: VolumeId,
        deleted_at: DateTime<Utc>,
    },
}

/// Concentrator bootstrap events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConcentratorEvent {
    ConcentratorLaunched {
        instance_id: InstanceId,
        tenant_id: TenantId,
        launched_at: DateTime<Utc>,
    },
    ConcentratorReady {
        instance_id: InstanceId,
        tenant_id: TenantId,
        ip_address: String,
        ready_at: DateTime<Utc>,
    },
}
