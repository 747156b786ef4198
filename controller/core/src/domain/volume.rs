// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Block device aggregate and the attachment state machine.
//!
//! `available → attaching → in_use → detaching → available`. An attach is
//! only committed once the agent confirms the device is usable, while a
//! detach is observable the moment it is dispatched; the asymmetric commit
//! points keep a second attach/detach from racing the same volume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::instance::InstanceId;
use crate::domain::tenant::TenantId;

/// Unique identifier for a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeId(pub Uuid);

impl VolumeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for VolumeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a storage attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentId(pub Uuid);

impl AttachmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttachmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Block device lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    /// Ok for attaching.
    Available,
    /// Attach dispatched, not yet confirmed by the agent.
    Attaching,
    /// Successfully attached to an instance.
    InUse,
    /// Detach dispatched, not yet confirmed by the agent.
    Detaching,
}

impl BlockState {
    pub fn can_attach(&self) -> bool {
        matches!(self, Self::Available)
    }

    pub fn can_detach(&self) -> bool {
        matches!(self, Self::InUse)
    }

    pub fn can_delete(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl std::fmt::Display for BlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::Attaching => "attaching",
            Self::InUse => "in_use",
            Self::Detaching => "detaching",
        };
        write!(f, "{s}")
    }
}

/// Block device aggregate root. One volume belongs to exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockData {
    pub id: VolumeId,
    pub tenant_id: TenantId,
    pub size_gb: i64,
    pub state: BlockState,
    pub name: String,
    pub description: String,
    pub bootable: bool,
    pub create_time: DateTime<Utc>,
}

impl BlockData {
    pub fn new(
        tenant_id: TenantId,
        size_gb: i64,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, VolumeError> {
        if size_gb <= 0 {
            return Err(VolumeError::InvalidSize(size_gb));
        }
        Ok(Self {
            id: VolumeId::new(),
            tenant_id,
            size_gb,
            state: BlockState::Available,
            name: name.into(),
            description: description.into(),
            bootable: false,
            create_time: Utc::now(),
        })
    }

    /// Attach dispatched; commit happens later on the agent's confirmation.
    pub fn mark_attaching(&mut self) -> Result<(), VolumeError> {
        if !self.state.can_attach() {
            return Err(VolumeError::InvalidStateTransition {
                from: self.state,
                to: BlockState::Attaching,
            });
        }
        self.state = BlockState::Attaching;
        Ok(())
    }

    /// Agent confirmed the device is usable (attach success), or a detach
    /// failed and the volume is still attached (rollback).
    pub fn mark_in_use(&mut self) -> Result<(), VolumeError> {
        match self.state {
            BlockState::Attaching | BlockState::Detaching => {
                self.state = BlockState::InUse;
                Ok(())
            }
            from => Err(VolumeError::InvalidStateTransition {
                from,
                to: BlockState::InUse,
            }),
        }
    }

    /// Detach is observable immediately, before the agent confirms.
    pub fn mark_detaching(&mut self) -> Result<(), VolumeError> {
        if !self.state.can_detach() {
            return Err(VolumeError::InvalidStateTransition {
                from: self.state,
                to: BlockState::Detaching,
            });
        }
        self.state = BlockState::Detaching;
        Ok(())
    }

    /// Detach completed, or an attach failed and rolled back.
    pub fn mark_available(&mut self) -> Result<(), VolumeError> {
        match self.state {
            BlockState::Attaching | BlockState::Detaching => {
                self.state = BlockState::Available;
                Ok(())
            }
            from => Err(VolumeError::InvalidStateTransition {
                from,
                to: BlockState::Available,
            }),
        }
    }
}

/// Join record between a block device and the instance it is attached to.
/// Created when the agent accepts an attach; deleted on detach completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAttachment {
    pub id: AttachmentId,
    pub instance_id: InstanceId,
    pub block_id: VolumeId,
}

impl StorageAttachment {
    pub fn new(id: AttachmentId, instance_id: InstanceId, block_id: VolumeId) -> Self {
        Self {
            id,
            instance_id,
            block_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("invalid volume size {0} GB")]
    InvalidSize(i64),

    #[error("invalid volume state transition from {from} to {to}")]
    InvalidStateTransition { from: BlockState, to: BlockState },
}
