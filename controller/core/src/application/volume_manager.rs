// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Volume attachment manager.
//!
//! Drives the block device state machine with asymmetric commit points:
//! an attach is committed only when the agent confirms the device is
//! usable (late commit), while a detach is observable the moment it is
//! dispatched (early commit). Either failure event rolls the volume back
//! to the state the operation started from.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::application::correlator::CommandCorrelator;
use crate::application::error::ControllerError;
use crate::application::serial::SubjectLocks;
use crate::domain::command::{AgentCommand, CommandKind, CommandSender};
use crate::domain::events::{LogEntry, VolumeEvent};
use crate::domain::instance::InstanceId;
use crate::domain::repository::{InstanceRepository, LogRepository, VolumeRepository};
use crate::domain::tenant::TenantId;
use crate::domain::volume::{AttachmentId, BlockData, BlockState, StorageAttachment, VolumeId};
use crate::infrastructure::event_bus::EventBus;

pub struct VolumeAttachmentManager {
    volumes: Arc<dyn VolumeRepository>,
    instances: Arc<dyn InstanceRepository>,
    log: Arc<dyn LogRepository>,
    sender: Arc<dyn CommandSender>,
    correlator: Arc<CommandCorrelator>,
    locks: Arc<SubjectLocks>,
    event_bus: EventBus,
    /// Attachment ids promised to callers of in-flight attaches; the join
    /// record itself is only written on the agent's confirmation.
    pending_attach: Mutex<HashMap<VolumeId, (AttachmentId, InstanceId)>>,
}

impl VolumeAttachmentManager {
    pub fn new(
        volumes: Arc<dyn VolumeRepository>,
        instances: Arc<dyn InstanceRepository>,
        log: Arc<dyn LogRepository>,
        sender: Arc<dyn CommandSender>,
        correlator: Arc<CommandCorrelator>,
        locks: Arc<SubjectLocks>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            volumes,
            instances,
            log,
            sender,
            correlator,
            locks,
            event_bus,
            pending_attach: Mutex::new(HashMap::new()),
        }
    }

    pub async fn create_volume(
        &self,
        tenant_id: TenantId,
        size_gb: i64,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<BlockData, ControllerError> {
        let volume = BlockData::new(tenant_id, size_gb, name, description)?;
        self.volumes.add_block_device(volume.clone()).await?;
        info!(volume_id = %volume.id, %tenant_id, size_gb, "volume created");
        self.event_bus
            .publish_volume_event(VolumeEvent::VolumeCreated {
                volume_id: volume.id,
                tenant_id,
                size_gb,
                created_at: Utc::now(),
            });
        Ok(volume)
    }

    /// Delete a volume. Only an available volume may be deleted; anything
    /// attached or mid-transition must be detached first.
    pub async fn delete_volume(
        &self,
        tenant_id: TenantId,
        volume_id: VolumeId,
    ) -> Result<(), ControllerError> {
        let _guard = self.locks.acquire(volume_id.0).await;
        let volume = self.owned(tenant_id, volume_id).await?;
        if !volume.state.can_delete() {
            return Err(ControllerError::VolumeNotAvailable(volume_id));
        }
        self.volumes.delete_block_device(volume_id).await?;
        self.event_bus
            .publish_volume_event(VolumeEvent::VolumeDeleted {
                volume_id,
                deleted_at: Utc::now(),
            });
        Ok(())
    }

    pub async fn list_volumes(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<BlockData>, ControllerError> {
        Ok(self.volumes.list_by_tenant(tenant_id).await?)
    }

    pub async fn show_volume(
        &self,
        tenant_id: TenantId,
        volume_id: VolumeId,
    ) -> Result<BlockData, ControllerError> {
        self.owned(tenant_id, volume_id).await
    }

    /// Attach a volume to an instance.
    ///
    /// The volume goes to `attaching` and an ATTACH is dispatched to the
    /// instance's node; the join record appears only once the agent
    /// confirms. A caller-supplied attachment id is honored for that
    /// record, otherwise one is generated.
    pub async fn attach_volume(
        &self,
        tenant_id: TenantId,
        volume_id: VolumeId,
        instance_id: InstanceId,
        attachment_id: Option<AttachmentId>,
    ) -> Result<AttachmentId, ControllerError> {
        let _guard = self.locks.acquire(volume_id.0).await;
        let mut volume = self.owned(tenant_id, volume_id).await?;

        let instance = self
            .instances
            .get(instance_id)
            .await?
            .ok_or(ControllerError::InstanceNotFound(instance_id))?;
        let node_id = instance
            .node_id
            .ok_or(ControllerError::NotAssigned(instance_id))?;

        volume.mark_attaching()?;
        self.volumes.update_block_device(&volume).await?;

        let attachment_id = attachment_id.unwrap_or_default();
        self.pending_attach
            .lock()
            .insert(volume_id, (attachment_id, instance_id));
        self.correlator
            .register(volume_id.0, CommandKind::AttachVolume);

        let dispatch = self
            .sender
            .send(AgentCommand::AttachVolume {
                volume_id,
                instance_id,
                node_id,
            })
            .await;
        if let Err(e) = dispatch {
            self.correlator.settle(volume_id.0, CommandKind::AttachVolume);
            self.pending_attach.lock().remove(&volume_id);
            volume.mark_available()?;
            self.volumes.update_block_device(&volume).await?;
            return Err(e.into());
        }

        info!(%volume_id, %instance_id, "volume attach dispatched");
        Ok(attachment_id)
    }

    /// Detach a volume from the instance it is attached to.
    ///
    /// The volume goes to `detaching` before the agent answers, so a
    /// concurrent attach or delete already sees it unavailable. Addressing
    /// the detach by attachment id is not implemented; the volume id names
    /// the attachment, since a volume attaches to at most one instance.
    pub async fn detach_volume(
        &self,
        tenant_id: TenantId,
        volume_id: VolumeId,
        attachment_id: Option<AttachmentId>,
    ) -> Result<(), ControllerError> {
        if attachment_id.is_some() {
            return Err(ControllerError::UnsupportedOperation);
        }
        let _guard = self.locks.acquire(volume_id.0).await;
        let mut volume = self.owned(tenant_id, volume_id).await?;

        let attachment = self
            .volumes
            .attachment_for_volume(volume_id)
            .await?
            .ok_or(ControllerError::VolumeNotAttached(volume_id))?;
        let instance = self
            .instances
            .get(attachment.instance_id)
            .await?
            .ok_or(ControllerError::InstanceNotFound(attachment.instance_id))?;
        let node_id = instance
            .node_id
            .ok_or(ControllerError::NotAssigned(attachment.instance_id))?;

        volume.mark_detaching()?;
        self.volumes.update_block_device(&volume).await?;
        self.correlator
            .register(volume_id.0, CommandKind::DetachVolume);

        let dispatch = self
            .sender
            .send(AgentCommand::DetachVolume {
                volume_id,
                instance_id: attachment.instance_id,
                node_id,
            })
            .await;
        if let Err(e) = dispatch {
            self.correlator.settle(volume_id.0, CommandKind::DetachVolume);
            volume.mark_in_use()?;
            self.volumes.update_block_device(&volume).await?;
            return Err(e.into());
        }

        info!(%volume_id, "volume detach dispatched");
        Ok(())
    }

    /// The agent confirmed the device is usable: commit the attach.
    pub async fn on_attach_success(
        &self,
        volume_id: VolumeId,
        instance_id: InstanceId,
    ) -> Result<(), ControllerError> {
        if self
            .correlator
            .settle(volume_id.0, CommandKind::AttachVolume)
            .is_none()
        {
            return Ok(());
        }
        let _guard = self.locks.acquire(volume_id.0).await;

        // No pending attach means the report is stale; never invent a
        // join record for it.
        let Some((attachment_id, _)) = self.pending_attach.lock().remove(&volume_id) else {
            return Ok(());
        };

        let Some(mut volume) = self.volumes.get_block_device(volume_id).await? else {
            return Ok(());
        };
        volume.mark_in_use()?;
        self.volumes.update_block_device(&volume).await?;

        self.volumes
            .add_attachment(StorageAttachment::new(attachment_id, instance_id, volume_id))
            .await?;

        info!(%volume_id, %instance_id, "volume attached");
        self.event_bus
            .publish_volume_event(VolumeEvent::VolumeAttached {
                volume_id,
                instance_id,
                attachment_id,
                attached_at: Utc::now(),
            });
        Ok(())
    }

    /// The agent could not attach the device: roll back to available, no
    /// join record is ever written.
    pub async fn on_attach_failure(
        &self,
        volume_id: VolumeId,
        instance_id: InstanceId,
        reason: &str,
    ) -> Result<(), ControllerError> {
        if self
            .correlator
            .settle(volume_id.0, CommandKind::AttachVolume)
            .is_none()
        {
            return Ok(());
        }
        self.fail_attach(volume_id, instance_id, reason).await
    }

    /// An ATTACH went unanswered past the command timeout; its obligation
    /// is already drained, so the rollback runs ungated.
    pub(crate) async fn attach_timed_out(
        &self,
        volume_id: VolumeId,
    ) -> Result<(), ControllerError> {
        // Nothing pending for this volume means the attach already
        // resolved one way or the other.
        let Some((_, instance_id)) = self.pending_attach.lock().get(&volume_id).copied() else {
            return Ok(());
        };
        self.fail_attach(volume_id, instance_id, "timeout").await
    }

    async fn fail_attach(
        &self,
        volume_id: VolumeId,
        instance_id: InstanceId,
        reason: &str,
    ) -> Result<(), ControllerError> {
        let _guard = self.locks.acquire(volume_id.0).await;
        self.pending_attach.lock().remove(&volume_id);

        let Some(mut volume) = self.volumes.get_block_device(volume_id).await? else {
            return Ok(());
        };
        if volume.state != BlockState::Attaching {
            return Ok(());
        }
        warn!(%volume_id, %instance_id, reason, "volume attach failed");
        self.log
            .append(LogEntry::error(
                volume.tenant_id,
                format!("Attach Failure {volume_id}: {reason}"),
            ))
            .await?;
        volume.mark_available()?;
        self.volumes.update_block_device(&volume).await?;

        self.event_bus
            .publish_volume_event(VolumeEvent::VolumeAttachFailed {
                volume_id,
                reason: reason.to_string(),
                failed_at: Utc::now(),
            });
        Ok(())
    }

    /// The agent released the device: complete the detach.
    pub async fn on_detach_success(&self, volume_id: VolumeId) -> Result<(), ControllerError> {
        if self
            .correlator
            .settle(volume_id.0, CommandKind::DetachVolume)
            .is_none()
        {
            return Ok(());
        }
        let _guard = self.locks.acquire(volume_id.0).await;

        let Some(mut volume) = self.volumes.get_block_device(volume_id).await? else {
            return Ok(());
        };
        volume.mark_available()?;
        self.volumes.update_block_device(&volume).await?;

        if let Some(attachment) = self.volumes.attachment_for_volume(volume_id).await? {
            self.volumes.delete_attachment(attachment.id).await?;
        }

        info!(%volume_id, "volume detached");
        self.event_bus
            .publish_volume_event(VolumeEvent::VolumeDetached {
                volume_id,
                detached_at: Utc::now(),
            });
        Ok(())
    }

    /// The agent could not release the device: the volume is still
    /// attached, so roll it back to in_use and keep the join record.
    pub async fn on_detach_failure(
        &self,
        volume_id: VolumeId,
        reason: &str,
    ) -> Result<(), ControllerError> {
        if self
            .correlator
            .settle(volume_id.0, CommandKind::DetachVolume)
            .is_none()
        {
            return Ok(());
        }
        self.fail_detach(volume_id, reason).await
    }

    /// A DETACH went unanswered past the command timeout; the volume is
    /// presumed still attached.
    pub(crate) async fn detach_timed_out(
        &self,
        volume_id: VolumeId,
    ) -> Result<(), ControllerError> {
        self.fail_detach(volume_id, "timeout").await
    }

    async fn fail_detach(
        &self,
        volume_id: VolumeId,
        reason: &str,
    ) -> Result<(), ControllerError> {
        let _guard = self.locks.acquire(volume_id.0).await;

        let Some(mut volume) = self.volumes.get_block_device(volume_id).await? else {
            return Ok(());
        };
        if volume.state != BlockState::Detaching {
            return Ok(());
        }
        warn!(%volume_id, reason, "volume detach failed");
        self.log
            .append(LogEntry::error(
                volume.tenant_id,
                format!("Detach Failure {volume_id}: {reason}"),
            ))
            .await?;
        volume.mark_in_use()?;
        self.volumes.update_block_device(&volume).await?;

        self.event_bus
            .publish_volume_event(VolumeEvent::VolumeDetachFailed {
                volume_id,
                reason: reason.to_string(),
                failed_at: Utc::now(),
            });
        Ok(())
    }

    async fn owned(
        &self,
        tenant_id: TenantId,
        volume_id: VolumeId,
    ) -> Result<BlockData, ControllerError> {
        let volume = self
            .volumes
            .get_block_device(volume_id)
            .await?
            .ok_or(ControllerError::VolumeNotFound(volume_id))?;
        if volume.tenant_id != tenant_id {
            return Err(ControllerError::VolumeOwnerMismatch(volume_id));
        }
        Ok(volume)
    }
}
