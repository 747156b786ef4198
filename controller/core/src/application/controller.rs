// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Orchestration facade.
//!
//! Wires the managers to their shared collaborators and gives the outer
//! surfaces one entry point: callers invoke operations through the
//! manager accessors, feed agent events into `handle_event`, and run
//! `expire_stale_commands` periodically to compensate for agents that
//! never answered.

use std::sync::Arc;

use tracing::warn;

use crate::application::concentrator::ConcentratorBootstrap;
use crate::application::correlator::CommandCorrelator;
use crate::application::error::ControllerError;
use crate::application::instance_manager::InstanceLifecycleManager;
use crate::application::serial::SubjectLocks;
use crate::application::volume_manager::VolumeAttachmentManager;
use crate::domain::command::{AgentEvent, CommandKind, CommandSender};
use crate::domain::instance::InstanceId;
use crate::domain::repository::{
    InstanceRepository, LogRepository, TenantRepository, VolumeRepository, WorkloadRepository,
};
use crate::domain::volume::VolumeId;
use crate::infrastructure::config::ControllerConfig;
use crate::infrastructure::event_bus::{EventBus, EventReceiver};
use crate::infrastructure::repositories::{
    InMemoryInstanceRepository, InMemoryLogRepository, InMemoryTenantRepository,
    InMemoryVolumeRepository, InMemoryWorkloadRepository,
};

/// The persistence collaborators of the orchestration core.
#[derive(Clone)]
pub struct Repositories {
    pub tenants: Arc<dyn TenantRepository>,
    pub workloads: Arc<dyn WorkloadRepository>,
    pub instances: Arc<dyn InstanceRepository>,
    pub volumes: Arc<dyn VolumeRepository>,
    pub log: Arc<dyn LogRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            tenants: Arc::new(InMemoryTenantRepository::new()),
            workloads: Arc::new(InMemoryWorkloadRepository::new()),
            instances: Arc::new(InMemoryInstanceRepository::new()),
            volumes: Arc::new(InMemoryVolumeRepository::new()),
            log: Arc::new(InMemoryLogRepository::new()),
        }
    }
}

pub struct Controller {
    config: ControllerConfig,
    repositories: Repositories,
    correlator: Arc<CommandCorrelator>,
    locks: Arc<SubjectLocks>,
    event_bus: EventBus,
    concentrator: Arc<ConcentratorBootstrap>,
    instances: InstanceLifecycleManager,
    volumes: VolumeAttachmentManager,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        repositories: Repositories,
        sender: Arc<dyn CommandSender>,
    ) -> Self {
        let correlator = Arc::new(CommandCorrelator::new());
        let locks = Arc::new(SubjectLocks::new());
        let event_bus = EventBus::new(config.event_capacity);

        let concentrator = Arc::new(ConcentratorBootstrap::new(
            repositories.tenants.clone(),
            repositories.log.clone(),
            sender.clone(),
            correlator.clone(),
            event_bus.clone(),
            config.cnci_bootstrap_timeout,
        ));
        let instances = InstanceLifecycleManager::new(
            repositories.tenants.clone(),
            repositories.workloads.clone(),
            repositories.instances.clone(),
            repositories.log.clone(),
            sender.clone(),
            correlator.clone(),
            concentrator.clone(),
            locks.clone(),
            event_bus.clone(),
        );
        let volumes = VolumeAttachmentManager::new(
            repositories.volumes.clone(),
            repositories.instances.clone(),
            repositories.log.clone(),
            sender,
            correlator.clone(),
            locks.clone(),
            event_bus.clone(),
        );

        Self {
            config,
            repositories,
            correlator,
            locks,
            event_bus,
            concentrator,
            instances,
            volumes,
        }
    }

    pub fn instances(&self) -> &InstanceLifecycleManager {
        &self.instances
    }

    pub fn volumes(&self) -> &VolumeAttachmentManager {
        &self.volumes
    }

    pub fn concentrator(&self) -> &ConcentratorBootstrap {
        &self.concentrator
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Route one agent event to its owning manager.
    pub async fn handle_event(&self, event: AgentEvent) -> Result<(), ControllerError> {
        match event {
            AgentEvent::StartSuccess {
                instance_id,
                node_id,
                mac_address,
                ip_address,
            } => {
                self.instances
                    .on_start_success(instance_id, node_id, mac_address, ip_address)
                    .await
            }
            AgentEvent::StartFailure {
                instance_id,
                reason,
            } => self.instances.on_start_failure(instance_id, &reason).await,
            AgentEvent::StopFailure {
                instance_id,
                reason,
            } => self.instances.on_stop_failure(instance_id, &reason).await,
            AgentEvent::RestartFailure {
                instance_id,
                reason,
            } => {
                self.instances
                    .on_restart_failure(instance_id, &reason)
                    .await
            }
            AgentEvent::InstanceDeleted { instance_id } => {
                self.instances.on_instance_deleted(instance_id).await
            }
            AgentEvent::AttachVolumeSuccess {
                volume_id,
                instance_id,
            } => self.volumes.on_attach_success(volume_id, instance_id).await,
            AgentEvent::AttachVolumeFailure {
                volume_id,
                instance_id,
                reason,
            } => {
                self.volumes
                    .on_attach_failure(volume_id, instance_id, &reason)
                    .await
            }
            AgentEvent::DetachVolumeSuccess { volume_id } => {
                self.volumes.on_detach_success(volume_id).await
            }
            AgentEvent::DetachVolumeFailure { volume_id, reason } => {
                self.volumes.on_detach_failure(volume_id, &reason).await
            }
            AgentEvent::ConcentratorInstanceAdded {
                instance_id,
                tenant_id,
                ip_address,
                mac_address,
            } => {
                self.concentrator
                    .on_concentrator_added(instance_id, tenant_id, ip_address, mac_address)
                    .await
            }
        }
    }

    /// Drain obligations older than the command timeout and run each
    /// one's compensation, as if the agent had reported a failure with
    /// reason "timeout". Returns how many were expired.
    pub async fn expire_stale_commands(&self) -> Result<usize, ControllerError> {
        let timeout = chrono::Duration::from_std(self.config.command_timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let overdue = self.correlator.expire_overdue(timeout);
        let count = overdue.len();

        for obligation in overdue {
            warn!(
                subject = %obligation.subject,
                kind = %obligation.kind,
                "command went unanswered"
            );
            let result = match obligation.kind {
                CommandKind::Start => {
                    self.instances
                        .start_timed_out(InstanceId(obligation.subject))
                        .await
                }
                CommandKind::Stop => {
                    self.instances
                        .stop_timed_out(InstanceId(obligation.subject))
                        .await
                }
                CommandKind::Restart => {
                    self.instances
                        .restart_timed_out(InstanceId(obligation.subject))
                        .await
                }
                CommandKind::Delete => {
                    self.instances
                        .delete_timed_out(InstanceId(obligation.subject))
                        .await
                }
                CommandKind::Evacuate => Ok(()),
                CommandKind::AttachVolume => {
                    self.volumes
                        .attach_timed_out(VolumeId(obligation.subject))
                        .await
                }
                CommandKind::DetachVolume => {
                    self.volumes
                        .detach_timed_out(VolumeId(obligation.subject))
                        .await
                }
            };
            if let Err(e) = result {
                warn!(subject = %obligation.subject, error = %e, "compensation failed");
            }
        }

        // Same cadence cleans up subject locks nobody holds any more.
        self.locks.sweep();
        Ok(count)
    }
}
