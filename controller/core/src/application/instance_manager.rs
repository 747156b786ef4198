// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Instance lifecycle manager.
//!
//! Owns every transition of the instance state machine: admission against
//! tenant quota, START dispatch, the asynchronous success/failure/deleted
//! events, and the synchronous delete of an instance no node ever
//! accepted. Stop/restart/delete failures have no caller left to inform;
//! they surface in the tenant's event log.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::application::concentrator::ConcentratorBootstrap;
use crate::application::correlator::CommandCorrelator;
use crate::application::error::ControllerError;
use crate::application::serial::SubjectLocks;
use crate::domain::command::{AgentCommand, CommandKind, CommandSender};
use crate::domain::events::{InstanceEvent, LogEntry};
use crate::domain::instance::{Instance, InstanceId, InstanceState, NodeId};
use crate::domain::repository::{
    InstanceRepository, LogRepository, TenantRepository, WorkloadRepository,
};
use crate::domain::tenant::TenantId;
use crate::domain::workload::WorkloadId;
use crate::infrastructure::event_bus::EventBus;

/// Result of a batch start. `incomplete` carries the first error once at
/// least one instance was created; a batch that creates none returns the
/// error directly instead.
#[derive(Debug)]
pub struct StartOutcome {
    pub instances: Vec<Instance>,
    pub incomplete: Option<ControllerError>,
}

pub struct InstanceLifecycleManager {
    tenants: Arc<dyn TenantRepository>,
    workloads: Arc<dyn WorkloadRepository>,
    instances: Arc<dyn InstanceRepository>,
    log: Arc<dyn LogRepository>,
    sender: Arc<dyn CommandSender>,
    correlator: Arc<CommandCorrelator>,
    concentrator: Arc<ConcentratorBootstrap>,
    locks: Arc<SubjectLocks>,
    event_bus: EventBus,
}

impl InstanceLifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        workloads: Arc<dyn WorkloadRepository>,
        instances: Arc<dyn InstanceRepository>,
        log: Arc<dyn LogRepository>,
        sender: Arc<dyn CommandSender>,
        correlator: Arc<CommandCorrelator>,
        concentrator: Arc<ConcentratorBootstrap>,
        locks: Arc<SubjectLocks>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            tenants,
            workloads,
            instances,
            log,
            sender,
            correlator,
            concentrator,
            locks,
            event_bus,
        }
    }

    /// Launch `count` instances of a workload for a tenant.
    ///
    /// Each instance is admitted against quota, then waits for the
    /// tenant's concentrator, then is persisted and dispatched. The first
    /// admission or dispatch error stops the batch, and instances created
    /// before it stand. A tenant over quota never triggers a concentrator
    /// launch.
    pub async fn start_workload(
        &self,
        tenant_id: TenantId,
        workload_id: WorkloadId,
        count: usize,
        trace_label: Option<String>,
    ) -> Result<StartOutcome, ControllerError> {
        let workload = self
            .workloads
            .get(workload_id)
            .await?
            .ok_or(ControllerError::WorkloadNotFound(workload_id))?;

        let mut created = Vec::with_capacity(count);
        let mut incomplete = None;
        for _ in 0..count {
            match self
                .start_one(tenant_id, &workload, trace_label.clone())
                .await
            {
                Ok(instance) => created.push(instance),
                Err(e) => {
                    incomplete = Some(e);
                    break;
                }
            }
        }

        if created.is_empty() {
            match incomplete {
                Some(e) => Err(e),
                None => Ok(StartOutcome {
                    instances: created,
                    incomplete: None,
                }),
            }
        } else {
            Ok(StartOutcome {
                instances: created,
                incomplete,
            })
        }
    }

    async fn start_one(
        &self,
        tenant_id: TenantId,
        workload: &crate::domain::workload::Workload,
        trace_label: Option<String>,
    ) -> Result<Instance, ControllerError> {
        let admitted = self.tenants.reserve(tenant_id, &workload.defaults).await?;
        if !admitted {
            warn!(%tenant_id, "instance admission denied: over quota");
            self.log
                .append(LogEntry::error(tenant_id, "over quota"))
                .await?;
            return Err(ControllerError::QuotaExceeded(tenant_id));
        }

        if let Err(e) = self.concentrator.ensure_ready(tenant_id).await {
            self.tenants.release(tenant_id, &workload.defaults).await?;
            return Err(e);
        }

        let instance = Instance::new(tenant_id, workload.id);
        let config = workload.launch_config(instance.id, tenant_id, trace_label);
        self.instances.add(instance.clone()).await?;
        self.correlator.register(instance.id.0, CommandKind::Start);

        let dispatch = self
            .sender
            .send(AgentCommand::Start {
                instance_id: instance.id,
                tenant_id,
                concentrator: false,
                config: Some(config),
            })
            .await;
        if let Err(e) = dispatch {
            // The command never left; undo the record and the reservation.
            self.correlator.settle(instance.id.0, CommandKind::Start);
            self.instances.delete(instance.id).await?;
            self.tenants.release(tenant_id, &workload.defaults).await?;
            return Err(e.into());
        }

        info!(instance_id = %instance.id, %tenant_id, "instance launch dispatched");
        self.event_bus
            .publish_instance_event(InstanceEvent::InstanceLaunched {
                instance_id: instance.id,
                tenant_id,
                launched_at: Utc::now(),
            });
        Ok(instance)
    }

    /// Stop a running instance on its node.
    pub async fn stop_instance(&self, instance_id: InstanceId) -> Result<(), ControllerError> {
        let _guard = self.locks.acquire(instance_id.0).await;
        let instance = self.get(instance_id).await?;
        let node_id = instance
            .node_id
            .ok_or(ControllerError::NotAssigned(instance_id))?;

        self.correlator.register(instance_id.0, CommandKind::Stop);
        self.sender
            .send(AgentCommand::Stop {
                instance_id,
                node_id,
            })
            .await?;
        Ok(())
    }

    /// Restart a stopped instance on its node.
    pub async fn restart_instance(&self, instance_id: InstanceId) -> Result<(), ControllerError> {
        let _guard = self.locks.acquire(instance_id.0).await;
        let instance = self.get(instance_id).await?;
        let node_id = instance
            .node_id
            .ok_or(ControllerError::NotAssigned(instance_id))?;

        self.correlator
            .register(instance_id.0, CommandKind::Restart);
        self.sender
            .send(AgentCommand::Restart {
                instance_id,
                node_id,
            })
            .await?;
        Ok(())
    }

    /// Delete an instance.
    ///
    /// An instance no node ever accepted is purged synchronously, with no
    /// agent round trip. An assigned instance goes to `exiting` and waits
    /// for the agent's deletion report.
    pub async fn delete_instance(&self, instance_id: InstanceId) -> Result<(), ControllerError> {
        let _guard = self.locks.acquire(instance_id.0).await;
        let mut instance = self.get(instance_id).await?;

        let Some(node_id) = instance.node_id else {
            self.purge(&instance).await?;
            return Ok(());
        };

        // Re-deleting an exiting instance re-dispatches the DELETE.
        if instance.state != InstanceState::Exiting {
            instance.mark_exiting()?;
            self.instances.update(&instance).await?;
        }
        self.correlator
            .register(instance_id.0, CommandKind::Delete);
        self.sender
            .send(AgentCommand::Delete {
                instance_id,
                node_id,
            })
            .await?;
        Ok(())
    }

    /// Ask every agent on a node to tear down its instances.
    pub async fn evacuate_node(&self, node_id: NodeId) -> Result<(), ControllerError> {
        self.correlator.register(node_id.0, CommandKind::Evacuate);
        self.sender.send(AgentCommand::Evacuate { node_id }).await?;
        Ok(())
    }

    /// A compute agent accepted the workload.
    pub async fn on_start_success(
        &self,
        instance_id: InstanceId,
        node_id: NodeId,
        mac_address: String,
        ip_address: String,
    ) -> Result<(), ControllerError> {
        if self
            .correlator
            .settle(instance_id.0, CommandKind::Start)
            .is_none()
        {
            return Ok(());
        }
        let _guard = self.locks.acquire(instance_id.0).await;

        let Some(mut instance) = self.instances.get(instance_id).await? else {
            return Ok(());
        };
        instance.mark_running(node_id, mac_address, ip_address)?;
        self.instances.update(&instance).await?;

        info!(%instance_id, %node_id, "instance running");
        self.event_bus
            .publish_instance_event(InstanceEvent::InstanceRunning {
                instance_id,
                node_id,
                running_at: Utc::now(),
            });
        Ok(())
    }

    /// No agent could launch the instance: purge the record and release
    /// the reservation, as if the instance never existed.
    pub async fn on_start_failure(
        &self,
        instance_id: InstanceId,
        reason: &str,
    ) -> Result<(), ControllerError> {
        if self
            .correlator
            .settle(instance_id.0, CommandKind::Start)
            .is_none()
        {
            return Ok(());
        }
        self.fail_start(instance_id, reason).await
    }

    /// The START went unanswered past the command timeout; its obligation
    /// is already drained, so the compensation runs ungated.
    pub(crate) async fn start_timed_out(
        &self,
        instance_id: InstanceId,
    ) -> Result<(), ControllerError> {
        self.fail_start(instance_id, "timeout").await
    }

    async fn fail_start(
        &self,
        instance_id: InstanceId,
        reason: &str,
    ) -> Result<(), ControllerError> {
        let _guard = self.locks.acquire(instance_id.0).await;

        let Some(instance) = self.instances.get(instance_id).await? else {
            return Ok(());
        };
        warn!(%instance_id, reason, "instance launch failed");
        self.log
            .append(LogEntry::error(
                instance.tenant_id,
                format!("Start Failure {instance_id}: {reason}"),
            ))
            .await?;
        self.purge(&instance).await?;
        self.event_bus
            .publish_instance_event(InstanceEvent::InstanceStartFailed {
                instance_id,
                reason: reason.to_string(),
                failed_at: Utc::now(),
            });
        Ok(())
    }

    /// The agent could not stop the instance; the record is untouched.
    /// A report with no outstanding STOP is stale and ignored.
    pub async fn on_stop_failure(
        &self,
        instance_id: InstanceId,
        reason: &str,
    ) -> Result<(), ControllerError> {
        if self
            .correlator
            .settle(instance_id.0, CommandKind::Stop)
            .is_none()
        {
            return Ok(());
        }
        self.fail_stop(instance_id, reason).await
    }

    /// A STOP went unanswered past the command timeout; its obligation is
    /// already drained, so the compensation runs ungated.
    pub(crate) async fn stop_timed_out(
        &self,
        instance_id: InstanceId,
    ) -> Result<(), ControllerError> {
        self.fail_stop(instance_id, "timeout").await
    }

    async fn fail_stop(
        &self,
        instance_id: InstanceId,
        reason: &str,
    ) -> Result<(), ControllerError> {
        let Some(instance) = self.instances.get(instance_id).await? else {
            return Ok(());
        };
        warn!(%instance_id, reason, "instance stop failed");
        self.log
            .append(LogEntry::error(
                instance.tenant_id,
                format!("Stop Failure {instance_id}: {reason}"),
            ))
            .await?;
        Ok(())
    }

    /// The agent could not restart the instance; the record is untouched.
    /// A report with no outstanding RESTART is stale and ignored.
    pub async fn on_restart_failure(
        &self,
        instance_id: InstanceId,
        reason: &str,
    ) -> Result<(), ControllerError> {
        if self
            .correlator
            .settle(instance_id.0, CommandKind::Restart)
            .is_none()
        {
            return Ok(());
        }
        self.fail_restart(instance_id, reason).await
    }

    /// A RESTART went unanswered past the command timeout; its obligation
    /// is already drained, so the compensation runs ungated.
    pub(crate) async fn restart_timed_out(
        &self,
        instance_id: InstanceId,
    ) -> Result<(), ControllerError> {
        self.fail_restart(instance_id, "timeout").await
    }

    async fn fail_restart(
        &self,
        instance_id: InstanceId,
        reason: &str,
    ) -> Result<(), ControllerError> {
        let Some(instance) = self.instances.get(instance_id).await? else {
            return Ok(());
        };
        warn!(%instance_id, reason, "instance restart failed");
        self.log
            .append(LogEntry::error(
                instance.tenant_id,
                format!("Restart Failure {instance_id}: {reason}"),
            ))
            .await?;
        Ok(())
    }

    /// A DELETE went unanswered; the record stays in `exiting` so a retry
    /// can re-dispatch, and the loss is recorded in the tenant's log.
    pub(crate) async fn delete_timed_out(
        &self,
        instance_id: InstanceId,
    ) -> Result<(), ControllerError> {
        let Some(instance) = self.instances.get(instance_id).await? else {
            return Ok(());
        };
        warn!(%instance_id, "instance delete timed out");
        self.log
            .append(LogEntry::error(
                instance.tenant_id,
                format!("Delete Failure {instance_id}: timeout"),
            ))
            .await?;
        Ok(())
    }

    /// An agent reported the instance gone, whether from a DELETE, an
    /// evacuation, or the workload exiting on its own.
    pub async fn on_instance_deleted(
        &self,
        instance_id: InstanceId,
    ) -> Result<(), ControllerError> {
        self.correlator.settle(instance_id.0, CommandKind::Delete);
        let _guard = self.locks.acquire(instance_id.0).await;

        let Some(instance) = self.instances.get(instance_id).await? else {
            return Ok(());
        };
        self.purge(&instance).await?;
        Ok(())
    }

    async fn get(&self, instance_id: InstanceId) -> Result<Instance, ControllerError> {
        self.instances
            .get(instance_id)
            .await?
            .ok_or(ControllerError::InstanceNotFound(instance_id))
    }

    /// Remove the record and give the reservation back. Record absence is
    /// the terminal "deleted" state.
    async fn purge(&self, instance: &Instance) -> Result<(), ControllerError> {
        self.instances.delete(instance.id).await?;
        if let Some(workload) = self.workloads.get(instance.workload_id).await? {
            self.tenants
                .release(instance.tenant_id, &workload.defaults)
                .await?;
        }
        info!(instance_id = %instance.id, "instance record removed");
        self.event_bus
            .publish_instance_event(InstanceEvent::InstanceDeleted {
                instance_id: instance.id,
                tenant_id: instance.tenant_id,
                deleted_at: Utc::now(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::events::LogEventType;
    use crate::domain::tenant::{RequestedResource, ResourceType, Tenant};
    use crate::domain::workload::{VmType, Workload};
    use crate::infrastructure::repositories::{
        InMemoryInstanceRepository, InMemoryLogRepository, InMemoryTenantRepository,
        InMemoryWorkloadRepository,
    };
    use crate::infrastructure::transport::RecordingCommandSender;

    struct Fixture {
        manager: InstanceLifecycleManager,
        tenants: Arc<InMemoryTenantRepository>,
        instances: Arc<InMemoryInstanceRepository>,
        log: Arc<InMemoryLogRepository>,
        sender: Arc<RecordingCommandSender>,
        tenant_id: TenantId,
        workload_id: WorkloadId,
    }

    async fn fixture(instance_limit: i64) -> Fixture {
        build_fixture(instance_limit, true, Duration::from_secs(5)).await
    }

    async fn fixture_without_cnci(instance_limit: i64, deadline: Duration) -> Fixture {
        build_fixture(instance_limit, false, deadline).await
    }

    async fn build_fixture(instance_limit: i64, with_cnci: bool, deadline: Duration) -> Fixture {
        let tenants = Arc::new(InMemoryTenantRepository::new());
        let workloads = Arc::new(InMemoryWorkloadRepository::new());
        let instances = Arc::new(InMemoryInstanceRepository::new());
        let log = Arc::new(InMemoryLogRepository::new());
        let sender = Arc::new(RecordingCommandSender::new());
        let correlator = Arc::new(CommandCorrelator::new());
        let event_bus = EventBus::new(64);

        let tenant_id = TenantId::new();
        let mut tenant = Tenant::new(tenant_id, "acme");
        if instance_limit > 0 {
            tenant.set_limit(ResourceType::Instances, instance_limit);
        }
        if with_cnci {
            tenant.cnci = Some(crate::domain::tenant::CnciInfo {
                instance_id: InstanceId::new(),
                mac_address: "02:00:ac:10:00:02".to_string(),
                ip_address: "172.16.0.2".to_string(),
            });
        }
        tenants.add(tenant).await.unwrap();

        let workload_id = WorkloadId::new();
        workloads
            .add(Workload {
                id: workload_id,
                description: "small vm".to_string(),
                image_id: "img-1".to_string(),
                vm_type: VmType::Qemu,
                defaults: vec![RequestedResource::new(ResourceType::Instances, 1)],
                storage: None,
            })
            .await
            .unwrap();

        let concentrator = Arc::new(ConcentratorBootstrap::new(
            tenants.clone(),
            log.clone(),
            sender.clone(),
            correlator.clone(),
            event_bus.clone(),
            deadline,
        ));
        let manager = InstanceLifecycleManager::new(
            tenants.clone(),
            workloads,
            instances.clone(),
            log.clone(),
            sender.clone(),
            correlator,
            concentrator,
            Arc::new(SubjectLocks::new()),
            event_bus,
        );
        Fixture {
            manager,
            tenants,
            instances,
            log,
            sender,
            tenant_id,
            workload_id,
        }
    }

    async fn running_instance(f: &Fixture) -> InstanceId {
        let outcome = f
            .manager
            .start_workload(f.tenant_id, f.workload_id, 1, None)
            .await
            .unwrap();
        let id = outcome.instances[0].id;
        f.manager
            .on_start_success(
                id,
                NodeId::new(),
                "02:00:ac:10:00:03".to_string(),
                "172.16.0.3".to_string(),
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn start_creates_pending_instances_and_dispatches() {
        let f = fixture(0).await;
        let outcome = f
            .manager
            .start_workload(f.tenant_id, f.workload_id, 2, None)
            .await
            .unwrap();

        assert_eq!(outcome.instances.len(), 2);
        assert!(outcome.incomplete.is_none());
        assert_eq!(f.sender.sent_count(), 2);
        for instance in &outcome.instances {
            let stored = f.instances.get(instance.id).await.unwrap().unwrap();
            assert_eq!(stored.state, crate::domain::instance::InstanceState::Pending);
            assert!(!stored.is_assigned());
        }
    }

    #[tokio::test]
    async fn quota_denial_stops_the_batch() {
        let f = fixture(2).await;
        let outcome = f
            .manager
            .start_workload(f.tenant_id, f.workload_id, 5, None)
            .await
            .unwrap();

        assert_eq!(outcome.instances.len(), 2);
        assert!(matches!(
            outcome.incomplete,
            Some(ControllerError::QuotaExceeded(_))
        ));
        assert_eq!(f.sender.sent_count(), 2);
    }

    #[tokio::test]
    async fn quota_denial_with_nothing_created_is_an_error() {
        let f = fixture(1).await;
        f.manager
            .start_workload(f.tenant_id, f.workload_id, 1, None)
            .await
            .unwrap();

        let err = f
            .manager
            .start_workload(f.tenant_id, f.workload_id, 1, None)
            .await;
        assert!(matches!(err, Err(ControllerError::QuotaExceeded(_))));
    }

    #[tokio::test]
    async fn over_quota_start_never_launches_a_concentrator() {
        let f = fixture_without_cnci(1, Duration::from_secs(5)).await;
        f.tenants
            .reserve(
                f.tenant_id,
                &[RequestedResource::new(ResourceType::Instances, 1)],
            )
            .await
            .unwrap();

        let err = f
            .manager
            .start_workload(f.tenant_id, f.workload_id, 1, None)
            .await;
        assert!(matches!(err, Err(ControllerError::QuotaExceeded(_))));
        assert_eq!(f.sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn bootstrap_timeout_releases_the_reservation() {
        let f = fixture_without_cnci(1, Duration::from_millis(20)).await;

        let err = f
            .manager
            .start_workload(f.tenant_id, f.workload_id, 1, None)
            .await;
        assert!(matches!(err, Err(ControllerError::Timeout)));

        // Only the concentrator START went out, and the reservation for
        // the instance that never launched is back.
        assert_eq!(f.sender.sent_count(), 1);
        let tenant = f.tenants.get(f.tenant_id).await.unwrap().unwrap();
        assert_eq!(tenant.resource(ResourceType::Instances).unwrap().usage, 0);
    }

    #[tokio::test]
    async fn dispatch_failure_rolls_back_record_and_quota() {
        let f = fixture(4).await;
        f.sender.fail_after(1);

        let outcome = f
            .manager
            .start_workload(f.tenant_id, f.workload_id, 3, None)
            .await
            .unwrap();
        assert_eq!(outcome.instances.len(), 1);
        assert!(matches!(
            outcome.incomplete,
            Some(ControllerError::Transport(_))
        ));

        let tenant = f.tenants.get(f.tenant_id).await.unwrap().unwrap();
        assert_eq!(tenant.resource(ResourceType::Instances).unwrap().usage, 1);
    }

    #[tokio::test]
    async fn start_success_marks_running() {
        let f = fixture(0).await;
        let id = running_instance(&f).await;

        let stored = f.instances.get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, crate::domain::instance::InstanceState::Running);
        assert!(stored.is_assigned());
        assert_eq!(stored.ip_address, "172.16.0.3");
    }

    #[tokio::test]
    async fn start_failure_purges_record_and_releases_quota() {
        let f = fixture(1).await;
        let outcome = f
            .manager
            .start_workload(f.tenant_id, f.workload_id, 1, None)
            .await
            .unwrap();
        let id = outcome.instances[0].id;

        f.manager
            .on_start_failure(id, "no node with sufficient memory")
            .await
            .unwrap();

        assert!(f.instances.get(id).await.unwrap().is_none());
        let tenant = f.tenants.get(f.tenant_id).await.unwrap().unwrap();
        assert_eq!(tenant.resource(ResourceType::Instances).unwrap().usage, 0);
    }

    #[tokio::test]
    async fn stop_requires_node_assignment() {
        let f = fixture(0).await;
        let outcome = f
            .manager
            .start_workload(f.tenant_id, f.workload_id, 1, None)
            .await
            .unwrap();
        let id = outcome.instances[0].id;

        let err = f.manager.stop_instance(id).await;
        assert!(matches!(err, Err(ControllerError::NotAssigned(_))));
    }

    #[tokio::test]
    async fn stop_failure_writes_log_entry() {
        let f = fixture(0).await;
        let id = running_instance(&f).await;
        f.manager.stop_instance(id).await.unwrap();

        f.manager
            .on_stop_failure(id, "instance is not running")
            .await
            .unwrap();

        let entries = f.log.entries().await.unwrap();
        let entry = entries.last().unwrap();
        assert_eq!(entry.event_type, LogEventType::Error);
        assert_eq!(
            entry.message,
            format!("Stop Failure {id}: instance is not running")
        );
    }

    #[tokio::test]
    async fn duplicate_stop_failure_logs_once() {
        let f = fixture(0).await;
        let id = running_instance(&f).await;
        f.manager.stop_instance(id).await.unwrap();

        f.manager
            .on_stop_failure(id, "instance is not running")
            .await
            .unwrap();
        // Replayed report: the obligation is already settled.
        f.manager
            .on_stop_failure(id, "instance is not running")
            .await
            .unwrap();

        let entries = f.log.entries().await.unwrap();
        let hits = entries
            .iter()
            .filter(|e| {
                e.message == format!("Stop Failure {id}: instance is not running")
            })
            .count();
        assert_eq!(hits, 1);
    }

    #[tokio::test]
    async fn stale_restart_failure_is_ignored() {
        let f = fixture(0).await;
        let id = running_instance(&f).await;

        // No RESTART outstanding for this instance.
        f.manager
            .on_restart_failure(id, "agent rebooted")
            .await
            .unwrap();

        let entries = f.log.entries().await.unwrap();
        assert!(entries.iter().all(|e| !e.message.contains("Restart Failure")));
    }

    #[tokio::test]
    async fn restart_failure_writes_log_entry() {
        let f = fixture(0).await;
        let id = running_instance(&f).await;
        f.manager.restart_instance(id).await.unwrap();

        f.manager
            .on_restart_failure(id, "instance is already running")
            .await
            .unwrap();

        let entries = f.log.entries().await.unwrap();
        assert_eq!(
            entries.last().unwrap().message,
            format!("Restart Failure {id}: instance is already running")
        );
    }

    #[tokio::test]
    async fn delete_unassigned_is_synchronous() {
        let f = fixture(1).await;
        let outcome = f
            .manager
            .start_workload(f.tenant_id, f.workload_id, 1, None)
            .await
            .unwrap();
        let id = outcome.instances[0].id;
        let sent_before = f.sender.sent_count();

        f.manager.delete_instance(id).await.unwrap();

        assert_eq!(f.sender.sent_count(), sent_before);
        assert!(f.instances.get(id).await.unwrap().is_none());
        let tenant = f.tenants.get(f.tenant_id).await.unwrap().unwrap();
        assert_eq!(tenant.resource(ResourceType::Instances).unwrap().usage, 0);
    }

    #[tokio::test]
    async fn delete_assigned_waits_for_agent() {
        let f = fixture(0).await;
        let id = running_instance(&f).await;

        f.manager.delete_instance(id).await.unwrap();
        let stored = f.instances.get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, crate::domain::instance::InstanceState::Exiting);

        f.manager.on_instance_deleted(id).await.unwrap();
        assert!(f.instances.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_deleted_event_is_idempotent() {
        let f = fixture(0).await;
        let id = running_instance(&f).await;
        f.manager.delete_instance(id).await.unwrap();

        f.manager.on_instance_deleted(id).await.unwrap();
        f.manager.on_instance_deleted(id).await.unwrap();
        assert!(f.instances.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_start_success_is_ignored() {
        let f = fixture(0).await;
        let id = running_instance(&f).await;

        // No Start obligation is outstanding any more.
        f.manager
            .on_start_success(id, NodeId::new(), String::new(), String::new())
            .await
            .unwrap();

        let stored = f.instances.get(id).await.unwrap().unwrap();
        assert_eq!(stored.ip_address, "172.16.0.3");
    }

    #[tokio::test]
    async fn evacuate_dispatches_to_node() {
        let f = fixture(0).await;
        let node_id = NodeId::new();
        f.manager.evacuate_node(node_id).await.unwrap();

        match f.sender.sent().last().unwrap() {
            AgentCommand::Evacuate { node_id: got } => assert_eq!(*got, node_id),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
