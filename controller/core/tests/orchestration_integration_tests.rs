// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the orchestration facade.
//!
//! These tests drive the full path a deployed controller takes:
//! 1. Tenant concentrator bootstrap on first launch, with coalescing
//! 2. Instance lifecycle: start, running, stop failure logging, delete
//! 3. Volume attach/detach with the asymmetric commit points
//! 4. Quota admission and release over the whole lifecycle
//!
//! Agent behavior is simulated by draining the command channel and
//! feeding events back through `handle_event`, the same way the wire
//! layer does in a deployed controller.

use std::sync::Arc;
use std::time::Duration;

use strato_controller_core::domain::command::{AgentCommand, AgentEvent};
use strato_controller_core::domain::instance::{InstanceState, NodeId};
use strato_controller_core::domain::tenant::{
    RequestedResource, ResourceType, Tenant, TenantId,
};
use strato_controller_core::domain::volume::BlockState;
use strato_controller_core::domain::workload::{VmType, Workload, WorkloadId};
use strato_controller_core::infrastructure::transport::ChannelCommandSender;
use strato_controller_core::{Controller, ControllerConfig, Repositories};

struct Cluster {
    controller: Arc<Controller>,
    commands: tokio::sync::mpsc::UnboundedReceiver<AgentCommand>,
    tenant_id: TenantId,
    workload_id: WorkloadId,
    node_id: NodeId,
}

async fn cluster() -> Cluster {
    let repositories = Repositories::in_memory();
    let (sender, commands) = ChannelCommandSender::new();

    let tenant_id = TenantId::new();
    let mut tenant = Tenant::new(tenant_id, "integration");
    tenant.set_limit(ResourceType::Instances, 10);
    repositories.tenants.add(tenant).await.unwrap();

    let workload_id = WorkloadId::new();
    repositories
        .workloads
        .add(Workload {
            id: workload_id,
            description: "integration vm".to_string(),
            image_id: "img-integration".to_string(),
            vm_type: VmType::Qemu,
            defaults: vec![RequestedResource::new(ResourceType::Instances, 1)],
            storage: None,
        })
        .await
        .unwrap();

    let config = ControllerConfig {
        cnci_bootstrap_timeout: Duration::from_secs(5),
        ..ControllerConfig::default()
    };
    Cluster {
        controller: Arc::new(Controller::new(config, repositories, Arc::new(sender))),
        commands,
        tenant_id,
        workload_id,
        node_id: NodeId::new(),
    }
}

/// Answer the next command the way a healthy agent would.
async fn answer_next(cluster: &mut Cluster) {
    let command = cluster.commands.recv().await.unwrap();
    let event = match command {
        AgentCommand::Start {
            instance_id,
            tenant_id,
            concentrator: true,
            ..
        } => AgentEvent::ConcentratorInstanceAdded {
            instance_id,
            tenant_id,
            ip_address: "172.16.0.2".to_string(),
            mac_address: String::new(),
        },
        AgentCommand::Start { instance_id, .. } => AgentEvent::StartSuccess {
            instance_id,
            node_id: cluster.node_id,
            mac_address: "02:00:ac:10:00:03".to_string(),
            ip_address: "172.16.0.3".to_string(),
        },
        AgentCommand::Delete { instance_id, .. } => {
            AgentEvent::InstanceDeleted { instance_id }
        }
        AgentCommand::AttachVolume {
            volume_id,
            instance_id,
            ..
        } => AgentEvent::AttachVolumeSuccess {
            volume_id,
            instance_id,
        },
        AgentCommand::DetachVolume { volume_id, .. } => {
            AgentEvent::DetachVolumeSuccess { volume_id }
        }
        other => panic!("no canned answer for {other:?}"),
    };
    cluster.controller.handle_event(event).await.unwrap();
}

#[tokio::test]
async fn full_instance_lifecycle() {
    let mut cluster = cluster().await;
    let controller = cluster.controller.clone();

    // First launch triggers the concentrator bootstrap; answer it from a
    // separate task since start_workload blocks on it.
    let agent = {
        let tenant_id = cluster.tenant_id;
        let workload_id = cluster.workload_id;
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .instances()
                .start_workload(tenant_id, workload_id, 1, None)
                .await
        })
    };
    answer_next(&mut cluster).await; // concentrator START
    answer_next(&mut cluster).await; // instance START

    let outcome = agent.await.unwrap().unwrap();
    assert_eq!(outcome.instances.len(), 1);
    let instance_id = outcome.instances[0].id;

    let tenant = controller
        .repositories()
        .tenants
        .get(cluster.tenant_id)
        .await
        .unwrap()
        .unwrap();
    assert!(tenant.cnci.is_some());
    assert_eq!(tenant.resource(ResourceType::Instances).unwrap().usage, 1);

    let stored = controller
        .repositories()
        .instances
        .get(instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, InstanceState::Running);
    assert_eq!(stored.node_id, Some(cluster.node_id));

    // Delete goes through the agent and ends as record absence.
    controller
        .instances()
        .delete_instance(instance_id)
        .await
        .unwrap();
    answer_next(&mut cluster).await; // DELETE

    assert!(controller
        .repositories()
        .instances
        .get(instance_id)
        .await
        .unwrap()
        .is_none());
    let tenant = controller
        .repositories()
        .tenants
        .get(cluster.tenant_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tenant.resource(ResourceType::Instances).unwrap().usage, 0);
}

#[tokio::test]
async fn volume_round_trip_against_a_running_instance() {
    let mut cluster = cluster().await;
    let controller = cluster.controller.clone();

    let agent = {
        let tenant_id = cluster.tenant_id;
        let workload_id = cluster.workload_id;
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .instances()
                .start_workload(tenant_id, workload_id, 1, None)
                .await
        })
    };
    answer_next(&mut cluster).await;
    answer_next(&mut cluster).await;
    let instance_id = agent.await.unwrap().unwrap().instances[0].id;

    let volume = controller
        .volumes()
        .create_volume(cluster.tenant_id, 25, "data", "integration volume")
        .await
        .unwrap();

    controller
        .volumes()
        .attach_volume(cluster.tenant_id, volume.id, instance_id, None)
        .await
        .unwrap();
    answer_next(&mut cluster).await; // ATTACH

    let stored = controller
        .repositories()
        .volumes
        .get_block_device(volume.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, BlockState::InUse);

    controller
        .volumes()
        .detach_volume(cluster.tenant_id, volume.id, None)
        .await
        .unwrap();
    answer_next(&mut cluster).await; // DETACH

    let stored = controller
        .repositories()
        .volumes
        .get_block_device(volume.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, BlockState::Available);

    // Now deletable.
    controller
        .volumes()
        .delete_volume(cluster.tenant_id, volume.id)
        .await
        .unwrap();
}

#[tokio::test]
async fn stop_failure_lands_in_the_tenant_log() {
    let mut cluster = cluster().await;
    let controller = cluster.controller.clone();

    let agent = {
        let tenant_id = cluster.tenant_id;
        let workload_id = cluster.workload_id;
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .instances()
                .start_workload(tenant_id, workload_id, 1, None)
                .await
        })
    };
    answer_next(&mut cluster).await;
    answer_next(&mut cluster).await;
    let instance_id = agent.await.unwrap().unwrap().instances[0].id;

    controller
        .instances()
        .stop_instance(instance_id)
        .await
        .unwrap();
    let _stop = cluster.commands.recv().await.unwrap();
    controller
        .handle_event(AgentEvent::StopFailure {
            instance_id,
            reason: "instance is not running".to_string(),
        })
        .await
        .unwrap();

    let entries = controller.repositories().log.entries().await.unwrap();
    assert!(entries.iter().any(|e| e.message
        == format!("Stop Failure {instance_id}: instance is not running")));
}

#[tokio::test]
async fn concurrent_tenant_launches_share_one_concentrator() {
    let mut cluster = cluster().await;
    let controller = cluster.controller.clone();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let tenant_id = cluster.tenant_id;
        let workload_id = cluster.workload_id;
        let controller = controller.clone();
        handles.push(tokio::spawn(async move {
            controller
                .instances()
                .start_workload(tenant_id, workload_id, 1, None)
                .await
        }));
    }

    // Exactly one concentrator START comes out; answering it unblocks
    // every launch.
    match cluster.commands.recv().await.unwrap() {
        AgentCommand::Start {
            instance_id,
            tenant_id,
            concentrator: true,
            config: None,
        } => {
            controller
                .handle_event(AgentEvent::ConcentratorInstanceAdded {
                    instance_id,
                    tenant_id,
                    ip_address: "172.16.0.2".to_string(),
                    mac_address: String::new(),
                })
                .await
                .unwrap();
        }
        other => panic!("expected a concentrator launch, got {other:?}"),
    }

    for _ in 0..3 {
        answer_next(&mut cluster).await; // the three instance STARTs
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().instances.len(), 1);
    }
}
