// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Concentrator bootstrap coordinator.
//!
//! Every tenant needs exactly one network concentrator instance (CNCI)
//! before any of its workloads can launch. The first start request for a
//! tenant triggers the launch; concurrent requests for the same tenant
//! coalesce onto the in-flight bootstrap instead of launching their own.
//! All callers block until the concentrator reports in or the bootstrap
//! deadline passes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::application::correlator::CommandCorrelator;
use crate::application::error::ControllerError;
use crate::domain::command::{AgentCommand, CommandKind, CommandSender};
use crate::domain::events::{ConcentratorEvent, LogEntry};
use crate::domain::instance::InstanceId;
use crate::domain::repository::{LogRepository, TenantRepository};
use crate::domain::tenant::{tenant_hardware_addr, CnciInfo, TenantId};
use crate::infrastructure::event_bus::EventBus;

pub struct ConcentratorBootstrap {
    tenants: Arc<dyn TenantRepository>,
    log: Arc<dyn LogRepository>,
    sender: Arc<dyn CommandSender>,
    correlator: Arc<CommandCorrelator>,
    event_bus: EventBus,
    deadline: Duration,
    in_flight: Mutex<HashMap<TenantId, watch::Sender<Option<CnciInfo>>>>,
}

impl ConcentratorBootstrap {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        log: Arc<dyn LogRepository>,
        sender: Arc<dyn CommandSender>,
        correlator: Arc<CommandCorrelator>,
        event_bus: EventBus,
        deadline: Duration,
    ) -> Self {
        Self {
            tenants,
            log,
            sender,
            correlator,
            event_bus,
            deadline,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Block until the tenant has a ready concentrator.
    ///
    /// Fast path: the tenant already has one, return it. Otherwise join
    /// the in-flight bootstrap for this tenant, or start one if none
    /// exists; exactly one START command goes out no matter how many
    /// callers arrive concurrently.
    pub async fn ensure_ready(&self, tenant_id: TenantId) -> Result<CnciInfo, ControllerError> {
        let tenant = self
            .tenants
            .get(tenant_id)
            .await?
            .ok_or(ControllerError::TenantNotFound(tenant_id))?;
        if let Some(cnci) = tenant.cnci {
            return Ok(cnci);
        }

        let (mut rx, launch) = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&tenant_id) {
                Some(tx) => (tx.subscribe(), None),
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(tenant_id, tx);
                    let instance_id = InstanceId::new();
                    (rx, Some(instance_id))
                }
            }
        };

        if let Some(instance_id) = launch {
            info!(%tenant_id, %instance_id, "launching concentrator");
            self.correlator.register(instance_id.0, CommandKind::Start);
            let dispatch = self
                .sender
                .send(AgentCommand::Start {
                    instance_id,
                    tenant_id,
                    concentrator: true,
                    config: None,
                })
                .await;
            if let Err(e) = dispatch {
                self.correlator.settle(instance_id.0, CommandKind::Start);
                self.in_flight.lock().remove(&tenant_id);
                return Err(e.into());
            }
            self.event_bus
                .publish_concentrator_event(ConcentratorEvent::ConcentratorLaunched {
                    instance_id,
                    tenant_id,
                    launched_at: Utc::now(),
                });
        }

        // Clone out of the watch guard right away; holding it across an
        // await would pin a read guard inside the future.
        let waited = tokio::time::timeout(self.deadline, rx.wait_for(|v| v.is_some()))
            .await
            .map(|r| r.map(|value| value.clone()));
        match waited {
            Ok(Ok(Some(cnci))) => Ok(cnci),
            Ok(Ok(None)) | Ok(Err(_)) | Err(_) => {
                // Clear the marker so a later request can retry the launch.
                self.in_flight.lock().remove(&tenant_id);
                warn!(%tenant_id, "concentrator bootstrap timed out");
                self.log
                    .append(LogEntry::error(
                        tenant_id,
                        "timed out waiting for concentrator",
                    ))
                    .await?;
                Err(ControllerError::Timeout)
            }
        }
    }

    /// The network agent reported a concentrator for `tenant_id`.
    ///
    /// Records the identity on the tenant, wakes every coalesced waiter,
    /// and settles the launch obligation. A report for a tenant that
    /// already has a concentrator is ignored. An empty hardware address is
    /// filled in from the concentrator's IP.
    pub async fn on_concentrator_added(
        &self,
        instance_id: InstanceId,
        tenant_id: TenantId,
        ip_address: String,
        mac_address: String,
    ) -> Result<(), ControllerError> {
        self.correlator.settle(instance_id.0, CommandKind::Start);

        let tenant = self
            .tenants
            .get(tenant_id)
            .await?
            .ok_or(ControllerError::TenantNotFound(tenant_id))?;
        if let Some(existing) = tenant.cnci {
            // A waiter may have raced past the fast path before the record
            // landed; wake it with what we already have.
            if let Some(tx) = self.in_flight.lock().remove(&tenant_id) {
                let _ = tx.send(Some(existing));
            }
            return Ok(());
        }

        let mac_address = if mac_address.is_empty() {
            match ip_address.parse() {
                Ok(ip) => tenant_hardware_addr(ip),
                Err(_) => mac_address,
            }
        } else {
            mac_address
        };

        let cnci = CnciInfo {
            instance_id,
            mac_address,
            ip_address: ip_address.clone(),
        };
        self.tenants.set_concentrator(tenant_id, cnci.clone()).await?;
        info!(%tenant_id, %instance_id, %ip_address, "concentrator ready");

        if let Some(tx) = self.in_flight.lock().remove(&tenant_id) {
            let _ = tx.send(Some(cnci));
        }

        self.event_bus
            .publish_concentrator_event(ConcentratorEvent::ConcentratorReady {
                instance_id,
                tenant_id,
                ip_address,
                ready_at: Utc::now(),
            });
        Ok(())
    }
}
