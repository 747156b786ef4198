// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! In-memory repository implementations.
//!
//! HashMap-backed storage behind `parking_lot::RwLock`, used for tests and
//! self-contained deployments. The durable persistence engine is an
//! external collaborator; these implementations honor the same contracts,
//! most importantly the atomic quota reserve on the tenant repository:
//! the over-limit check and the usage increment happen under one write
//! lock, so concurrent admissions serialize.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::events::LogEntry;
use crate::domain::instance::{Instance, InstanceId};
use crate::domain::repository::{
    InstanceRepository, LogRepository, RepositoryError, TenantRepository, VolumeRepository,
    WorkloadRepository,
};
use crate::domain::tenant::{CnciInfo, RequestedResource, ResourceType, Tenant, TenantId};
use crate::domain::volume::{AttachmentId, BlockData, StorageAttachment, VolumeId};
use crate::domain::workload::{Workload, WorkloadId};

#[derive(Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn add(&self, tenant: Tenant) -> Result<(), RepositoryError> {
        self.tenants.write().insert(tenant.id, tenant);
        Ok(())
    }

    async fn get(&self, id: TenantId) -> Result<Option<Tenant>, RepositoryError> {
        Ok(self.tenants.read().get(&id).cloned())
    }

    async fn reserve(
        &self,
        id: TenantId,
        demands: &[RequestedResource],
    ) -> Result<bool, RepositoryError> {
        let mut tenants = self.tenants.write();
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        if tenant.over_limit(demands) {
            return Ok(false);
        }
        tenant.commit_usage(demands, 1);
        Ok(true)
    }

    async fn release(
        &self,
        id: TenantId,
        demands: &[RequestedResource],
    ) -> Result<(), RepositoryError> {
        let mut tenants = self.tenants.write();
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        tenant.commit_usage(demands, -1);
        Ok(())
    }

    async fn set_concentrator(
        &self,
        id: TenantId,
        cnci: CnciInfo,
    ) -> Result<(), RepositoryError> {
        let mut tenants = self.tenants.write();
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        tenant.cnci = Some(cnci);
        Ok(())
    }

    async fn set_limit(
        &self,
        id: TenantId,
        kind: ResourceType,
        limit: i64,
    ) -> Result<(), RepositoryError> {
        let mut tenants = self.tenants.write();
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        tenant.set_limit(kind, limit);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWorkloadRepository {
    workloads: RwLock<HashMap<WorkloadId, Workload>>,
}

impl InMemoryWorkloadRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkloadRepository for InMemoryWorkloadRepository {
    async fn add(&self, workload: Workload) -> Result<(), RepositoryError> {
        self.workloads.write().insert(workload.id, workload);
        Ok(())
    }

    async fn get(&self, id: WorkloadId) -> Result<Option<Workload>, RepositoryError> {
        Ok(self.workloads.read().get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Workload>, RepositoryError> {
        Ok(self.workloads.read().values().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryInstanceRepository {
    instances: RwLock<HashMap<InstanceId, Instance>>,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn add(&self, instance: Instance) -> Result<(), RepositoryError> {
        self.instances.write().insert(instance.id, instance);
        Ok(())
    }

    async fn get(&self, id: InstanceId) -> Result<Option<Instance>, RepositoryError> {
        Ok(self.instances.read().get(&id).cloned())
    }

    async fn update(&self, instance: &Instance) -> Result<(), RepositoryError> {
        let mut instances = self.instances.write();
        match instances.get_mut(&instance.id) {
            Some(existing) => {
                *existing = instance.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(instance.id.to_string())),
        }
    }

    async fn delete(&self, id: InstanceId) -> Result<(), RepositoryError> {
        self.instances.write().remove(&id);
        Ok(())
    }

    async fn list_by_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<Instance>, RepositoryError> {
        Ok(self
            .instances
            .read()
            .values()
            .filter(|i| i.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryVolumeRepository {
    blocks: RwLock<HashMap<VolumeId, BlockData>>,
    attachments: RwLock<HashMap<AttachmentId, StorageAttachment>>,
}

impl InMemoryVolumeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VolumeRepository for InMemoryVolumeRepository {
    async fn add_block_device(&self, data: BlockData) -> Result<(), RepositoryError> {
        self.blocks.write().insert(data.id, data);
        Ok(())
    }

    async fn get_block_device(
        &self,
        id: VolumeId,
    ) -> Result<Option<BlockData>, RepositoryError> {
        Ok(self.blocks.read().get(&id).cloned())
    }

    async fn update_block_device(&self, data: &BlockData) -> Result<(), RepositoryError> {
        let mut blocks = self.blocks.write();
        match blocks.get_mut(&data.id) {
            Some(existing) => {
                *existing = data.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(data.id.to_string())),
        }
    }

    async fn delete_block_device(&self, id: VolumeId) -> Result<(), RepositoryError> {
        self.blocks.write().remove(&id);
        Ok(())
    }

    async fn list_by_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<BlockData>, RepositoryError> {
        Ok(self
            .blocks
            .read()
            .values()
            .filter(|b| b.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn add_attachment(
        &self,
        attachment: StorageAttachment,
    ) -> Result<(), RepositoryError> {
        self.attachments.write().insert(attachment.id, attachment);
        Ok(())
    }

    async fn attachment_for_volume(
        &self,
        volume_id: VolumeId,
    ) -> Result<Option<StorageAttachment>, RepositoryError> {
        Ok(self
            .attachments
            .read()
            .values()
            .find(|a| a.block_id == volume_id)
            .cloned())
    }

    async fn delete_attachment(&self, id: AttachmentId) -> Result<(), RepositoryError> {
        self.attachments.write().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLogRepository {
    entries: RwLock<Vec<LogEntry>>,
}

impl InMemoryLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogRepository for InMemoryLogRepository {
    async fn append(&self, entry: LogEntry) -> Result<(), RepositoryError> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<LogEntry>, RepositoryError> {
        Ok(self.entries.read().clone())
    }

    async fn clear(&self) -> Result<(), RepositoryError> {
        self.entries.write().clear();
        Ok(())
    }
}
