// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Persistence contracts for each aggregate root.
//!
//! One repository per aggregate, interface defined here, implemented in
//! `crate::infrastructure::repositories`. The persistence collaborator
//! never originates state changes; it stores what the managers tell it.
//!
//! The tenant repository additionally owns the atomic read-modify-write
//! for quota counters: `reserve` must perform the over-limit check and the
//! usage increment under one tenant-scoped critical section so that two
//! concurrent admissions cannot both observe pre-increment usage.

use async_trait::async_trait;

use crate::domain::events::LogEntry;
use crate::domain::instance::{Instance, InstanceId};
use crate::domain::tenant::{CnciInfo, RequestedResource, Tenant, TenantId};
use crate::domain::volume::{AttachmentId, BlockData, StorageAttachment, VolumeId};
use crate::domain::workload::{Workload, WorkloadId};

/// Repository interface for Tenant aggregates and their quota counters.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn add(&self, tenant: Tenant) -> Result<(), RepositoryError>;

    async fn get(&self, id: TenantId) -> Result<Option<Tenant>, RepositoryError>;

    /// Atomically check `demands` against the tenant's limits and, if
    /// admitted, commit the usage increment. Returns `false` on quota
    /// denial, with no counter changed.
    async fn reserve(
        &self,
        id: TenantId,
        demands: &[RequestedResource],
    ) -> Result<bool, RepositoryError>;

    /// Release previously reserved usage.
    async fn release(
        &self,
        id: TenantId,
        demands: &[RequestedResource],
    ) -> Result<(), RepositoryError>;

    /// Record the tenant's provisioned concentrator identity.
    async fn set_concentrator(&self, id: TenantId, cnci: CnciInfo)
        -> Result<(), RepositoryError>;

    async fn set_limit(
        &self,
        id: TenantId,
        kind: crate::domain::tenant::ResourceType,
        limit: i64,
    ) -> Result<(), RepositoryError>;
}

/// Repository interface for Workload templates (read-mostly).
#[async_trait]
pub trait WorkloadRepository: Send + Sync {
    async fn add(&self, workload: Workload) -> Result<(), RepositoryError>;

    async fn get(&self, id: WorkloadId) -> Result<Option<Workload>, RepositoryError>;

    async fn list(&self) -> Result<Vec<Workload>, RepositoryError>;
}

/// Repository interface for Instance aggregates. Deleting the record is
/// the terminal "deleted" state; lookups after deletion return `None`.
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    async fn add(&self, instance: Instance) -> Result<(), RepositoryError>;

    async fn get(&self, id: InstanceId) -> Result<Option<Instance>, RepositoryError>;

    async fn update(&self, instance: &Instance) -> Result<(), RepositoryError>;

    async fn delete(&self, id: InstanceId) -> Result<(), RepositoryError>;

    async fn list_by_tenant(&self, tenant_id: TenantId)
        -> Result<Vec<Instance>, RepositoryError>;
}

/// Repository interface for block devices and their attachment records.
#[async_trait]
pub trait VolumeRepository: Send + Sync {
    async fn add_block_device(&self, data: BlockData) -> Result<(), RepositoryError>;

    async fn get_block_device(&self, id: VolumeId)
        -> Result<Option<BlockData>, RepositoryError>;

    async fn update_block_device(&self, data: &BlockData) -> Result<(), RepositoryError>;

    async fn delete_block_device(&self, id: VolumeId) -> Result<(), RepositoryError>;

    async fn list_by_tenant(&self, tenant_id: TenantId)
        -> Result<Vec<BlockData>, RepositoryError>;

    async fn add_attachment(&self, attachment: StorageAttachment)
        -> Result<(), RepositoryError>;

    async fn attachment_for_volume(
        &self,
        volume_id: VolumeId,
    ) -> Result<Option<StorageAttachment>, RepositoryError>;

    async fn delete_attachment(&self, id: AttachmentId) -> Result<(), RepositoryError>;
}

/// Repository interface for the append-only event log.
#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn append(&self, entry: LogEntry) -> Result<(), RepositoryError>;

    async fn entries(&self) -> Result<Vec<LogEntry>, RepositoryError>;

    async fn clear(&self) -> Result<(), RepositoryError>;
}

/// Repository errors.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
