// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy of the orchestration core.
//!
//! Synchronous validation errors are returned to the caller and cause no
//! state change. Asynchronous agent rejections and timeouts are never
//! returned to the original caller; they surface as compensating state
//! rollbacks plus event-log entries.

use thiserror::Error;

use crate::domain::command::TransportError;
use crate::domain::instance::{InstanceError, InstanceId};
use crate::domain::repository::RepositoryError;
use crate::domain::tenant::TenantId;
use crate::domain::volume::{VolumeError, VolumeId};
use crate::domain::workload::WorkloadId;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("tenant {0} is over quota")]
    QuotaExceeded(TenantId),

    #[error("cannot perform operation: instance {0} not assigned to a node")]
    NotAssigned(InstanceId),

    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),

    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("workload not found: {0}")]
    WorkloadNotFound(WorkloadId),

    #[error("volume not found: {0}")]
    VolumeNotFound(VolumeId),

    #[error("volume {0} is not owned by the requesting tenant")]
    VolumeOwnerMismatch(VolumeId),

    #[error("volume {0} is not available")]
    VolumeNotAvailable(VolumeId),

    #[error("volume {0} is not attached")]
    VolumeNotAttached(VolumeId),

    #[error("detach by attachment id is not supported")]
    UnsupportedOperation,

    #[error("agent rejected command: {0}")]
    AgentRejected(String),

    #[error("timed out waiting for agent response")]
    Timeout,

    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
