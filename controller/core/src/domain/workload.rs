// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Workload templates.
//!
//! A workload describes what an instance is created from: the image
//! reference, hypervisor, default resource demands and optional block
//! storage. Templates are read-only reference data and never mutated at
//! runtime.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::instance::InstanceId;
use crate::domain::tenant::{RequestedResource, TenantId};
use crate::domain::volume::VolumeId;

/// Unique identifier for a workload template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadId(pub Uuid);

impl WorkloadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hypervisor type the workload runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmType {
    Qemu,
    Docker,
}

/// Where the backing storage for a workload comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageSource {
    /// Bootable media resolved through the image service.
    Image { id: String },
    /// An existing block volume.
    Volume { id: VolumeId },
    /// A fresh, empty device.
    Empty,
}

/// Block storage demanded by a workload template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageResource {
    pub bootable: bool,
    pub persistent: bool,
    pub size_gb: i64,
    pub source: StorageSource,
}

/// Immutable template instances are created from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    pub id: WorkloadId,
    pub description: String,
    pub image_id: String,
    pub vm_type: VmType,
    pub defaults: Vec<RequestedResource>,
    pub storage: Option<StorageResource>,
}

impl Workload {
    /// Materialize the launch configuration for one new instance of this
    /// workload.
    pub fn launch_config(
        &self,
        instance_id: InstanceId,
        tenant_id: TenantId,
        trace_label: Option<String>,
    ) -> LaunchConfig {
        LaunchConfig {
            instance_id,
            tenant_id,
            workload_id: self.id,
            image_id: self.image_id.clone(),
            vm_type: self.vm_type,
            requested: self.defaults.clone(),
            persistent: self
                .storage
                .as_ref()
                .map(|s| s.persistent)
                .unwrap_or(false),
            trace_label,
        }
    }
}

/// Per-instance launch parameters carried in a START command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub instance_id: InstanceId,
    pub tenant_id: TenantId,
    pub workload_id: WorkloadId,
    pub image_id: String,
    pub vm_type: VmType,
    pub requested: Vec<RequestedResource>,
    pub persistent: bool,
    pub trace_label: Option<String>,
}
