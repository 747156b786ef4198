// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Tenant aggregate and per-tenant resource quota counters.
//!
//! A tenant is created on first use and carries the identity of its network
//! concentrator instance (CNCI) once the bootstrap coordinator has
//! provisioned one. Quota counters only move through the repository's
//! `reserve`/`release` operations so that admission stays atomic.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::instance::InstanceId;

/// Unique identifier for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The resource dimensions a quota can bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Instances,
    VCpus,
    MemMb,
    DiskMb,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Instances => "instances",
            Self::VCpus => "vcpus",
            Self::MemMb => "mem_mb",
            Self::DiskMb => "disk_mb",
        };
        write!(f, "{s}")
    }
}

/// A quantity of one resource dimension, as demanded by a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedResource {
    pub kind: ResourceType,
    pub value: i64,
}

impl RequestedResource {
    pub fn new(kind: ResourceType, value: i64) -> Self {
        Self { kind, value }
    }
}

/// Quota counter for one resource dimension.
///
/// A limit of zero (or below) means the dimension is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceType,
    pub limit: i64,
    pub usage: i64,
}

impl Resource {
    pub fn unlimited(kind: ResourceType) -> Self {
        Self {
            kind,
            limit: 0,
            usage: 0,
        }
    }

    /// Whether admitting `request` more units would exceed the limit.
    pub fn over_limit(&self, request: i64) -> bool {
        self.limit > 0 && self.usage + request > self.limit
    }

    /// Usage never goes negative, even on a spurious release.
    pub fn apply(&mut self, delta: i64) {
        self.usage = (self.usage + delta).max(0);
    }
}

/// Identity of a tenant's provisioned network concentrator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnciInfo {
    pub instance_id: InstanceId,
    pub mac_address: String,
    pub ip_address: String,
}

/// Tenant aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Populated exactly once by the concentrator bootstrap coordinator.
    pub cnci: Option<CnciInfo>,
    pub resources: Vec<Resource>,
}

impl Tenant {
    /// Create a tenant with unbounded quotas on every dimension.
    pub fn new(id: TenantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cnci: None,
            resources: vec![
                Resource::unlimited(ResourceType::Instances),
                Resource::unlimited(ResourceType::VCpus),
                Resource::unlimited(ResourceType::MemMb),
                Resource::unlimited(ResourceType::DiskMb),
            ],
        }
    }

    pub fn has_concentrator(&self) -> bool {
        self.cnci.is_some()
    }

    pub fn resource(&self, kind: ResourceType) -> Option<&Resource> {
        self.resources.iter().find(|r| r.kind == kind)
    }

    pub fn resource_mut(&mut self, kind: ResourceType) -> Option<&mut Resource> {
        self.resources.iter_mut().find(|r| r.kind == kind)
    }

    pub fn set_limit(&mut self, kind: ResourceType, limit: i64) {
        match self.resource_mut(kind) {
            Some(r) => r.limit = limit,
            None => self.resources.push(Resource {
                kind,
                limit,
                usage: 0,
            }),
        }
    }

    /// Whether any of `demands` would push a counter over its limit.
    pub fn over_limit(&self, demands: &[RequestedResource]) -> bool {
        demands.iter().any(|d| {
            self.resource(d.kind)
                .map(|r| r.over_limit(d.value))
                .unwrap_or(false)
        })
    }

    /// Apply `demands` to the usage counters, scaled by `sign` (+1 admit,
    /// -1 release). Callers hold the tenant-scoped lock.
    pub fn commit_usage(&mut self, demands: &[RequestedResource], sign: i64) {
        for d in demands {
            match self.resource_mut(d.kind) {
                Some(r) => r.apply(d.value * sign),
                None => {
                    let mut r = Resource::unlimited(d.kind);
                    r.apply(d.value * sign);
                    self.resources.push(r);
                }
            }
        }
    }
}

/// Derive a concentrator hardware address from an IPv4 address.
///
/// The address is locally administered: `02:00` followed by the four
/// octets of the IP, so `172.16.0.2` maps to `02:00:ac:10:00:02`.
pub fn tenant_hardware_addr(ip: Ipv4Addr) -> String {
    let o = ip.octets();
    format!("02:00:{:02x}:{:02x}:{:02x}:{:02x}", o[0], o[1], o[2], o[3])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demands(instances: i64, vcpus: i64) -> Vec<RequestedResource> {
        vec![
            RequestedResource::new(ResourceType::Instances, instances),
            RequestedResource::new(ResourceType::VCpus, vcpus),
        ]
    }

    #[test]
    fn over_limit_boundary() {
        let r = Resource {
            kind: ResourceType::Instances,
            limit: 2,
            usage: 1,
        };
        assert!(!r.over_limit(1));
        assert!(r.over_limit(2));
    }

    #[test]
    fn zero_limit_is_unbounded() {
        let r = Resource::unlimited(ResourceType::MemMb);
        assert!(!r.over_limit(1_000_000));
    }

    #[test]
    fn tenant_admission_and_release() {
        let mut tenant = Tenant::new(TenantId::new(), "acme");
        tenant.set_limit(ResourceType::Instances, 1);

        let want = demands(1, 1);
        assert!(!tenant.over_limit(&want));
        tenant.commit_usage(&want, 1);

        assert!(tenant.over_limit(&want));
        tenant.commit_usage(&want, -1);
        assert!(!tenant.over_limit(&want));
    }

    #[test]
    fn usage_never_negative() {
        let mut tenant = Tenant::new(TenantId::new(), "acme");
        tenant.commit_usage(&demands(1, 1), -1);
        assert_eq!(
            tenant.resource(ResourceType::Instances).unwrap().usage,
            0
        );
    }

    #[test]
    fn hardware_addr_from_ip() {
        let hw = tenant_hardware_addr("172.16.0.2".parse().unwrap());
        assert_eq!(hw, "02:00:ac:10:00:02");
    }
}
