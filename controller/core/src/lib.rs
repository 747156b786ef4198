// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Orchestration core of the Strato cluster controller.
//!
//! The controller admits workloads against per-tenant quotas, drives the
//! instance and volume state machines over a fire-and-forget agent
//! command protocol, and bootstraps one network concentrator per tenant.
//! Commands are correlated with the events that answer them; commands
//! that are never answered are expired and compensated.
//!
//! Layout follows a hexagonal split: `domain` holds the aggregates and
//! their state machines, `application` the managers and the facade,
//! `infrastructure` the adapters (storage, transport, config, events).

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::controller::{Controller, Repositories};
pub use application::error::ControllerError;
pub use infrastructure::config::ControllerConfig;
pub use infrastructure::event_bus::{ClusterEvent, EventBus, EventReceiver};
