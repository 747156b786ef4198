// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Application services: the managers that drive the domain state
//! machines, the command correlator, and the orchestration facade.

pub mod concentrator;
pub mod controller;
pub mod correlator;
pub mod error;
pub mod instance_manager;
pub mod serial;
pub mod volume_manager;
