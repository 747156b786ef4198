// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

pub mod command;
pub mod events;
pub mod instance;
pub mod repository;
pub mod tenant;
pub mod volume;
pub mod workload;
