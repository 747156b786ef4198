// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Infrastructure adapters: configuration, storage, transport and the
//! event bus.

pub mod config;
pub mod event_bus;
pub mod repositories;
pub mod transport;
