// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Per-subject serialization.
//!
//! State transitions for one instance or volume id must not interleave:
//! a manager takes the subject's lock around each read-modify-write so a
//! concurrent attach/detach or stop/restart on the same id observes a
//! consistent prior state. Cross-subject ordering is not provided.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct SubjectLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for `subject`, creating it on first use.
    pub async fn acquire(&self, subject: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(subject)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop entries nobody holds or waits on, so the map tracks live
    /// subjects instead of every id ever seen. Holders and waiters keep a
    /// clone of the Arc, and clones only happen under the shard lock
    /// `retain` takes, so a sole reference cannot gain a waiter mid-sweep.
    pub fn sweep(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
