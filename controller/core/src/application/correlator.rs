// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Command correlator.
//!
//! Every outbound command creates an obligation to observe a matching
//! result or error event for its subject identifier. Obligations live only
//! in memory, between dispatch and settlement; one obligation is held per
//! subject, and re-registering replaces it: an event is only meaningful
//! relative to the most recent command issued for that subject.
//!
//! Obligations that outlive the command timeout are drained by
//! `expire_overdue` and treated as failures for compensation purposes; this
//! is the safety net against records stuck in `pending`/`attaching`/
//! `detaching` when an agent never answers.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::domain::command::CommandKind;

/// The expectation of a future correlated result or error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obligation {
    pub subject: Uuid,
    pub kind: CommandKind,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct CommandCorrelator {
    outstanding: DashMap<Uuid, Obligation>,
}

impl CommandCorrelator {
    pub fn new() -> Self {
        Self {
            outstanding: DashMap::new(),
        }
    }

    /// Record that a command for `subject` was dispatched.
    pub fn register(&self, subject: Uuid, kind: CommandKind) {
        let previous = self.outstanding.insert(
            subject,
            Obligation {
                subject,
                kind,
                issued_at: Utc::now(),
            },
        );
        if let Some(prev) = previous {
            debug!(%subject, kind = %prev.kind, "obligation superseded by newer command");
        }
    }

    /// Settle the obligation for `subject` if its kind matches the event.
    ///
    /// Returns `None` for duplicate, stale, or never-registered events;
    /// the owning manager treats those as idempotent no-ops. An obligation
    /// for a different kind is left in place untouched.
    pub fn settle(&self, subject: Uuid, kind: CommandKind) -> Option<Obligation> {
        self.outstanding
            .remove_if(&subject, |_, o| o.kind == kind)
            .map(|(_, o)| o)
    }

    pub fn is_outstanding(&self, subject: Uuid) -> bool {
        self.outstanding.contains_key(&subject)
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Drain every obligation older than `timeout`.
    pub fn expire_overdue(&self, timeout: Duration) -> Vec<Obligation> {
        let cutoff = Utc::now() - timeout;
        let overdue: Vec<Uuid> = self
            .outstanding
            .iter()
            .filter(|entry| entry.issued_at < cutoff)
            .map(|entry| entry.subject)
            .collect();

        overdue
            .into_iter()
            .filter_map(|subject| {
                self.outstanding
                    .remove_if(&subject, |_, o| o.issued_at < cutoff)
                    .map(|(_, o)| o)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_removes_matching_obligation() {
        let correlator = CommandCorrelator::new();
        let subject = Uuid::new_v4();

        correlator.register(subject, CommandKind::Start);
        assert!(correlator.is_outstanding(subject));

        let settled = correlator.settle(subject, CommandKind::Start).unwrap();
        assert_eq!(settled.kind, CommandKind::Start);
        assert!(!correlator.is_outstanding(subject));
    }

    #[test]
    fn duplicate_settle_is_none() {
        let correlator = CommandCorrelator::new();
        let subject = Uuid::new_v4();

        correlator.register(subject, CommandKind::Stop);
        assert!(correlator.settle(subject, CommandKind::Stop).is_some());
        assert!(correlator.settle(subject, CommandKind::Stop).is_none());
    }

    #[test]
    fn mismatched_kind_leaves_obligation() {
        let correlator = CommandCorrelator::new();
        let subject = Uuid::new_v4();

        correlator.register(subject, CommandKind::AttachVolume);
        assert!(correlator.settle(subject, CommandKind::DetachVolume).is_none());
        assert!(correlator.is_outstanding(subject));
    }

    #[test]
    fn register_replaces_previous_command() {
        let correlator = CommandCorrelator::new();
        let subject = Uuid::new_v4();

        correlator.register(subject, CommandKind::Stop);
        correlator.register(subject, CommandKind::Restart);

        assert!(correlator.settle(subject, CommandKind::Stop).is_none());
        assert!(correlator.settle(subject, CommandKind::Restart).is_some());
    }

    #[test]
    fn expire_overdue_drains_only_old_obligations() {
        let correlator = CommandCorrelator::new();
        let old = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        correlator.register(old, CommandKind::Start);
        if let Some(mut entry) = correlator.outstanding.get_mut(&old) {
            entry.issued_at = Utc::now() - Duration::minutes(10);
        }
        correlator.register(fresh, CommandKind::Start);

        let expired = correlator.expire_overdue(Duration::minutes(5));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].subject, old);
        assert!(correlator.is_outstanding(fresh));
    }
}
