// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Command transport adapters.
//!
//! The core is agnostic to wire encoding: `ChannelCommandSender` hands
//! commands to whatever drains the channel (the wire-protocol layer in a
//! deployed controller), and `RecordingCommandSender` is the test double
//! used throughout the manager tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::command::{AgentCommand, CommandSender, TransportError};

/// Bridges the orchestration core to the wire-protocol layer through an
/// unbounded channel.
pub struct ChannelCommandSender {
    tx: mpsc::UnboundedSender<AgentCommand>,
}

impl ChannelCommandSender {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AgentCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CommandSender for ChannelCommandSender {
    async fn send(&self, command: AgentCommand) -> Result<(), TransportError> {
        debug!(kind = %command.kind(), subject = %command.subject(), "dispatching command");
        self.tx
            .send(command)
            .map_err(|e| TransportError::Unavailable(e.to_string()))
    }
}

/// Test double: records every dispatched command and can be told to fail
/// after a number of successful sends.
#[derive(Default)]
pub struct RecordingCommandSender {
    commands: Mutex<Vec<AgentCommand>>,
    fail_after: Mutex<Option<usize>>,
}

impl RecordingCommandSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send once `count` commands have been accepted.
    pub fn fail_after(&self, count: usize) {
        *self.fail_after.lock() = Some(count);
    }

    pub fn sent(&self) -> Vec<AgentCommand> {
        self.commands.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.commands.lock().len()
    }
}

#[async_trait]
impl CommandSender for RecordingCommandSender {
    async fn send(&self, command: AgentCommand) -> Result<(), TransportError> {
        let mut commands = self.commands.lock();
        if let Some(limit) = *self.fail_after.lock() {
            if commands.len() >= limit {
                return Err(TransportError::Unavailable("agent link down".to_string()));
            }
        }
        commands.push(command);
        Ok(())
    }
}
