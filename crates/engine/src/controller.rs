// EDB - Ethereum Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Suspending the VM at a pause until a command arrives.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use sdb_common::{DebugCommand, PauseNotification};
use thiserror::Error;
use tracing::debug;

/// Errors raised when delivering a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// Commands are only accepted while paused
    #[error("execution is not paused")]
    NotPaused,

    /// A command was already delivered for this pause
    #[error("a command is already pending")]
    CommandPending,
}

/// Whether the VM is running or waiting for a command.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ExecutionState {
    /// Executing instructions
    #[default]
    Running,
    /// Suspended at a pause
    Paused {
        /// What the pause shows
        notification: PauseNotification,
    },
}

#[derive(Debug, Default)]
struct ControllerState {
    state: ExecutionState,
    command: Option<DebugCommand>,
}

/// Hands control between the VM thread and the thread issuing commands.
///
/// The VM thread calls [`suspend`](Self::suspend) and blocks until another
/// thread calls [`send`](Self::send).
#[derive(Debug, Default)]
pub struct ExecutionController {
    inner: Mutex<ControllerState>,
    changed: Condvar,
}

impl ExecutionController {
    /// Creates a controller in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the paused state and blocks until a command is delivered.
    pub fn suspend(&self, notification: PauseNotification) -> DebugCommand {
        let mut inner = self.inner.lock();
        debug!(
            source = %notification.breakpoint.source,
            line = notification.breakpoint.line,
            "suspending"
        );
        inner.state = ExecutionState::Paused { notification };
        inner.command = None;
        self.changed.notify_all();

        loop {
            if let Some(command) = inner.command.take() {
                inner.state = ExecutionState::Running;
                self.changed.notify_all();
                debug!(%command, "resuming");
                return command;
            }
            self.changed.wait(&mut inner);
        }
    }

    /// Delivers a command to the paused VM.
    pub fn send(&self, command: DebugCommand) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, ExecutionState::Paused { .. }) {
            return Err(ControllerError::NotPaused);
        }
        if inner.command.is_some() {
            return Err(ControllerError::CommandPending);
        }
        inner.command = Some(command);
        self.changed.notify_all();
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> ExecutionState {
        self.inner.lock().state.clone()
    }

    /// Whether the VM is paused and has no command yet.
    pub fn is_paused(&self) -> bool {
        let inner = self.inner.lock();
        matches!(inner.state, ExecutionState::Paused { .. }) && inner.command.is_none()
    }

    /// Waits until the VM pauses, for at most `timeout`.
    pub fn wait_for_pause(&self, timeout: Duration) -> Option<PauseNotification> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let ExecutionState::Paused { notification } = &inner.state {
                if inner.command.is_none() {
                    return Some(notification.clone());
                }
            }
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use sdb_common::BreakpointHit;

    use super::*;

    fn notification(line: usize) -> PauseNotification {
        PauseNotification {
            breakpoint: BreakpointHit { line, source: "A.sol".into() },
            call_stack: vec![],
        }
    }

    #[test]
    fn test_commands_need_a_pause() {
        let controller = ExecutionController::new();
        assert_eq!(controller.send(DebugCommand::Resume), Err(ControllerError::NotPaused));
        assert_eq!(controller.state(), ExecutionState::Running);
        assert!(controller.wait_for_pause(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_suspend_until_command() {
        let controller = Arc::new(ExecutionController::new());
        let vm = {
            let controller = controller.clone();
            thread::spawn(move || {
                let first = controller.suspend(notification(3));
                let second = controller.suspend(notification(4));
                (first, second)
            })
        };

        let paused = controller.wait_for_pause(Duration::from_secs(5)).unwrap();
        assert_eq!(paused.breakpoint.line, 3);
        assert!(controller.is_paused());
        controller.send(DebugCommand::StepOver).unwrap();

        let paused = loop {
            let paused = controller.wait_for_pause(Duration::from_secs(5)).unwrap();
            if paused.breakpoint.line == 4 {
                break paused;
            }
        };
        assert_eq!(paused.breakpoint.source, "A.sol");
        controller.send(DebugCommand::Resume).unwrap();

        assert_eq!(vm.join().unwrap(), (DebugCommand::StepOver, DebugCommand::Resume));
        assert_eq!(controller.state(), ExecutionState::Running);
    }
}
