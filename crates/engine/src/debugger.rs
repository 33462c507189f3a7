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

//! The debugger: call-stack and breakpoint tracing over VM steps.

use alloy_primitives::{Address, B256};
use eyre::{Result, WrapErr};
use sdb_common::{Breakpoint, BreakpointRequest, DebugCommand, PauseNotification};
use tracing::{debug, info};

use crate::{
    BreakpointTracer, CallStackTracer, CompilerArtifacts, DebugRegistry, DebugUnit,
    DebuggerConfig, PreimageDictionary, SnapshotContext, StepEvent, StepMode, StorageProvider,
};

/// Source-level debugger for one VM context.
///
/// Feed it every executed instruction with [`on_step`](Self::on_step). When
/// that returns a notification the VM must not continue until a command has
/// been applied with [`apply`](Self::apply).
#[derive(Debug, Clone, Default)]
pub struct Debugger {
    config: DebuggerConfig,
    registry: DebugRegistry,
    call_stack: CallStackTracer,
    breakpoints: BreakpointTracer,
    preimages: PreimageDictionary,
}

impl Debugger {
    /// Creates a debugger without debug information.
    pub fn new(config: DebuggerConfig) -> Self {
        Self { config, ..Default::default() }
    }

    /// Creates a debugger over an existing registry.
    pub fn with_registry(config: DebuggerConfig, registry: DebugRegistry) -> Self {
        Self { config, registry, ..Default::default() }
    }

    /// Configuration.
    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// Debug information.
    pub fn registry(&self) -> &DebugRegistry {
        &self.registry
    }

    /// Debug information, for adding units and links.
    pub fn registry_mut(&mut self) -> &mut DebugRegistry {
        &mut self.registry
    }

    /// The reconstructed call stack.
    pub fn call_stack(&self) -> &CallStackTracer {
        &self.call_stack
    }

    /// Hash preimages recorded so far.
    pub fn preimages(&self) -> &PreimageDictionary {
        &self.preimages
    }

    /// Current stepping mode.
    pub fn step_mode(&self) -> StepMode {
        self.breakpoints.mode()
    }

    /// Builds debug information for a compilation and returns its unit index.
    pub fn load_artifacts(&mut self, artifacts: &CompilerArtifacts) -> Result<usize> {
        let unit = DebugUnit::build(artifacts).wrap_err("failed to build debug information")?;
        Ok(self.registry.add_unit(unit))
    }

    /// Declares that `address` runs contract `name` of unit `unit`.
    pub fn link(&mut self, address: Address, unit: usize, name: &str) -> Result<()> {
        self.registry
            .link(address, unit, name)
            .wrap_err_with(|| format!("failed to link {address} to `{name}`"))
    }

    /// Records the input of a `KECCAK256`.
    pub fn record_preimage(&mut self, data: &[u8]) -> B256 {
        self.preimages.record(data)
    }

    /// Traces one instruction. Returns a notification if execution must
    /// pause before it.
    pub fn on_step(
        &mut self,
        event: &StepEvent<'_>,
        storage: &dyn StorageProvider,
    ) -> Option<PauseNotification> {
        let mapping = self.call_stack.trace(event, &self.registry)?;
        let hit = self.breakpoints.check(&mapping, self.call_stack.depth())?;
        info!(source = %hit.source, line = hit.line, pc = event.pc, "paused");

        let ctx = SnapshotContext {
            registry: &self.registry,
            preimages: &self.preimages,
            config: &self.config,
            storage,
        };
        Some(ctx.notification(hit, self.call_stack.frames(), event))
    }

    /// Applies the command that ends a pause.
    pub fn apply(&mut self, command: DebugCommand) {
        match command {
            DebugCommand::Resume => self.resume(),
            DebugCommand::StepInto => self.step_into(),
            DebugCommand::StepOver => self.step_over(),
            DebugCommand::StepOut => self.step_out(),
        }
    }

    /// Continues to the next breakpoint.
    pub fn resume(&mut self) {
        debug!("resume");
    }

    /// Stops at the next line.
    pub fn step_into(&mut self) {
        self.breakpoints.set_mode(StepMode::StepInto);
    }

    /// Stops at the next line that is not inside a deeper call.
    pub fn step_over(&mut self) {
        self.breakpoints.set_mode(StepMode::StepOver { depth: self.call_stack.depth() });
    }

    /// Stops at the next line of a caller.
    pub fn step_out(&mut self) {
        self.breakpoints.set_mode(StepMode::StepOut { depth: self.call_stack.depth() });
    }

    /// Clears per-transaction tracing state. Breakpoints are kept.
    pub fn after_transaction(&mut self) {
        debug!("transaction finished, resetting tracers");
        self.call_stack.reset();
        self.breakpoints.reset();
    }

    /// An independent copy for speculative execution.
    ///
    /// Debug information is shared. Preimages and breakpoint state are copied
    /// and the copy starts with no call frames.
    pub fn fork(&self) -> Self {
        Self {
            config: self.config.clone(),
            registry: self.registry.clone(),
            call_stack: CallStackTracer::new(),
            breakpoints: self.breakpoints.clone(),
            preimages: self.preimages.clone(),
        }
    }

    /// Registers breakpoints and returns those that were not set before.
    pub fn set_breakpoints(
        &mut self,
        requests: impl IntoIterator<Item = BreakpointRequest>,
    ) -> Vec<Breakpoint> {
        requests
            .into_iter()
            .map(Breakpoint::from)
            .filter(|bp| self.breakpoints.add(bp.clone()))
            .collect()
    }

    /// Makes `lines` the only breakpoints of `source`.
    pub fn replace_breakpoints(&mut self, source: &str, lines: impl IntoIterator<Item = usize>) {
        self.breakpoints.replace(source, lines);
    }

    /// Removes breakpoints and returns how many were set.
    pub fn remove_breakpoints<'a>(
        &mut self,
        breakpoints: impl IntoIterator<Item = &'a Breakpoint>,
    ) -> usize {
        breakpoints.into_iter().filter(|bp| self.breakpoints.remove(bp)).count()
    }

    /// Removes every breakpoint.
    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Registered breakpoints.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.breakpoints().cloned().collect()
    }
}
