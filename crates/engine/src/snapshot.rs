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

//! Pause notifications: the decoded call stack at a breakpoint.

use alloy_primitives::U256;
use sdb_common::{BreakpointHit, CallSnapshot, MappingInfo, PauseNotification, VariableSnapshot};
use tracing::{debug, warn};

use crate::{
    AccountStorage, CallFrame, DebugRegistry, DebuggerConfig, DecodeError, Method,
    PreimageDictionary, ResolvedCode, SolType, SolValue, SourceMapping, StackView, StepEvent,
    StorageContext, StorageCursor, StorageProvider, Variable, VariableKind,
};

/// Everything needed to decode variables at a pause.
#[derive(Clone, Copy)]
pub struct SnapshotContext<'a> {
    /// Debug information
    pub registry: &'a DebugRegistry,
    /// Recorded hash preimages
    pub preimages: &'a PreimageDictionary,
    /// Decoding settings
    pub config: &'a DebuggerConfig,
    /// Account storage
    pub storage: &'a dyn StorageProvider,
}

impl SnapshotContext<'_> {
    /// Builds the notification for `hit`, innermost call first.
    ///
    /// The top frame is decoded against the live machine state of `event`,
    /// outer frames against the state they saved when they made their call.
    pub fn notification(
        &self,
        hit: BreakpointHit,
        frames: &[CallFrame],
        event: &StepEvent<'_>,
    ) -> PauseNotification {
        let mut call_stack = Vec::new();
        for (index, frame) in frames.iter().enumerate().rev() {
            let (stack, memory) = if index + 1 == frames.len() {
                (event.stack, event.memory)
            } else {
                (frame.stack.as_slice(), frame.memory.as_ref())
            };
            self.frame_calls(frame, stack, memory, &mut call_stack);
        }
        PauseNotification { breakpoint: hit, call_stack }
    }

    fn storage_context<'b>(&'b self, frame: &CallFrame) -> StorageContext<'b> {
        StorageContext {
            storage: AccountStorage::new(self.storage, frame.address),
            preimages: self.preimages,
            limits: self.config.limits(),
        }
    }

    fn frame_calls(
        &self,
        frame: &CallFrame,
        stack: &[U256],
        memory: &[u8],
        out: &mut Vec<CallSnapshot>,
    ) {
        if frame.calls.is_empty() {
            return;
        }
        let Some(code) = self.registry.resolve(&frame.code_address, frame.creation) else {
            debug!(address = %frame.code_address, "frame without debug information");
            return;
        };
        let symbols = &code.unit.symbols;

        let (storage, error) = if self.config.decode_storage {
            match self.storage_variables(frame, &code) {
                Ok(vars) => (vars, None),
                Err(err) => {
                    warn!(address = %frame.address, %err, "failed to decode storage");
                    (Vec::new(), Some(err.to_string()))
                }
            }
        } else {
            (Vec::new(), None)
        };

        let view = StackView {
            stack,
            memory,
            calldata: &frame.calldata,
            storage: Some(self.storage_context(frame)),
            limits: self.config.limits(),
        };

        for call in frame.calls.iter().rev() {
            let Some(method) = symbols.method(call.method) else { continue };
            let base = frame.stack_base + call.stack_offset;
            let mut name = symbols.qualified_name(call.method);
            let mut vars = decode_method_variables(method, base, call.mapping.as_ref(), &view);

            if let Some(invocation) = call.modifier.and_then(|index| method.modifiers.get(index)) {
                if let Some(modifier) = invocation.method.and_then(|id| symbols.method(id)) {
                    name = format!("{name} > {}", modifier.name);
                    vars.extend(decode_method_variables(
                        modifier,
                        base + invocation.stack_offset,
                        call.mapping.as_ref(),
                        &view,
                    ));
                }
            }

            out.push(CallSnapshot {
                name,
                mapping: call.mapping.as_ref().and_then(mapping_info),
                storage: storage.clone(),
                vars,
                error: error.clone(),
            });
        }
    }

    fn storage_variables(
        &self,
        frame: &CallFrame,
        code: &ResolvedCode<'_>,
    ) -> Result<Vec<VariableSnapshot>, DecodeError> {
        let Some(contract) = code.unit.symbols.contract(code.contract) else {
            return Ok(Vec::new());
        };
        let ctx = self.storage_context(frame);

        let mut vars = Vec::with_capacity(contract.storage_layout.len());
        for var in &contract.storage_layout {
            let (Some(ty), Some((slot, offset))) = (&var.ty, var.storage) else { continue };
            let value = ty.decode_storage(&mut StorageCursor::at(slot, offset), &ctx)?;
            vars.push(variable_snapshot(var, ty, &value));
        }
        Ok(vars)
    }
}

/// Decodes the named variables of `method` visible at `mapping`, laid out
/// from stack slot `base`.
fn decode_method_variables(
    method: &Method,
    base: usize,
    mapping: Option<&SourceMapping>,
    view: &StackView<'_>,
) -> Vec<VariableSnapshot> {
    let position = mapping.and_then(|m| m.span.as_ref()).map(|span| (span.file, span.start));

    method
        .variables()
        .filter(|var| !var.name.is_empty())
        .filter(|var| match position {
            Some((file, position)) => var.is_visible_at(file, position),
            None => var.kind != VariableKind::Local,
        })
        .filter_map(|var| decode_variable(var, base, view))
        .collect()
}

fn variable_snapshot(var: &Variable, ty: &SolType, value: &SolValue) -> VariableSnapshot {
    VariableSnapshot { name: var.name.clone(), ty: ty.to_string(), value: value.to_json() }
}

fn decode_variable(var: &Variable, base: usize, view: &StackView<'_>) -> Option<VariableSnapshot> {
    let Some(ty) = &var.ty else {
        debug!(
            name = %var.name,
            descriptor = %var.descriptor,
            "skipping variable of unsupported type"
        );
        return None;
    };
    match ty.decode_stack(base + var.stack_offset, var.location, view) {
        Ok(value) => Some(variable_snapshot(var, ty, &value)),
        Err(err) => {
            debug!(name = %var.name, %err, "dropping variable");
            None
        }
    }
}

fn mapping_info(mapping: &SourceMapping) -> Option<MappingInfo> {
    let span = mapping.span.as_ref()?;
    Some(MappingInfo {
        pc: mapping.pc,
        line: span.start.line,
        column: span.start.column,
        file_index: span.file,
        source: span.path.to_string(),
        jump: mapping.jump.as_char(),
    })
}

