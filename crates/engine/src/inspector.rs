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

//! revm adapter driving the [`Debugger`] from interpreter steps.

use std::{borrow::Borrow, sync::Arc};

use alloy_primitives::{Address, Bytes, U256};
use revm::{
    bytecode::opcode::OpCode,
    context::{BlockEnv, CfgEnv, ContextTr, LocalContextTr, TxEnv},
    interpreter::{
        interpreter_types::{InputsTr, Jumps},
        CallInput, CallInputs, CallOutcome, CreateInputs, CreateOutcome, Interpreter,
    },
    state::EvmState,
    Context, Database, DatabaseRef, Inspector,
};
use tracing::{debug, trace};

use crate::{Debugger, ExecutionController, StepEvent, StorageError, StorageProvider};

/// The EVM context the inspector runs in.
pub type EDBContext<DB> = Context<BlockEnv, TxEnv, CfgEnv, DB>;

/// Largest hash input recorded as a preimage.
const MAX_PREIMAGE_LEN: usize = 1024;

/// Bookkeeping for one VM frame.
#[derive(Debug, Default)]
struct FrameInfo {
    creation: bool,
    calldata: Option<Bytes>,
    linked: bool,
}

/// Storage as the running transaction sees it: journaled writes first, then
/// the underlying database.
struct JournaledStorage<'a, DB> {
    state: &'a EvmState,
    db: &'a DB,
}

impl<DB: DatabaseRef> StorageProvider for JournaledStorage<'_, DB> {
    fn storage(&self, address: Address, slot: U256) -> Result<U256, StorageError> {
        if let Some(value) =
            self.state.get(&address).and_then(|account| account.storage.get(&slot))
        {
            return Ok(value.present_value);
        }
        self.db.storage_ref(address, slot).map_err(|e| StorageError::new(address, slot, e))
    }
}

/// Inspector that feeds every interpreter step to a [`Debugger`] and blocks
/// the VM through an [`ExecutionController`] while paused.
#[derive(Debug)]
pub struct DebugInspector {
    debugger: Debugger,
    controller: Arc<ExecutionController>,
    frames: Vec<FrameInfo>,
}

impl DebugInspector {
    /// Creates an inspector. Keep a clone of `controller` to drive pauses.
    pub fn new(debugger: Debugger, controller: Arc<ExecutionController>) -> Self {
        Self { debugger, controller, frames: Vec::new() }
    }

    /// The debugger.
    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    /// The debugger, for breakpoint and registry changes between transactions.
    pub fn debugger_mut(&mut self) -> &mut Debugger {
        &mut self.debugger
    }

    /// Consumes the inspector.
    pub fn into_debugger(self) -> Debugger {
        self.debugger
    }

    /// The controller pauses are reported to.
    pub fn controller(&self) -> &Arc<ExecutionController> {
        &self.controller
    }

    fn push_frame(&mut self, creation: bool) {
        self.frames.push(FrameInfo { creation, ..Default::default() });
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
        if self.frames.is_empty() {
            self.debugger.after_transaction();
        }
    }

    /// Records the input of a `KECCAK256` about to execute.
    fn record_hash_input(&mut self, stack: &[U256], memory: &[u8]) {
        let [.., size, offset] = stack else { return };
        let (Ok(offset), Ok(size)) = (usize::try_from(*offset), usize::try_from(*size)) else {
            return;
        };
        if !(32..=MAX_PREIMAGE_LEN).contains(&size) {
            return;
        }

        // Bytes past the end of memory read as zero.
        let mut data = vec![0u8; size];
        if let Some(available) = memory.get(offset..) {
            let n = available.len().min(size);
            data[..n].copy_from_slice(&available[..n]);
        }
        let hash = self.debugger.record_preimage(&data);
        trace!(%hash, size, "recorded preimage");
    }
}

impl<DB> Inspector<EDBContext<DB>> for DebugInspector
where
    DB: Database + DatabaseRef,
{
    fn step(&mut self, interp: &mut Interpreter, ctx: &mut EDBContext<DB>) {
        let Some(depth) = self.frames.len().checked_sub(1) else { return };
        let Some(frame) = self.frames.last_mut() else { return };

        let address = interp.input.target_address();
        let code_address = interp.input.bytecode_address().cloned().unwrap_or(address);
        if !frame.linked {
            frame.linked = true;
            if !self.debugger.registry().is_linked(&code_address) {
                let code = interp.bytecode.bytes();
                if self.debugger.registry_mut().link_by_code(code_address, &code, frame.creation) {
                    debug!(address = %code_address, creation = frame.creation, "linked by code");
                }
            }
        }

        if frame.calldata.is_none() {
            let calldata = match interp.input.input() {
                CallInput::SharedBuffer(range) => ctx
                    .local()
                    .shared_memory_buffer_slice(range.clone())
                    .map(|slice| Bytes::from(slice.to_vec()))
                    .unwrap_or_default(),
                CallInput::Bytes(bytes) => bytes.clone(),
            };
            frame.calldata = Some(calldata);
        }
        let creation = frame.creation;
        let calldata = frame.calldata.clone().unwrap_or_default();

        let opcode = interp.bytecode.opcode();
        let stack = interp.stack.data().clone();
        let memory = {
            let mem_ref = interp.memory.borrow();
            mem_ref.context_memory().to_vec()
        };

        if opcode == OpCode::KECCAK256.get() {
            self.record_hash_input(&stack, &memory);
        }

        let event = StepEvent {
            pc: interp.bytecode.pc(),
            opcode,
            depth,
            address,
            creation,
            stack: &stack,
            memory: &memory,
            calldata: &calldata,
        };
        let storage = JournaledStorage {
            state: &ctx.journaled_state.state,
            db: &ctx.journaled_state.database,
        };
        let Some(notification) = self.debugger.on_step(&event, &storage) else { return };

        let command = self.controller.suspend(notification);
        debug!(%command, "resuming");
        self.debugger.apply(command);
    }

    fn call(&mut self, _ctx: &mut EDBContext<DB>, _inputs: &mut CallInputs) -> Option<CallOutcome> {
        self.push_frame(false);
        None
    }

    fn call_end(
        &mut self,
        _ctx: &mut EDBContext<DB>,
        _inputs: &CallInputs,
        _outcome: &mut CallOutcome,
    ) {
        self.pop_frame();
    }

    fn create(
        &mut self,
        _ctx: &mut EDBContext<DB>,
        _inputs: &mut CreateInputs,
    ) -> Option<CreateOutcome> {
        self.push_frame(true);
        None
    }

    fn create_end(
        &mut self,
        _ctx: &mut EDBContext<DB>,
        _inputs: &CreateInputs,
        _outcome: &mut CreateOutcome,
    ) {
        self.pop_frame();
    }
}
