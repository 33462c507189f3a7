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

use alloy_primitives::{Address, Bytes, U256};
use revm::bytecode::OpCode;
use sdb_common::OpcodeTr;
use tracing::{trace, warn};

use super::StepEvent;
use crate::{DebugRegistry, JumpType, MethodId, SourceMapping, SourceSpan, SymbolTable};

/// Whether a frame expects the next mapped instruction to enter a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameState {
    /// Waiting for the entry of a function
    #[default]
    AwaitingCall,
    /// Inside the top call
    Running,
}

/// An active function invocation inside a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// The function
    pub method: MethodId,
    /// Offset of its first variable from the frame's stack base
    pub stack_offset: usize,
    /// The instruction it is executing
    pub mapping: Option<SourceMapping>,
    /// Index of the modifier invocation being executed, if any
    pub modifier: Option<usize>,
    /// Whether execution has reached the function body
    pub entered: bool,
}

/// One EVM call frame and the source-level calls active in it.
#[derive(Debug, Clone, Default)]
pub struct CallFrame {
    /// Account whose storage the code runs against
    pub address: Address,
    /// Account whose code runs; a library for delegate calls
    pub code_address: Address,
    /// Whether the frame runs init code
    pub creation: bool,
    /// Frame input
    pub calldata: Bytes,
    /// Stack height below the first variable of the first call
    pub stack_base: usize,
    /// Stack saved when the frame last started a call
    pub stack: Vec<U256>,
    /// Memory saved when the frame last started a call
    pub memory: Bytes,
    /// Active calls, outermost first
    pub calls: Vec<Call>,
    /// Entry state
    pub state: FrameState,
}

impl CallFrame {
    fn new(event: &StepEvent<'_>, code_address: Address) -> Self {
        Self {
            address: event.address,
            code_address,
            creation: event.creation,
            calldata: Bytes::copy_from_slice(event.calldata),
            ..Default::default()
        }
    }

    fn enter(&mut self, method: MethodId, symbols: &SymbolTable, stack_height: usize) {
        let argument_slots = symbols.method(method).map(|m| m.argument_slots()).unwrap_or(0);

        // The external dispatcher and the function entry map to the same
        // definition; the second sighting only fixes the stack base.
        if let Some(top) = self.calls.last() {
            if top.method == method && !top.entered {
                if self.calls.len() == 1 {
                    self.stack_base = stack_height.saturating_sub(argument_slots);
                }
                return;
            }
        }

        let stack_offset = match self.calls.last() {
            None => {
                self.stack_base = stack_height.saturating_sub(argument_slots);
                0
            }
            Some(previous) => {
                let slots = symbols.method(previous.method).map(|m| m.total_slots).unwrap_or(0);
                previous.stack_offset + slots + 1
            }
        };
        trace!(method = %symbols.qualified_name(method), stack_offset, "entering call");
        self.calls.push(Call {
            method,
            stack_offset,
            mapping: None,
            modifier: None,
            entered: false,
        });
    }

    fn update(&mut self, mapping: &SourceMapping, span: &SourceSpan, symbols: &SymbolTable) {
        let Some(call) = self.calls.last_mut() else { return };
        call.mapping = Some(mapping.clone());
        let Some(method) = symbols.method(call.method) else { return };

        let (file, position) = (span.file, span.start);
        if method.in_body(file, position) {
            call.entered = true;
            if !method.in_declaration(file, position) {
                call.modifier = None;
                return;
            }
        }
        if let Some(index) = method.invocation_at(file, position) {
            call.modifier = Some(index);
        } else if let Some(index) = method.modifiers.iter().position(|invocation| {
            invocation
                .method
                .and_then(|id| symbols.method(id))
                .is_some_and(|modifier| modifier.extent.contains(file, position))
        }) {
            call.modifier = Some(index);
        }
    }

    fn exit(&mut self, symbols: &SymbolTable) {
        if let Some(call) = self.calls.pop() {
            trace!(method = %symbols.qualified_name(call.method), "leaving call");
        }
        if let Some(caller) = self.calls.last_mut() {
            caller.mapping = None;
        }

        // A constructor left alone on the call list is dropped.
        let lone_constructor = self.calls.len() == 1
            && symbols.method(self.calls[0].method).is_some_and(|m| m.is_constructor());
        if lone_constructor {
            trace!("dropping lone constructor call");
            self.calls.clear();
        }
    }
}

/// Reconstructs source-level call stacks from executed instructions.
///
/// Frames follow the EVM call depth. Within a frame, calls are pushed when
/// the instruction after an `i` jump resolves to a function and popped on
/// `o` jumps.
#[derive(Debug, Clone, Default)]
pub struct CallStackTracer {
    frames: Vec<CallFrame>,
    pending_library: Option<Address>,
}

impl CallStackTracer {
    /// Creates a tracer with no frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Active frames, outermost first.
    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// Number of source-level calls across all frames.
    pub fn depth(&self) -> usize {
        self.frames.iter().map(|f| f.calls.len()).sum()
    }

    /// Drops all frames.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.pending_library = None;
    }

    /// Processes one instruction and returns the mapping of the call it
    /// belongs to, if that call is known.
    pub fn trace(
        &mut self,
        event: &StepEvent<'_>,
        registry: &DebugRegistry,
    ) -> Option<SourceMapping> {
        let library = self.pending_library.take();
        if !self.sync_depth(event, library) {
            return None;
        }
        let frame = self.frames.last_mut()?;

        if let Some(opcode) = OpCode::new(event.opcode) {
            if opcode.is_call() {
                frame.stack = event.stack.to_vec();
                frame.memory = Bytes::copy_from_slice(event.memory);
            }
            if opcode.is_delegate_call() {
                // DELEGATECALL pops gas, then the target address.
                self.pending_library = event
                    .stack
                    .len()
                    .checked_sub(2)
                    .map(|index| Address::from_word(event.stack[index].into()));
            }
        }

        let code = registry.resolve(&frame.code_address, frame.creation)?;
        let Some(mapping) = code.source_map.get(event.pc) else {
            trace!(pc = event.pc, address = %frame.code_address, "no source mapping");
            return None;
        };
        let symbols = &code.unit.symbols;

        // Generated code carries no call of its own and its jumps come in
        // balanced pairs.
        let span = mapping.span.as_ref()?;

        if frame.state == FrameState::AwaitingCall {
            if let Some(method) = symbols.resolve_method(code.contract, &span.extent()) {
                frame.enter(method, symbols, event.stack.len());
                frame.state = FrameState::Running;
            }
        }
        if frame.state == FrameState::Running {
            frame.update(mapping, span, symbols);
        }

        let active = match frame.state {
            FrameState::Running => frame.calls.last().and_then(|c| c.mapping.clone()),
            FrameState::AwaitingCall => None,
        };

        match mapping.jump {
            JumpType::In => frame.state = FrameState::AwaitingCall,
            // The returning instruction belongs to a call that no longer
            // exists once it executes.
            JumpType::Out => {
                frame.exit(symbols);
                return None;
            }
            JumpType::Regular => {}
        }
        active
    }

    /// Makes the frame count match `depth + 1`. Returns `false` when the
    /// event cannot be placed.
    fn sync_depth(&mut self, event: &StepEvent<'_>, library: Option<Address>) -> bool {
        let expected = event.depth + 1;
        if self.frames.len() + 1 == expected {
            let code_address = library.unwrap_or(event.address);
            trace!(depth = event.depth, address = %event.address, %code_address, "new frame");
            self.frames.push(CallFrame::new(event, code_address));
        } else if self.frames.len() > expected {
            self.frames.truncate(expected);
        } else if self.frames.len() < expected {
            warn!(
                depth = event.depth,
                frames = self.frames.len(),
                "unexpected call depth, skipping instruction"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::{AstNode, SourceFiles};

    const INIT_SOURCE: &str = r#"contract Init {
    uint256 total;

    constructor() public {
        total = setup(1);
    }

    function setup(uint256 x) internal returns (uint256) {
        return x;
    }
}
"#;

    fn src(from: &str, to: &str) -> String {
        let start = INIT_SOURCE.find(from).unwrap();
        let end = start + INIT_SOURCE[start..].find(to).unwrap() + to.len();
        format!("{start}:{}:0", end - start)
    }

    fn node(name: &str, src: String, attributes: Value, children: Vec<Value>) -> Value {
        json!({ "name": name, "src": src, "attributes": attributes, "children": children })
    }

    fn var(name: &str, ty: &str, at: &str) -> Value {
        node(
            "VariableDeclaration",
            src(at, name),
            json!({ "name": name, "type": ty, "storageLocation": "default" }),
            vec![],
        )
    }

    fn init_symbols() -> SymbolTable {
        let constructor = node(
            "FunctionDefinition",
            src("constructor()", "setup(1);\n    }"),
            json!({ "name": "", "visibility": "public", "isConstructor": true }),
            vec![
                node("ParameterList", src("()", ")"), json!({}), vec![]),
                node("Block", src("{\n        total", "setup(1);\n    }"), json!({}), vec![]),
            ],
        );
        let setup = node(
            "FunctionDefinition",
            src("function setup", "return x;\n    }"),
            json!({ "name": "setup", "visibility": "internal", "isConstructor": false }),
            vec![
                node(
                    "ParameterList",
                    src("(uint256 x)", ")"),
                    json!({}),
                    vec![var("x", "uint256", "uint256 x")],
                ),
                node(
                    "ParameterList",
                    src("(uint256) {", "(uint256)"),
                    json!({}),
                    vec![var("", "uint256", "uint256) {")],
                ),
                node("Block", src("{\n        return", "return x;\n    }"), json!({}), vec![]),
            ],
        );
        let mut contract = node(
            "ContractDefinition",
            src("contract Init", "return x;\n    }\n}"),
            json!({ "name": "Init", "contractKind": "contract", "linearizedBaseContracts": [1] }),
            vec![var("total", "uint256", "uint256 total"), constructor, setup],
        );
        contract["id"] = json!(1);
        let unit = node(
            "SourceUnit",
            format!("0:{}:0", INIT_SOURCE.len()),
            json!({}),
            vec![contract],
        );

        let mut sources = SourceFiles::new();
        sources.add(0, "Init.sol", INIT_SOURCE);
        SymbolTable::build(&[(0, AstNode::from_json(unit).unwrap())], &sources).unwrap()
    }

    #[test]
    fn test_lone_constructor_is_dropped() {
        sdb_common::logging::ensure_test_logging(None);
        let symbols = init_symbols();
        let contract = symbols.contract_id("Init").unwrap();
        let method = |name: &str| MethodId {
            contract,
            index: symbols.contract(contract).unwrap().method_index(name).unwrap(),
        };
        let (constructor, setup) = (method("constructor"), method("setup"));
        assert!(symbols.method(constructor).unwrap().is_constructor());

        let mut frame = CallFrame { creation: true, ..Default::default() };
        frame.enter(constructor, &symbols, 2);
        frame.calls[0].entered = true;
        frame.enter(setup, &symbols, 5);
        let offsets: Vec<_> = frame.calls.iter().map(|c| c.stack_offset).collect();
        assert_eq!(offsets, vec![0, 1]);

        // returning from setup leaves the constructor alone, which is dropped
        frame.exit(&symbols);
        assert!(frame.calls.is_empty());

        // the next call starts a fresh list
        frame.enter(setup, &symbols, 7);
        assert_eq!(frame.calls.len(), 1);
        assert_eq!(frame.calls[0].method, setup);
        assert_eq!(frame.calls[0].stack_offset, 0);
        assert_eq!(frame.stack_base, 6);
    }

    #[test]
    fn test_exit_keeps_function_caller() {
        let symbols = init_symbols();
        let contract = symbols.contract_id("Init").unwrap();
        let index = symbols.contract(contract).unwrap().method_index("setup").unwrap();
        let setup = MethodId { contract, index };

        let mut frame = CallFrame::default();
        frame.enter(setup, &symbols, 1);
        frame.calls[0].entered = true;
        frame.enter(setup, &symbols, 3);
        assert_eq!(frame.calls.len(), 2);

        frame.exit(&symbols);
        assert_eq!(frame.calls.len(), 1);
        assert_eq!(frame.calls[0].stack_offset, 0);
    }

    fn event<'a>(depth: usize, opcode: u8, stack: &'a [U256]) -> StepEvent<'a> {
        StepEvent {
            pc: 0,
            opcode,
            depth,
            address: Address::repeat_byte(depth as u8 + 1),
            creation: false,
            stack,
            memory: &[],
            calldata: &[],
        }
    }

    #[test]
    fn test_frames_follow_depth() {
        let registry = DebugRegistry::new();
        let mut tracer = CallStackTracer::new();

        let sizes: Vec<_> = [0, 1, 2, 1, 2, 1, 0]
            .into_iter()
            .map(|depth| {
                tracer.trace(&event(depth, 0x01, &[]), &registry);
                tracer.frames().len()
            })
            .collect();
        assert_eq!(sizes, vec![1, 2, 3, 2, 3, 2, 1]);
    }

    #[test]
    fn test_depth_jump_is_skipped() {
        let registry = DebugRegistry::new();
        let mut tracer = CallStackTracer::new();
        tracer.trace(&event(0, 0x01, &[]), &registry);
        assert!(tracer.trace(&event(2, 0x01, &[]), &registry).is_none());
        assert_eq!(tracer.frames().len(), 1);
    }

    #[test]
    fn test_delegate_call_runs_library_code() {
        let registry = DebugRegistry::new();
        let mut tracer = CallStackTracer::new();
        let library = Address::repeat_byte(0xab);

        // DELEGATECALL(gas, library, ...) with gas on top
        let stack = [U256::ZERO, U256::from_be_slice(library.as_slice()), U256::from(50_000)];
        tracer.trace(&event(0, OpCode::DELEGATECALL.get(), &stack), &registry);
        assert_eq!(tracer.frames()[0].stack, stack.to_vec());

        tracer.trace(&event(1, 0x5b, &[]), &registry);
        let frame = &tracer.frames()[1];
        assert_eq!(frame.code_address, library);
        assert_eq!(frame.address, Address::repeat_byte(2));

        // the pending library only applies to the next frame
        tracer.trace(&event(0, OpCode::DELEGATECALL.get(), &stack), &registry);
        tracer.trace(&event(0, 0x01, &[]), &registry);
        tracer.trace(&event(1, 0x5b, &[]), &registry);
        assert_eq!(tracer.frames()[1].code_address, Address::repeat_byte(2));
    }
}
