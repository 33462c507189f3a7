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

//! Tracers fed with one event per executed instruction.

mod breakpoint;
pub use breakpoint::*;

mod call_stack;
pub use call_stack::*;

use alloy_primitives::{Address, U256};

/// The machine state before an instruction executes.
#[derive(Debug, Clone, Copy)]
pub struct StepEvent<'a> {
    /// Program counter
    pub pc: usize,
    /// Opcode about to execute
    pub opcode: u8,
    /// Call depth, 0 for the transaction's own frame
    pub depth: usize,
    /// Account whose storage the code runs against
    pub address: Address,
    /// Whether the frame runs init code
    pub creation: bool,
    /// Operand stack, bottom first
    pub stack: &'a [U256],
    /// Frame memory
    pub memory: &'a [u8],
    /// Frame input
    pub calldata: &'a [u8],
}
