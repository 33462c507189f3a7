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

use revm::bytecode::OpCode;

/// Opcode classification used by the debugger.
///
/// The tracers only care about a handful of instruction families: pushes (whose
/// immediates must be skipped when assigning program counters), calls (which
/// open a new frame), delegate calls (which switch the symbol table to a
/// library) and hashing (which feeds the preimage dictionary).
pub trait OpcodeTr {
    /// Number of immediate bytes that follow the opcode in the bytecode.
    ///
    /// # Example
    /// ```rust
    /// use revm::bytecode::OpCode;
    /// use sdb_common::OpcodeTr;
    ///
    /// assert_eq!(OpCode::PUSH1.immediate_len(), 1);
    /// assert_eq!(OpCode::PUSH32.immediate_len(), 32);
    /// assert_eq!(OpCode::ADD.immediate_len(), 0);
    /// ```
    fn immediate_len(&self) -> usize;

    /// Check if this opcode opens a new execution frame
    fn is_call(&self) -> bool;

    /// Check if this opcode is a `DELEGATECALL`
    fn is_delegate_call(&self) -> bool;

    /// Check if this opcode hashes a memory region (`KECCAK256`)
    fn is_hash(&self) -> bool;
}

impl OpcodeTr for OpCode {
    fn immediate_len(&self) -> usize {
        immediate_len(self.get())
    }

    fn is_call(&self) -> bool {
        matches!(
            *self,
            Self::CREATE
                | Self::CREATE2
                | Self::CALL
                | Self::CALLCODE
                | Self::DELEGATECALL
                | Self::STATICCALL
        )
    }

    fn is_delegate_call(&self) -> bool {
        *self == Self::DELEGATECALL
    }

    fn is_hash(&self) -> bool {
        *self == Self::KECCAK256
    }
}

/// Number of immediate bytes following a raw opcode byte.
///
/// `PUSH1` (0x60) through `PUSH32` (0x7f) carry `opcode - 0x5f` bytes of
/// immediate data. Every other byte, including invalid opcodes found in
/// metadata trailers, is a single-byte instruction.
pub fn immediate_len(opcode: u8) -> usize {
    if (OpCode::PUSH1.get()..=OpCode::PUSH32.get()).contains(&opcode) {
        (opcode - OpCode::PUSH1.get()) as usize + 1
    } else {
        0
    }
}

/// Check if a raw opcode byte opens a new execution frame.
pub fn is_call_opcode(opcode: u8) -> bool {
    OpCode::new(opcode).map(|op| op.is_call()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_immediates() {
        assert_eq!(immediate_len(0x60), 1);
        assert_eq!(immediate_len(0x61), 2);
        assert_eq!(immediate_len(0x7f), 32);
        assert_eq!(immediate_len(0x5f), 0); // PUSH0
        assert_eq!(immediate_len(0x80), 0); // DUP1
        assert_eq!(immediate_len(0xfe), 0); // INVALID
    }

    #[test]
    fn test_call_classification() {
        assert!(is_call_opcode(0xf1));
        assert!(is_call_opcode(0xf4));
        assert!(is_call_opcode(0xf0));
        assert!(!is_call_opcode(0x01));
        assert!(OpCode::DELEGATECALL.is_delegate_call());
        assert!(!OpCode::CALL.is_delegate_call());
        assert!(OpCode::KECCAK256.is_hash());
    }
}
