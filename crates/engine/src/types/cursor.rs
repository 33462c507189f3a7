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

use alloy_primitives::U256;

use super::SolType;

/// Position in storage while laying out or decoding consecutive items.
///
/// Value types are packed right to left inside a slot and move to the next
/// slot when they do not fit. Reference types always start and end on a slot
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageCursor {
    /// Current slot
    pub slot: U256,
    /// Bytes of `slot` already used
    pub offset: usize,
}

impl StorageCursor {
    /// A cursor at the start of `slot`.
    pub fn new(slot: U256) -> Self {
        Self { slot, offset: 0 }
    }

    /// A cursor at a given byte of `slot`.
    pub fn at(slot: U256, offset: usize) -> Self {
        Self { slot, offset }
    }

    /// Claims `size` bytes for a value type and returns where they start.
    pub fn claim(&mut self, size: usize) -> (U256, usize) {
        if self.offset + size > 32 {
            self.slot += U256::from(1);
            self.offset = 0;
        }
        let position = (self.slot, self.offset);
        self.offset += size;
        position
    }

    /// Moves to the start of the next unused slot.
    pub fn align(&mut self) {
        if self.offset > 0 {
            self.slot += U256::from(1);
            self.offset = 0;
        }
    }

    /// Skips `slots` whole slots from an aligned position.
    pub fn advance_slots(&mut self, slots: usize) {
        self.slot += U256::from(slots);
        self.offset = 0;
    }

    /// Reserves room for a value of `ty` and returns where it starts.
    pub fn reserve(&mut self, ty: &SolType) -> (U256, usize) {
        if ty.is_value_type() {
            self.claim(ty.storage_bytes())
        } else {
            self.align();
            let start = (self.slot, 0);
            self.advance_slots(ty.storage_slots());
            start
        }
    }
}

/// Read position within ABI-encoded call data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalldataCursor {
    /// Byte offset of the next head
    pub offset: usize,
}

impl CalldataCursor {
    /// A cursor at `offset`.
    pub fn new(offset: usize) -> Self {
        Self { offset }
    }

    /// Returns the current offset and moves past `size` bytes.
    pub fn take(&mut self, size: usize) -> usize {
        let offset = self.offset;
        self.offset = self.offset.saturating_add(size);
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packing() {
        let mut cursor = StorageCursor::new(U256::ZERO);
        assert_eq!(cursor.claim(16), (U256::ZERO, 0));
        assert_eq!(cursor.claim(16), (U256::ZERO, 16));
        assert_eq!(cursor.claim(1), (U256::from(1), 0));
        assert_eq!(cursor.claim(20), (U256::from(1), 1));
        // does not fit next to 21 used bytes
        assert_eq!(cursor.claim(12), (U256::from(2), 0));
    }

    #[test]
    fn test_reference_types_take_whole_slots() {
        let mut cursor = StorageCursor::new(U256::ZERO);
        cursor.reserve(&SolType::Bool);
        assert_eq!(cursor.reserve(&SolType::String), (U256::from(1), 0));
        assert_eq!(cursor.reserve(&SolType::Bool), (U256::from(2), 0));

        cursor.align();
        assert_eq!(cursor, StorageCursor::new(U256::from(3)));
        cursor.align();
        assert_eq!(cursor.slot, U256::from(3));
    }

    #[test]
    fn test_calldata_cursor() {
        let mut cursor = CalldataCursor::new(4);
        assert_eq!(cursor.take(32), 4);
        assert_eq!(cursor.take(64), 36);
        assert_eq!(cursor.offset, 100);
    }
}
