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

use super::{DataLocation, DecodeError, SolType, SolValue, StorageContext, StorageCursor};
use crate::DecodeLimits;

/// The machine state a stack variable is decoded against.
#[derive(Debug, Clone, Copy)]
pub struct StackView<'a> {
    /// Operand stack, bottom first
    pub stack: &'a [U256],
    /// Memory of the frame
    pub memory: &'a [u8],
    /// Input data of the frame
    pub calldata: &'a [u8],
    /// Storage of the executing account, for storage pointers
    pub storage: Option<StorageContext<'a>>,
    /// Decoding caps
    pub limits: DecodeLimits,
}

impl StackView<'_> {
    /// The words at `index..index + count`.
    pub fn words(&self, index: usize, count: usize) -> Result<&[U256], DecodeError> {
        index
            .checked_add(count)
            .and_then(|end| self.stack.get(index..end))
            .ok_or(DecodeError::MissingStackSlot { index, height: self.stack.len() })
    }
}

impl SolType {
    /// Decodes a variable held at stack slot `index`.
    ///
    /// Depending on `location` the slot holds the value itself, a memory
    /// pointer, a calldata offset (followed by a length for dynamic types)
    /// or a storage slot.
    pub fn decode_stack(
        &self,
        index: usize,
        location: DataLocation,
        view: &StackView<'_>,
    ) -> Result<SolValue, DecodeError> {
        let words = view.words(index, self.stack_slots(location))?;
        let first = words[0];

        match location {
            DataLocation::Stack if self.is_value_type() => Ok(self.decode_word(first)),
            DataLocation::Stack | DataLocation::Memory => {
                self.decode_memory(view.memory, first.saturating_to::<usize>(), &view.limits)
            }
            DataLocation::Calldata => self.decode_calldata_at(
                view.calldata,
                first.saturating_to::<usize>(),
                words.get(1).map(|len| len.saturating_to::<usize>()),
                &view.limits,
            ),
            DataLocation::Storage => {
                let ctx = view.storage.as_ref().ok_or_else(|| DecodeError::Unsupported {
                    ty: self.to_string(),
                    location,
                })?;
                self.decode_storage(&mut StorageCursor::new(first), ctx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view<'a>(stack: &'a [U256], memory: &'a [u8], calldata: &'a [u8]) -> StackView<'a> {
        StackView { stack, memory, calldata, storage: None, limits: DecodeLimits::default() }
    }

    #[test]
    fn test_value_on_stack() {
        let stack = [U256::from(1), U256::from(0xff)];
        let v = view(&stack, &[], &[]);
        let value = SolType::Int(1).decode_stack(1, DataLocation::Stack, &v).unwrap();
        assert_eq!(value.to_string(), "-1");
        assert!(matches!(
            SolType::Bool.decode_stack(2, DataLocation::Stack, &v),
            Err(DecodeError::MissingStackSlot { index: 2, height: 2 })
        ));
    }

    #[test]
    fn test_calldata_pair() {
        let calldata = b"....hello".to_vec();
        let stack = [U256::from(4), U256::from(5)];
        let v = view(&stack, &[], &calldata);
        assert_eq!(
            SolType::String.decode_stack(0, DataLocation::Calldata, &v).unwrap(),
            SolValue::String("hello".to_string())
        );
        // the length word must be present too
        assert!(SolType::String.decode_stack(1, DataLocation::Calldata, &v).is_err());
    }

    #[test]
    fn test_storage_pointer_needs_storage() {
        let stack = [U256::from(3)];
        let v = view(&stack, &[], &[]);
        assert!(matches!(
            SolType::Uint(32).decode_stack(0, DataLocation::Storage, &v),
            Err(DecodeError::Unsupported { .. })
        ));
    }
}
