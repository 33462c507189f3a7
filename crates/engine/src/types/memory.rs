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

use super::{DataLocation, DecodeError, SolType, SolValue};
use crate::DecodeLimits;

/// Reads the 32-byte word at `offset`; bytes past the end of memory are zero.
pub fn read_word(memory: &[u8], offset: usize) -> U256 {
    let mut word = [0u8; 32];
    if offset < memory.len() {
        let end = memory.len().min(offset.saturating_add(32));
        word[..end - offset].copy_from_slice(&memory[offset..end]);
    }
    U256::from_be_bytes(word)
}

/// Reads `len` bytes at `offset`, failing if they are not all present.
pub fn read_bytes(data: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(DecodeError::OutOfBounds { offset, len })
}

fn word_to_offset(word: U256) -> usize {
    word.saturating_to::<usize>()
}

impl SolType {
    /// Decodes a value whose memory representation starts at `ptr`.
    ///
    /// Value types are full words. References inside structs and arrays are
    /// pointers to their own encoding; mapping members are not kept in memory
    /// and are skipped.
    pub fn decode_memory(
        &self,
        memory: &[u8],
        ptr: usize,
        limits: &DecodeLimits,
    ) -> Result<SolValue, DecodeError> {
        match self {
            Self::Bytes | Self::String => {
                let len = word_to_offset(read_word(memory, ptr)).min(limits.max_bytes_length);
                let data = read_bytes(memory, ptr.saturating_add(32), len)?;
                Ok(if matches!(self, Self::String) {
                    SolValue::String(String::from_utf8_lossy(data).into_owned())
                } else {
                    SolValue::Bytes(data.to_vec())
                })
            }
            Self::Struct(s) => {
                let mut fields = Vec::with_capacity(s.fields.len());
                let mut slot = ptr;
                for (name, ty) in &s.fields {
                    if matches!(ty, Self::Mapping(..)) {
                        continue;
                    }
                    fields.push((name.clone(), ty.decode_memory_member(memory, slot, limits)?));
                    slot = slot.saturating_add(32);
                }
                Ok(SolValue::Struct(fields))
            }
            Self::StructRef(r) => r.resolve()?.decode_memory(memory, ptr, limits),
            Self::StaticArray(elem, len) => {
                let count = (*len).min(limits.max_array_elements);
                decode_memory_elements(elem, memory, ptr, count, limits)
            }
            Self::DynamicArray(elem) => {
                let len = word_to_offset(read_word(memory, ptr)).min(limits.max_array_elements);
                decode_memory_elements(elem, memory, ptr.saturating_add(32), len, limits)
            }
            Self::Mapping(..) => Err(DecodeError::Unsupported {
                ty: self.to_string(),
                location: DataLocation::Memory,
            }),
            _ => Ok(self.decode_word(read_word(memory, ptr))),
        }
    }

    /// Decodes the member stored in the word at `slot` of a struct or array.
    fn decode_memory_member(
        &self,
        memory: &[u8],
        slot: usize,
        limits: &DecodeLimits,
    ) -> Result<SolValue, DecodeError> {
        let word = read_word(memory, slot);
        if self.is_value_type() {
            Ok(self.decode_word(word))
        } else {
            self.decode_memory(memory, word_to_offset(word), limits)
        }
    }
}

fn decode_memory_elements(
    elem: &SolType,
    memory: &[u8],
    start: usize,
    count: usize,
    limits: &DecodeLimits,
) -> Result<SolValue, DecodeError> {
    (0..count)
        .map(|i| elem.decode_memory_member(memory, start.saturating_add(i * 32), limits))
        .collect::<Result<Vec<_>, _>>()
        .map(SolValue::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructType;

    fn put_word(memory: &mut Vec<u8>, offset: usize, value: U256) {
        if memory.len() < offset + 32 {
            memory.resize(offset + 32, 0);
        }
        memory[offset..offset + 32].copy_from_slice(&value.to_be_bytes::<32>());
    }

    #[test]
    fn test_read_word_pads_with_zeros() {
        let memory = vec![0xff; 40];
        assert_eq!(read_word(&memory, 100), U256::ZERO);
        assert_eq!(read_word(&memory, 32), U256::from(0xffffffffffffffffu64) << 192);
        assert!(read_bytes(&memory, 30, 20).is_err());
        assert_eq!(read_bytes(&memory, 30, 10).unwrap().len(), 10);
    }

    #[test]
    fn test_struct_with_string_member() {
        // struct { uint256 id; string name; mapping(...) skipped; bool ok; }
        let ty = SolType::Struct(StructType {
            name: "S".to_string(),
            fields: vec![
                ("id".to_string(), SolType::Uint(32)),
                ("name".to_string(), SolType::String),
                (
                    "balances".to_string(),
                    SolType::Mapping(Box::new(SolType::Address), Box::new(SolType::Uint(32))),
                ),
                ("ok".to_string(), SolType::Bool),
            ],
        });

        let mut memory = vec![0u8; 0x80];
        put_word(&mut memory, 0x80, U256::from(7));
        put_word(&mut memory, 0xa0, U256::from(0x100));
        put_word(&mut memory, 0xc0, U256::from(1));
        put_word(&mut memory, 0x100, U256::from(2));
        memory.resize(0x140, 0);
        memory[0x120..0x122].copy_from_slice(b"hi");

        let value = ty.decode_memory(&memory, 0x80, &DecodeLimits::default()).unwrap();
        assert_eq!(value.to_string(), "{id: 7, name: \"hi\", ok: true}");
    }

    #[test]
    fn test_dynamic_array_is_capped() {
        let mut memory = Vec::new();
        put_word(&mut memory, 0, U256::from(1_000_000));
        for i in 0..4 {
            put_word(&mut memory, 32 + i * 32, U256::from(i));
        }

        let limits = DecodeLimits { max_array_elements: 4, ..Default::default() };
        let ty = SolType::DynamicArray(Box::new(SolType::Uint(32)));
        assert_eq!(ty.decode_memory(&memory, 0, &limits).unwrap().to_string(), "[0, 1, 2, 3]");
    }

    #[test]
    fn test_mapping_is_not_in_memory() {
        let ty = SolType::Mapping(Box::new(SolType::Uint(32)), Box::new(SolType::Uint(32)));
        assert!(matches!(
            ty.decode_memory(&[], 0, &DecodeLimits::default()),
            Err(DecodeError::Unsupported { .. })
        ));
    }
}
