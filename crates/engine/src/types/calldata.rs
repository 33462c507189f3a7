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

use super::{read_bytes, CalldataCursor, DataLocation, DecodeError, SolType, SolValue};
use crate::DecodeLimits;

fn read_abi_word(data: &[u8], offset: usize) -> Result<U256, DecodeError> {
    read_bytes(data, offset, 32).map(U256::from_be_slice)
}

fn read_abi_offset(data: &[u8], offset: usize) -> Result<usize, DecodeError> {
    read_abi_word(data, offset).map(|w| w.saturating_to::<usize>())
}

impl SolType {
    /// Decodes a calldata variable from the words the compiler keeps for it
    /// on the stack.
    ///
    /// `offset` points at the data; `len` is the element or byte count that
    /// accompanies `bytes`, `string` and dynamic arrays.
    pub fn decode_calldata_at(
        &self,
        data: &[u8],
        offset: usize,
        len: Option<usize>,
        limits: &DecodeLimits,
    ) -> Result<SolValue, DecodeError> {
        match (self, len) {
            (Self::Bytes | Self::String, Some(len)) => {
                let bytes = read_bytes(data, offset, len.min(limits.max_bytes_length))?;
                Ok(bytes_value(self, bytes))
            }
            (Self::DynamicArray(elem), Some(len)) => {
                decode_abi_elements(elem, data, offset, len.min(limits.max_array_elements), limits)
            }
            (Self::Bytes | Self::String | Self::DynamicArray(_), None) => {
                self.decode_abi(data, &mut CalldataCursor::new(offset), 0, limits)
            }
            (Self::Struct(_), _) => decode_abi_fields(self, data, offset, limits),
            (Self::StructRef(r), _) => {
                r.resolve()?.decode_calldata_at(data, offset, len, limits)
            }
            (Self::StaticArray(elem, n), _) => {
                decode_abi_elements(elem, data, offset, (*n).min(limits.max_array_elements), limits)
            }
            (Self::Mapping(..), _) => Err(DecodeError::Unsupported {
                ty: self.to_string(),
                location: DataLocation::Calldata,
            }),
            _ => Ok(self.decode_word(read_abi_word(data, offset)?)),
        }
    }

    /// Decodes one ABI-encoded value whose head is at `cursor`, advancing
    /// the cursor past the head.
    ///
    /// Offsets of dynamic values are relative to `base`, the start of the
    /// enclosing tuple.
    pub fn decode_abi(
        &self,
        data: &[u8],
        cursor: &mut CalldataCursor,
        base: usize,
        limits: &DecodeLimits,
    ) -> Result<SolValue, DecodeError> {
        if let Self::StructRef(r) = self {
            return r.resolve()?.decode_abi(data, cursor, base, limits);
        }
        if self.is_abi_dynamic() {
            let head = cursor.take(32);
            let tail = base.saturating_add(read_abi_offset(data, head)?);
            return match self {
                Self::Bytes | Self::String => {
                    let len = read_abi_offset(data, tail)?.min(limits.max_bytes_length);
                    let bytes = read_bytes(data, tail.saturating_add(32), len)?;
                    Ok(bytes_value(self, bytes))
                }
                Self::DynamicArray(elem) => {
                    let len = read_abi_offset(data, tail)?.min(limits.max_array_elements);
                    decode_abi_elements(elem, data, tail.saturating_add(32), len, limits)
                }
                Self::StaticArray(elem, n) => {
                    let count = (*n).min(limits.max_array_elements);
                    decode_abi_elements(elem, data, tail, count, limits)
                }
                _ => decode_abi_fields(self, data, tail, limits),
            };
        }

        let start = cursor.take(self.abi_head_size());
        match self {
            Self::StaticArray(elem, n) => {
                decode_abi_elements(elem, data, start, (*n).min(limits.max_array_elements), limits)
            }
            Self::Struct(_) => decode_abi_fields(self, data, start, limits),
            Self::Mapping(..) => Err(DecodeError::Unsupported {
                ty: self.to_string(),
                location: DataLocation::Calldata,
            }),
            _ => Ok(self.decode_word(read_abi_word(data, start)?)),
        }
    }
}

fn bytes_value(ty: &SolType, bytes: &[u8]) -> SolValue {
    match ty {
        SolType::String => SolValue::String(String::from_utf8_lossy(bytes).into_owned()),
        _ => SolValue::Bytes(bytes.to_vec()),
    }
}

/// Decodes `count` consecutive elements of a tuple starting at `base`.
fn decode_abi_elements(
    elem: &SolType,
    data: &[u8],
    base: usize,
    count: usize,
    limits: &DecodeLimits,
) -> Result<SolValue, DecodeError> {
    let mut cursor = CalldataCursor::new(base);
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(elem.decode_abi(data, &mut cursor, base, limits)?);
    }
    Ok(SolValue::Array(items))
}

/// Decodes the fields of a struct encoded as a tuple starting at `base`.
fn decode_abi_fields(
    ty: &SolType,
    data: &[u8],
    base: usize,
    limits: &DecodeLimits,
) -> Result<SolValue, DecodeError> {
    let SolType::Struct(s) = ty else {
        return Err(DecodeError::Unsupported {
            ty: ty.to_string(),
            location: DataLocation::Calldata,
        });
    };

    let mut cursor = CalldataCursor::new(base);
    let mut fields = Vec::with_capacity(s.fields.len());
    for (name, field) in &s.fields {
        fields.push((name.clone(), field.decode_abi(data, &mut cursor, base, limits)?));
    }
    Ok(SolValue::Struct(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructType;

    fn encode_words(words: &[U256]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_be_bytes::<32>()).collect()
    }

    fn padded(bytes: &[u8]) -> U256 {
        let mut word = [0u8; 32];
        word[..bytes.len()].copy_from_slice(bytes);
        U256::from_be_bytes(word)
    }

    #[test]
    fn test_bytes_from_stack_words() {
        // f(bytes calldata b) with b = "abc": selector, offset, length, data
        let mut data = vec![0xaa, 0xbb, 0xcc, 0xdd];
        data.extend(encode_words(&[U256::from(32), U256::from(3), padded(b"abc")]));

        let limits = DecodeLimits::default();
        let value = SolType::Bytes.decode_calldata_at(&data, 68, Some(3), &limits);
        assert_eq!(value.unwrap(), SolValue::Bytes(b"abc".to_vec()));

        let value = SolType::String.decode_calldata_at(&data, 68, Some(40), &limits);
        assert!(matches!(value, Err(DecodeError::OutOfBounds { .. })));
    }

    #[test]
    fn test_dynamic_struct_tuple() {
        // struct { uint256 id; string name; } encoded at offset 0
        let ty = SolType::Struct(StructType {
            name: "S".to_string(),
            fields: vec![
                ("id".to_string(), SolType::Uint(32)),
                ("name".to_string(), SolType::String),
            ],
        });
        let data = encode_words(&[U256::from(9), U256::from(64), U256::from(2), padded(b"ok")]);

        let value = ty.decode_calldata_at(&data, 0, None, &DecodeLimits::default()).unwrap();
        assert_eq!(value.to_string(), "{id: 9, name: \"ok\"}");
    }

    #[test]
    fn test_array_of_strings() {
        // string[] with two elements: offsets are relative to the element heads
        let data = encode_words(&[
            U256::from(64),
            U256::from(128),
            U256::from(1),
            padded(b"a"),
            U256::from(2),
            padded(b"bc"),
        ]);

        let ty = SolType::DynamicArray(Box::new(SolType::String));
        let value = ty.decode_calldata_at(&data, 0, Some(2), &DecodeLimits::default()).unwrap();
        assert_eq!(value.to_string(), "[\"a\", \"bc\"]");
    }

    #[test]
    fn test_signed_word() {
        let data = encode_words(&[U256::MAX]);
        let value = SolType::Int(1).decode_calldata_at(&data, 0, None, &DecodeLimits::default());
        assert_eq!(value.unwrap().to_string(), "-1");
    }
}
