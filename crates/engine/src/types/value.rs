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

use std::{collections::BTreeMap, fmt};

use alloy_primitives::{hex, Address, B256, I256, U256};
use itertools::Itertools;
use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::Value;

use super::SolType;

/// A decoded Solidity value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolValue {
    /// Unsigned integer
    Uint(U256),
    /// Signed integer
    Int(I256),
    /// Boolean
    Bool(bool),
    /// Address or contract reference
    Address(Address),
    /// `bytesN`
    FixedBytes(Vec<u8>),
    /// `bytes`
    Bytes(Vec<u8>),
    /// `string`; invalid UTF-8 is replaced
    String(String),
    /// Enum member
    Enum {
        /// Ordinal
        ordinal: usize,
        /// Member name, if the ordinal is in range
        member: Option<String>,
    },
    /// Struct fields in declaration order
    Struct(Vec<(String, SolValue)>),
    /// Array elements
    Array(Vec<SolValue>),
    /// Mapping entries recovered from hash preimages, keyed by the key's
    /// display form
    Mapping(BTreeMap<String, SolValue>),
}

impl SolValue {
    /// JSON view used in pause notifications.
    ///
    /// Integers become decimal strings so no precision is lost; byte strings
    /// become `0x` hex.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Uint(v) => Value::String(v.to_string()),
            Self::Int(v) => Value::String(v.to_string()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Address(a) => Value::String(a.to_checksum(None)),
            Self::FixedBytes(b) | Self::Bytes(b) => Value::String(hex::encode_prefixed(b)),
            Self::String(s) => Value::String(s.clone()),
            Self::Enum { ordinal, member } => match member {
                Some(name) => Value::String(name.clone()),
                None => Value::from(*ordinal),
            },
            Self::Struct(fields) => {
                Value::Object(fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Mapping(entries) => {
                Value::Object(entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

impl Serialize for SolValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Struct(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Self::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Array(items) => items.serialize(serializer),
            other => other.to_json().serialize(serializer),
        }
    }
}

impl fmt::Display for SolValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Address(a) => write!(f, "{}", a.to_checksum(None)),
            Self::FixedBytes(b) | Self::Bytes(b) => f.write_str(&hex::encode_prefixed(b)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Enum { ordinal, member } => match member {
                Some(name) => f.write_str(name),
                None => write!(f, "{ordinal}"),
            },
            Self::Struct(fields) => {
                write!(f, "{{{}}}", fields.iter().map(|(k, v)| format!("{k}: {v}")).join(", "))
            }
            Self::Array(items) => write!(f, "[{}]", items.iter().join(", ")),
            Self::Mapping(entries) => {
                write!(f, "{{{}}}", entries.iter().map(|(k, v)| format!("{k} => {v}")).join(", "))
            }
        }
    }
}

/// Mask keeping the low `bytes` bytes of a word.
pub(crate) fn low_bytes_mask(bytes: usize) -> U256 {
    if bytes >= 32 {
        U256::MAX
    } else {
        (U256::from(1) << (bytes * 8)) - U256::from(1)
    }
}

impl SolType {
    /// Decodes a value type from its right-aligned raw bits.
    ///
    /// `raw` must already be cut to [`Self::storage_bytes`]; this is the shape
    /// of packed storage. Signed integers are sign-extended from their
    /// declared width. Reference types decode to their zero value.
    pub fn decode_packed(&self, raw: U256) -> SolValue {
        match self {
            Self::Uint(_) => SolValue::Uint(raw),
            Self::Int(bytes) => {
                let bits = bytes * 8;
                let extended = if bits < 256 && raw.bit(bits - 1) {
                    raw | (U256::MAX << bits)
                } else {
                    raw
                };
                SolValue::Int(I256::from_raw(extended))
            }
            Self::Bool => SolValue::Bool(!raw.is_zero()),
            Self::Address | Self::Contract(_) => {
                SolValue::Address(Address::from_word(B256::from(raw.to_be_bytes::<32>())))
            }
            Self::FixedBytes(n) => {
                let word = raw.to_be_bytes::<32>();
                SolValue::FixedBytes(word[32 - n..].to_vec())
            }
            Self::Enum(e) => {
                let ordinal = raw.saturating_to::<usize>();
                SolValue::Enum { ordinal, member: e.members.get(ordinal).cloned() }
            }
            Self::Bytes => SolValue::Bytes(Vec::new()),
            Self::String => SolValue::String(String::new()),
            Self::Struct(s) => SolValue::Struct(
                s.fields.iter().map(|(name, ty)| (name.clone(), ty.zero_value())).collect(),
            ),
            Self::StructRef(r) => {
                r.resolve().map_or(SolValue::Struct(Vec::new()), |ty| ty.zero_value())
            }
            Self::StaticArray(elem, len) => {
                SolValue::Array((0..*len).map(|_| elem.zero_value()).collect())
            }
            Self::DynamicArray(_) => SolValue::Array(Vec::new()),
            Self::Mapping(..) => SolValue::Mapping(BTreeMap::new()),
        }
    }

    /// Decodes a value type from a full 32-byte word, as found on the stack,
    /// in memory and in ABI data.
    ///
    /// `bytesN` is left-aligned in a word; every other value type is
    /// right-aligned and only its low bytes are significant.
    pub fn decode_word(&self, word: U256) -> SolValue {
        match self {
            Self::FixedBytes(n) => {
                let bytes = word.to_be_bytes::<32>();
                SolValue::FixedBytes(bytes[..*n].to_vec())
            }
            _ => self.decode_packed(word & low_bytes_mask(self.storage_bytes())),
        }
    }
}
