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

//! The Solidity type system.
//!
//! [`SolType`] is a closed set of variants. Each variant knows its storage
//! width and can decode itself from storage, memory, calldata or the stack.

mod calldata;
mod cursor;
mod memory;
mod registry;
mod stack;
mod storage;
mod value;

pub use calldata::*;
pub use cursor::*;
pub use memory::*;
pub use registry::*;
pub use stack::*;
pub use storage::*;
pub use value::*;

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a variable's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataLocation {
    /// The value itself sits on the stack
    Stack,
    /// The stack holds a memory pointer
    Memory,
    /// The stack holds a calldata offset (and a length for dynamic types)
    Calldata,
    /// The value lives in account storage
    Storage,
}

impl DataLocation {
    /// Reads a `storageLocation` AST attribute.
    pub fn from_attribute(location: Option<&str>) -> Self {
        match location {
            Some("memory") => Self::Memory,
            Some("calldata") => Self::Calldata,
            Some("storage") => Self::Storage,
            _ => Self::Stack,
        }
    }
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stack => "stack",
            Self::Memory => "memory",
            Self::Calldata => "calldata",
            Self::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Errors raised while decoding values.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// State could not be read
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A read ran past the end of memory or calldata
    #[error("read of {len} bytes at offset {offset} is out of bounds")]
    OutOfBounds {
        /// Offset of the read
        offset: usize,
        /// Length of the read
        len: usize,
    },

    /// The type cannot live in the given location
    #[error("{ty} cannot be decoded from {location}")]
    Unsupported {
        /// Type descriptor
        ty: String,
        /// Location of the data
        location: DataLocation,
    },

    /// A recursive struct nests deeper than decoding follows
    #[error("struct {name} nests too deeply to decode")]
    Unresolved {
        /// Struct name
        name: String,
    },

    /// The stack does not hold the variable (yet)
    #[error("stack slot {index} is not available (stack height {height})")]
    MissingStackSlot {
        /// Requested slot
        index: usize,
        /// Current stack height
        height: usize,
    },
}

/// A struct type with resolved field types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    /// Canonical name, e.g. `Token.Info`
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<(String, SolType)>,
}

/// An enum type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    /// Canonical name, e.g. `Token.State`
    pub name: String,
    /// Member names by ordinal
    pub members: Vec<String>,
}

/// A Solidity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SolType {
    /// `uintN`, parametrized by byte width
    Uint(usize),
    /// `intN`, parametrized by byte width
    Int(usize),
    /// `bool`
    Bool,
    /// `address`
    Address,
    /// `bytesN`
    FixedBytes(usize),
    /// `bytes`
    Bytes,
    /// `string`
    String,
    /// A struct
    Struct(StructType),
    /// A struct referenced from inside its own members
    StructRef(StructRef),
    /// An enum
    Enum(EnumType),
    /// `T[N]`
    StaticArray(Box<SolType>, usize),
    /// `T[]`
    DynamicArray(Box<SolType>),
    /// `mapping(K => V)`
    Mapping(Box<SolType>, Box<SolType>),
    /// A contract reference, stored as an address
    Contract(String),
}

impl SolType {
    /// Whether values of this type fit in one word and may be packed.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Self::Uint(_)
                | Self::Int(_)
                | Self::Bool
                | Self::Address
                | Self::FixedBytes(_)
                | Self::Enum(_)
                | Self::Contract(_)
        )
    }

    /// Bytes occupied in a storage slot. Reference types take whole slots.
    pub fn storage_bytes(&self) -> usize {
        match self {
            Self::Uint(n) | Self::Int(n) | Self::FixedBytes(n) => *n,
            Self::Bool | Self::Enum(_) => 1,
            Self::Address | Self::Contract(_) => 20,
            _ => 32,
        }
    }

    /// Number of storage slots occupied when laid out from a fresh slot.
    pub fn storage_slots(&self) -> usize {
        match self {
            Self::Struct(s) => {
                let mut cursor = StorageCursor::new(U256::ZERO);
                for (_, field) in &s.fields {
                    cursor.reserve(field);
                }
                cursor.align();
                cursor.slot.saturating_to::<usize>().max(1)
            }
            Self::StructRef(r) => r.resolve().map_or(1, |ty| ty.storage_slots()),
            Self::StaticArray(elem, len) => {
                if elem.is_value_type() {
                    let per_slot = 32 / elem.storage_bytes();
                    len.div_ceil(per_slot)
                } else {
                    len.saturating_mul(elem.storage_slots())
                }
            }
            _ => 1,
        }
    }

    /// Whether the ABI encodes this type out of line.
    pub fn is_abi_dynamic(&self) -> bool {
        match self {
            Self::Bytes | Self::String | Self::DynamicArray(_) => true,
            Self::StaticArray(elem, _) => elem.is_abi_dynamic(),
            Self::Struct(s) => s.fields.iter().any(|(_, f)| f.is_abi_dynamic()),
            Self::StructRef(r) => r.resolve().is_ok_and(|ty| ty.is_abi_dynamic()),
            _ => false,
        }
    }

    /// Bytes taken in an ABI head: one word for dynamic types, the inline
    /// size otherwise.
    pub fn abi_head_size(&self) -> usize {
        if self.is_abi_dynamic() {
            return 32;
        }
        match self {
            Self::StaticArray(elem, len) => len.saturating_mul(elem.abi_head_size()),
            Self::Struct(s) => s.fields.iter().map(|(_, f)| f.abi_head_size()).sum(),
            Self::StructRef(r) => r.resolve().map_or(32, |ty| ty.abi_head_size()),
            _ => 32,
        }
    }

    /// Stack slots a variable of this type takes in `location`.
    ///
    /// Calldata `bytes`, `string` and dynamic arrays are passed as an
    /// (offset, length) pair; everything else takes one slot.
    pub fn stack_slots(&self, location: DataLocation) -> usize {
        match (self, location) {
            (Self::Bytes | Self::String | Self::DynamicArray(_), DataLocation::Calldata) => 2,
            _ => 1,
        }
    }

    /// The value of an all-zero encoding.
    pub fn zero_value(&self) -> SolValue {
        self.decode_packed(U256::ZERO)
    }
}

impl fmt::Display for SolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(n) => write!(f, "uint{}", n * 8),
            Self::Int(n) => write!(f, "int{}", n * 8),
            Self::Bool => f.write_str("bool"),
            Self::Address => f.write_str("address"),
            Self::FixedBytes(n) => write!(f, "bytes{n}"),
            Self::Bytes => f.write_str("bytes"),
            Self::String => f.write_str("string"),
            Self::Struct(s) => write!(f, "struct {}", s.name),
            Self::StructRef(r) => write!(f, "struct {}", r.name),
            Self::Enum(e) => write!(f, "enum {}", e.name),
            Self::StaticArray(elem, len) => write!(f, "{elem}[{len}]"),
            Self::DynamicArray(elem) => write!(f, "{elem}[]"),
            Self::Mapping(key, value) => write!(f, "mapping({key} => {value})"),
            Self::Contract(name) => write!(f, "contract {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> SolType {
        SolType::Struct(StructType {
            name: "T.Info".to_string(),
            fields: vec![
                ("a".to_string(), SolType::Uint(16)),
                ("flag".to_string(), SolType::Bool),
                ("owner".to_string(), SolType::Address),
                ("total".to_string(), SolType::Uint(32)),
                ("small".to_string(), SolType::Uint(1)),
            ],
        })
    }

    #[test]
    fn test_storage_widths() {
        assert_eq!(SolType::Uint(1).storage_bytes(), 1);
        assert_eq!(SolType::Address.storage_bytes(), 20);
        assert_eq!(SolType::Contract("C".into()).storage_bytes(), 20);
        assert_eq!(SolType::String.storage_bytes(), 32);

        // a, flag | owner | total | small
        assert_eq!(info().storage_slots(), 4);
        // ten uint64 values, four per slot
        assert_eq!(SolType::StaticArray(Box::new(SolType::Uint(8)), 10).storage_slots(), 3);
        assert_eq!(SolType::StaticArray(Box::new(info()), 2).storage_slots(), 8);
        let mapping = SolType::Mapping(Box::new(SolType::Address), Box::new(info()));
        assert_eq!(mapping.storage_slots(), 1);
    }

    #[test]
    fn test_abi_shape() {
        assert!(!info().is_abi_dynamic());
        assert_eq!(info().abi_head_size(), 160);
        assert!(SolType::StaticArray(Box::new(SolType::String), 2).is_abi_dynamic());
        assert_eq!(SolType::StaticArray(Box::new(SolType::Uint(32)), 3).abi_head_size(), 96);
        assert_eq!(SolType::Bytes.stack_slots(DataLocation::Calldata), 2);
        assert_eq!(SolType::Bytes.stack_slots(DataLocation::Memory), 1);
    }

    #[test]
    fn test_display() {
        let ty = SolType::Mapping(
            Box::new(SolType::Address),
            Box::new(SolType::DynamicArray(Box::new(SolType::Int(1)))),
        );
        assert_eq!(ty.to_string(), "mapping(address => int8[])");
        assert_eq!(SolType::FixedBytes(4).to_string(), "bytes4");
    }
}
