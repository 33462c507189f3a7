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

use std::collections::BTreeMap;

use alloy_primitives::{keccak256, map::HashMap, Address, B256, U256};
use revm::DatabaseRef;
use thiserror::Error;
use tracing::trace;

use super::{value::low_bytes_mask, DecodeError, SolType, SolValue, StorageCursor};
use crate::{DecodeLimits, PreimageDictionary};

/// Failure to read account storage.
#[derive(Debug, Clone, Error)]
#[error("failed to read slot {slot} of {address}: {reason}")]
pub struct StorageError {
    /// Account
    pub address: Address,
    /// Slot
    pub slot: U256,
    /// Backend message
    pub reason: String,
}

impl StorageError {
    /// Wraps a backend error.
    pub fn new(address: Address, slot: U256, reason: impl ToString) -> Self {
        Self { address, slot, reason: reason.to_string() }
    }
}

/// Read access to account storage.
pub trait StorageProvider {
    /// Reads one slot; slots never written read as zero.
    fn storage(&self, address: Address, slot: U256) -> Result<U256, StorageError>;
}

/// Storage held in memory, mostly for tests and offline inspection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    accounts: HashMap<Address, HashMap<U256, U256>>,
}

impl InMemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one slot.
    pub fn set(&mut self, address: Address, slot: U256, value: U256) {
        self.accounts.entry(address).or_default().insert(slot, value);
    }
}

impl StorageProvider for InMemoryStorage {
    fn storage(&self, address: Address, slot: U256) -> Result<U256, StorageError> {
        Ok(self
            .accounts
            .get(&address)
            .and_then(|slots| slots.get(&slot))
            .copied()
            .unwrap_or_default())
    }
}

/// Storage read through any revm database.
#[derive(Debug)]
pub struct DatabaseStorage<'a, DB>(pub &'a DB);

impl<DB: DatabaseRef> StorageProvider for DatabaseStorage<'_, DB> {
    fn storage(&self, address: Address, slot: U256) -> Result<U256, StorageError> {
        self.0.storage_ref(address, slot).map_err(|e| StorageError::new(address, slot, e))
    }
}

/// Storage of one account.
#[derive(Clone, Copy)]
pub struct AccountStorage<'a> {
    provider: &'a dyn StorageProvider,
    /// The account
    pub address: Address,
}

impl<'a> AccountStorage<'a> {
    /// Binds a provider to an account.
    pub fn new(provider: &'a dyn StorageProvider, address: Address) -> Self {
        Self { provider, address }
    }

    /// Reads one slot of the account.
    pub fn read(&self, slot: U256) -> Result<U256, StorageError> {
        self.provider.storage(self.address, slot)
    }
}

impl std::fmt::Debug for AccountStorage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStorage").field("address", &self.address).finish_non_exhaustive()
    }
}

/// Everything storage decoding needs.
#[derive(Debug, Clone, Copy)]
pub struct StorageContext<'a> {
    /// Storage of the account being decoded
    pub storage: AccountStorage<'a>,
    /// Recorded hash preimages, for mapping keys
    pub preimages: &'a PreimageDictionary,
    /// Decoding caps
    pub limits: DecodeLimits,
}

/// Slot holding element data for a dynamic array or long byte string.
pub fn data_slot(slot: U256) -> U256 {
    U256::from_be_bytes(keccak256(slot.to_be_bytes::<32>()).0)
}

impl SolType {
    /// Decodes a value stored at `cursor`, advancing it past the value.
    ///
    /// Slots that were never written read as zero, so absent data decodes to
    /// the type's zero value.
    pub fn decode_storage(
        &self,
        cursor: &mut StorageCursor,
        ctx: &StorageContext<'_>,
    ) -> Result<SolValue, DecodeError> {
        match self {
            Self::Uint(_)
            | Self::Int(_)
            | Self::Bool
            | Self::Address
            | Self::FixedBytes(_)
            | Self::Enum(_)
            | Self::Contract(_) => {
                let size = self.storage_bytes();
                let (slot, offset) = cursor.claim(size);
                let word = ctx.storage.read(slot)?;
                let raw = (word >> (offset * 8)) & low_bytes_mask(size);
                Ok(self.decode_packed(raw))
            }
            Self::Bytes => {
                Ok(SolValue::Bytes(decode_storage_bytes(claim_slots(self, cursor), ctx)?))
            }
            Self::String => {
                let data = decode_storage_bytes(claim_slots(self, cursor), ctx)?;
                Ok(SolValue::String(String::from_utf8_lossy(&data).into_owned()))
            }
            Self::Struct(s) => {
                let mut inner = StorageCursor::new(claim_slots(self, cursor));
                let mut fields = Vec::with_capacity(s.fields.len());
                for (name, ty) in &s.fields {
                    fields.push((name.clone(), ty.decode_storage(&mut inner, ctx)?));
                }
                Ok(SolValue::Struct(fields))
            }
            Self::StructRef(r) => r.resolve()?.decode_storage(cursor, ctx),
            Self::StaticArray(elem, len) => {
                let start = claim_slots(self, cursor);
                let count = (*len).min(ctx.limits.max_array_elements);
                decode_storage_elements(elem, StorageCursor::new(start), count, ctx)
            }
            Self::DynamicArray(elem) => {
                let start = claim_slots(self, cursor);
                let len = ctx.storage.read(start)?.saturating_to::<usize>();
                let count = len.min(ctx.limits.max_array_elements);
                decode_storage_elements(elem, StorageCursor::new(data_slot(start)), count, ctx)
            }
            Self::Mapping(key, value) => {
                decode_mapping(key, value, claim_slots(self, cursor), ctx)
            }
        }
    }
}

/// Moves `cursor` past a reference type and returns its first slot.
fn claim_slots(ty: &SolType, cursor: &mut StorageCursor) -> U256 {
    cursor.align();
    let start = cursor.slot;
    cursor.advance_slots(ty.storage_slots());
    start
}

fn decode_storage_elements(
    elem: &SolType,
    mut cursor: StorageCursor,
    count: usize,
    ctx: &StorageContext<'_>,
) -> Result<SolValue, DecodeError> {
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(elem.decode_storage(&mut cursor, ctx)?);
    }
    Ok(SolValue::Array(items))
}

/// Reads a `bytes`/`string` whose header lives at `slot`.
///
/// Up to 31 bytes are stored inline: the data in the high bytes and
/// `length * 2` in the lowest byte. Longer values store `length * 2 + 1` in
/// the slot and the data from `keccak(slot)` on.
fn decode_storage_bytes(slot: U256, ctx: &StorageContext<'_>) -> Result<Vec<u8>, DecodeError> {
    let header = ctx.storage.read(slot)?;

    if !header.bit(0) {
        let len = ((header & U256::from(0xff)).saturating_to::<usize>() / 2).min(31);
        let word = header.to_be_bytes::<32>();
        return Ok(word[..len.min(ctx.limits.max_bytes_length)].to_vec());
    }

    let len = ((header - U256::from(1)) >> 1usize).saturating_to::<usize>();
    let len = len.min(ctx.limits.max_bytes_length);
    let start = data_slot(slot);

    let mut data = Vec::with_capacity(len.div_ceil(32) * 32);
    for i in 0..len.div_ceil(32) {
        let word = ctx.storage.read(start + U256::from(i))?;
        data.extend_from_slice(&word.to_be_bytes::<32>());
    }
    data.truncate(len);
    Ok(data)
}

/// Recovers mapping entries from recorded preimages.
///
/// Entry `k` of a mapping at slot `p` lives at `keccak(h(k) ++ p)`, where
/// `h(k)` is the padded word for value-type keys and the raw bytes for
/// `bytes`/`string` keys. Every preimage ending in `p` is therefore a key of
/// this mapping.
fn decode_mapping(
    key: &SolType,
    value: &SolType,
    slot: U256,
    ctx: &StorageContext<'_>,
) -> Result<SolValue, DecodeError> {
    let slot_word = B256::from(slot.to_be_bytes::<32>());
    let mut entries = BTreeMap::new();

    for preimage in ctx.preimages.with_suffix(&slot_word) {
        if entries.len() >= ctx.limits.max_mapping_entries {
            trace!(%slot, "mapping truncated at {} entries", entries.len());
            break;
        }

        let key_bytes = &preimage.data[..preimage.data.len() - 32];
        let decoded_key = match key {
            SolType::Bytes => SolValue::Bytes(key_bytes.to_vec()),
            SolType::String => SolValue::String(String::from_utf8_lossy(key_bytes).into_owned()),
            ty if ty.is_value_type() && key_bytes.len() == 32 => {
                ty.decode_word(U256::from_be_slice(key_bytes))
            }
            _ => continue,
        };

        let mut cursor = StorageCursor::new(U256::from_be_bytes(preimage.hash.0));
        let decoded_value = value.decode_storage(&mut cursor, ctx)?;
        let label = match decoded_key {
            SolValue::String(s) => s,
            other => other.to_string(),
        };
        entries.insert(label, decoded_value);
    }

    Ok(SolValue::Mapping(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructType;
    use alloy_primitives::address;

    const ACCOUNT: Address = address!("1000000000000000000000000000000000000001");

    fn word_from(bytes: &[u8]) -> U256 {
        let mut word = [0u8; 32];
        word[..bytes.len()].copy_from_slice(bytes);
        U256::from_be_bytes(word)
    }

    fn decode(
        ty: &SolType,
        slot: u64,
        storage: &InMemoryStorage,
        preimages: &PreimageDictionary,
    ) -> SolValue {
        let ctx = StorageContext {
            storage: AccountStorage::new(storage, ACCOUNT),
            preimages,
            limits: DecodeLimits::default(),
        };
        ty.decode_storage(&mut StorageCursor::new(U256::from(slot)), &ctx).unwrap()
    }

    #[test]
    fn test_absent_storage_is_zero() {
        let storage = InMemoryStorage::new();
        let preimages = PreimageDictionary::new();

        assert_eq!(decode(&SolType::Uint(32), 0, &storage, &preimages).to_string(), "0");
        assert_eq!(decode(&SolType::Bool, 0, &storage, &preimages), SolValue::Bool(false));
        assert_eq!(
            decode(&SolType::Address, 0, &storage, &preimages),
            SolValue::Address(Address::ZERO)
        );
        assert_eq!(
            decode(&SolType::String, 0, &storage, &preimages),
            SolValue::String(String::new())
        );
        assert_eq!(
            decode(&SolType::DynamicArray(Box::new(SolType::Uint(32))), 0, &storage, &preimages),
            SolValue::Array(vec![])
        );
        let balances = SolType::Mapping(Box::new(SolType::Address), Box::new(SolType::Uint(32)));
        assert_eq!(decode(&balances, 0, &storage, &preimages), SolValue::Mapping(BTreeMap::new()));
    }

    #[test]
    fn test_packed_struct() {
        // struct { uint8 a; int8 b; bool c; uint256 d; }
        let ty = SolType::Struct(StructType {
            name: "S".to_string(),
            fields: vec![
                ("a".to_string(), SolType::Uint(1)),
                ("b".to_string(), SolType::Int(1)),
                ("c".to_string(), SolType::Bool),
                ("d".to_string(), SolType::Uint(32)),
            ],
        });
        let mut storage = InMemoryStorage::new();
        storage.set(ACCOUNT, U256::from(5), U256::from(0x01_ff_07u64));
        storage.set(ACCOUNT, U256::from(6), U256::from(42));

        let value = decode(&ty, 5, &storage, &PreimageDictionary::new());
        assert_eq!(value.to_string(), "{a: 7, b: -1, c: true, d: 42}");
    }

    #[test]
    fn test_short_and_long_strings() {
        let mut storage = InMemoryStorage::new();
        // "hello" inline: data in the high bytes, length * 2 in the low byte
        storage.set(ACCOUNT, U256::from(0), word_from(b"hello") | U256::from(10));

        let long = "a string that is definitely longer than thirty one bytes";
        storage.set(ACCOUNT, U256::from(1), U256::from(long.len() * 2 + 1));
        let start = data_slot(U256::from(1));
        for (i, chunk) in long.as_bytes().chunks(32).enumerate() {
            storage.set(ACCOUNT, start + U256::from(i), word_from(chunk));
        }

        let preimages = PreimageDictionary::new();
        assert_eq!(decode(&SolType::String, 0, &storage, &preimages).to_string(), "\"hello\"");
        assert_eq!(
            decode(&SolType::String, 1, &storage, &preimages),
            SolValue::String(long.into())
        );
    }

    #[test]
    fn test_dynamic_array_packs_elements() {
        let mut storage = InMemoryStorage::new();
        storage.set(ACCOUNT, U256::from(3), U256::from(3));
        // three uint128 values: two in the first data slot, one in the next
        let start = data_slot(U256::from(3));
        storage.set(ACCOUNT, start, (U256::from(2) << 128) | U256::from(1));
        storage.set(ACCOUNT, start + U256::from(1), U256::from(3));

        let ty = SolType::DynamicArray(Box::new(SolType::Uint(16)));
        assert_eq!(decode(&ty, 3, &storage, &PreimageDictionary::new()).to_string(), "[1, 2, 3]");
    }

    #[test]
    fn test_mapping_is_independent_of_preimage_order() {
        let k1 = address!("00000000000000000000000000000000000000aa");
        let k2 = address!("00000000000000000000000000000000000000bb");
        let slot = U256::from(2);

        let key_preimage = |key: Address| {
            let mut data = B256::left_padding_from(key.as_slice()).to_vec();
            data.extend_from_slice(&slot.to_be_bytes::<32>());
            data
        };

        let mut storage = InMemoryStorage::new();
        let mut forward = PreimageDictionary::new();
        let h1 = forward.record(&key_preimage(k1));
        let h2 = forward.record(&key_preimage(k2));
        storage.set(ACCOUNT, U256::from_be_bytes(h1.0), U256::from(100));
        storage.set(ACCOUNT, U256::from_be_bytes(h2.0), U256::from(200));

        let mut backward = PreimageDictionary::new();
        backward.record(&key_preimage(k2));
        // unrelated hashes are ignored
        backward.record(b"unrelated");
        backward.record(&key_preimage(k1));

        let ty = SolType::Mapping(Box::new(SolType::Address), Box::new(SolType::Uint(32)));
        let a = decode(&ty, 2, &storage, &forward);
        let b = decode(&ty, 2, &storage, &backward);
        assert_eq!(a, b);

        let SolValue::Mapping(entries) = a else { panic!("expected a mapping") };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[&k1.to_checksum(None)], SolValue::Uint(U256::from(100)));
        assert_eq!(entries[&k2.to_checksum(None)], SolValue::Uint(U256::from(200)));
    }

    #[test]
    fn test_recursive_struct() {
        // struct Node { Node[] children; uint256 value; }
        let mut registry = crate::TypeRegistry::new();
        registry.register_struct(crate::StructDefinition {
            name: "T.Node".to_string(),
            scope: Some("T".to_string()),
            members: vec![
                ("children".to_string(), "struct T.Node storage ref[] storage ref".to_string()),
                ("value".to_string(), "uint256".to_string()),
            ],
        });
        let ty = registry.create("struct T.Node storage ref", None).unwrap();

        let mut storage = InMemoryStorage::new();
        storage.set(ACCOUNT, U256::ZERO, U256::from(1));
        storage.set(ACCOUNT, U256::from(1), U256::from(5));
        storage.set(ACCOUNT, data_slot(U256::ZERO) + U256::from(1), U256::from(7));

        assert_eq!(
            decode(&ty, 0, &storage, &PreimageDictionary::new()).to_string(),
            "{children: [{children: [], value: 7}], value: 5}"
        );
    }

    #[test]
    fn test_string_keyed_mapping() {
        let slot = U256::from(9);
        let mut data = b"alice".to_vec();
        data.extend_from_slice(&slot.to_be_bytes::<32>());

        let mut preimages = PreimageDictionary::new();
        let hash = preimages.record(&data);
        let mut storage = InMemoryStorage::new();
        storage.set(ACCOUNT, U256::from_be_bytes(hash.0), U256::from(1));

        let ty = SolType::Mapping(Box::new(SolType::String), Box::new(SolType::Bool));
        assert_eq!(decode(&ty, 9, &storage, &preimages).to_string(), "{alice => true}");
    }
}
