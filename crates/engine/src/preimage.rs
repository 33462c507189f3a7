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

//! Hash preimages observed during execution.

use alloy_primitives::{keccak256, Bytes, B256};

/// One hashed input and its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preimage {
    /// Hashed bytes
    pub data: Bytes,
    /// `keccak256(data)`
    pub hash: B256,
}

/// Append-only record of every `KECCAK256` input seen in a VM context.
///
/// Storage slots of mapping entries are hashes of `key ++ slot`, so this
/// dictionary is what lets mappings be enumerated. It only ever grows while
/// its context lives.
#[derive(Debug, Clone, Default)]
pub struct PreimageDictionary {
    entries: Vec<Preimage>,
}

impl PreimageDictionary {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes `data`, records the pair and returns the digest.
    pub fn record(&mut self, data: &[u8]) -> B256 {
        let hash = keccak256(data);
        self.record_with_hash(Bytes::copy_from_slice(data), hash);
        hash
    }

    /// Records a pair whose digest is already known.
    pub fn record_with_hash(&mut self, data: Bytes, hash: B256) {
        self.entries.push(Preimage { data, hash });
    }

    /// Preimages of at least 32 bytes whose last word is `suffix`.
    pub fn with_suffix<'a>(&'a self, suffix: &'a B256) -> impl Iterator<Item = &'a Preimage> + 'a {
        self.entries.iter().filter(move |p| {
            p.data.len() >= 32 && p.data[p.data.len() - 32..] == suffix.as_slice()[..]
        })
    }

    /// Looks up the preimage of a digest.
    pub fn preimage_of(&self, hash: &B256) -> Option<&Preimage> {
        self.entries.iter().find(|p| &p.hash == hash)
    }

    /// All recorded pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Preimage> {
        self.entries.iter()
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let mut dict = PreimageDictionary::new();
        let slot = B256::with_last_byte(3);

        let mut data = vec![0u8; 32];
        data[31] = 0xaa;
        data.extend_from_slice(slot.as_slice());
        let hash = dict.record(&data);
        dict.record(b"short");
        dict.record(slot.as_slice());

        assert_eq!(dict.len(), 3);
        assert_eq!(hash, keccak256(&data));
        assert_eq!(dict.preimage_of(&hash).map(|p| p.data.len()), Some(64));
        // the bare slot hash (array data) also ends with the slot
        assert_eq!(dict.with_suffix(&slot).count(), 2);
        assert_eq!(dict.with_suffix(&B256::with_last_byte(4)).count(), 0);
    }
}
