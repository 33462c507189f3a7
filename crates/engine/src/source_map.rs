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

//! Compiler source maps.
//!
//! A source map is a `;`-separated list with one `start:length:file:jump`
//! entry per instruction. Empty fields repeat the previous entry's value.

use std::{collections::HashMap, fmt};

use sdb_common::immediate_len;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SourceFiles, SourceRange, SourceSpan};

/// Errors raised while decoding a source map.
#[derive(Debug, Error)]
pub enum SourceMapError {
    /// A numeric field does not parse
    #[error("invalid field `{field}` in source map entry {entry}")]
    InvalidField {
        /// Entry index
        entry: usize,
        /// Offending field
        field: String,
    },

    /// A jump field is not `i`, `o` or `-`
    #[error("invalid jump type `{jump}` in source map entry {entry}")]
    InvalidJump {
        /// Entry index
        entry: usize,
        /// Offending field
        jump: String,
    },
}

/// How an instruction moves between functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JumpType {
    /// Jump into a function
    In,
    /// Return from a function
    Out,
    /// Anything else
    #[default]
    Regular,
}

impl JumpType {
    /// The source map character for this jump type.
    pub fn as_char(&self) -> char {
        match self {
            Self::In => 'i',
            Self::Out => 'o',
            Self::Regular => '-',
        }
    }
}

impl fmt::Display for JumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// The source position of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapping {
    /// Program counter of the instruction
    pub pc: usize,
    /// Resolved location; `None` for compiler-generated code
    pub span: Option<SourceSpan>,
    /// Jump tag
    pub jump: JumpType,
}

/// A decoded source map, indexed by program counter.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    mappings: Vec<SourceMapping>,
    by_pc: HashMap<usize, usize>,
}

#[derive(Debug, Clone, Copy)]
struct RawEntry {
    start: i64,
    length: i64,
    file: i64,
    jump: JumpType,
}

fn parse_field(entry: usize, field: &str) -> Result<i64, SourceMapError> {
    field.parse().map_err(|_| SourceMapError::InvalidField { entry, field: field.to_string() })
}

impl SourceMap {
    /// Decodes `source_map` against the `bytecode` it describes.
    ///
    /// Entries are paired with instructions in order. Program counters skip
    /// the immediate bytes of `PUSH1`..`PUSH32`; entries beyond the end of
    /// the bytecode get consecutive counters. A `-1` start or file, or a file
    /// index missing from `sources`, leaves the mapping without a span.
    pub fn decode(
        source_map: &str,
        bytecode: &[u8],
        sources: &SourceFiles,
    ) -> Result<Self, SourceMapError> {
        let mut map = Self::default();
        if source_map.is_empty() {
            return Ok(map);
        }

        let mut previous = RawEntry { start: -1, length: -1, file: -1, jump: JumpType::Regular };
        let mut pc = 0usize;

        for (index, entry) in source_map.split(';').enumerate() {
            let mut current = previous;
            let mut fields = entry.split(':');

            if let Some(field) = fields.next().filter(|f| !f.is_empty()) {
                current.start = parse_field(index, field)?;
            }
            if let Some(field) = fields.next().filter(|f| !f.is_empty()) {
                current.length = parse_field(index, field)?;
            }
            if let Some(field) = fields.next().filter(|f| !f.is_empty()) {
                current.file = parse_field(index, field)?;
            }
            if let Some(field) = fields.next().filter(|f| !f.is_empty()) {
                current.jump = match field {
                    "i" => JumpType::In,
                    "o" => JumpType::Out,
                    "-" => JumpType::Regular,
                    _ => {
                        return Err(SourceMapError::InvalidJump {
                            entry: index,
                            jump: field.to_string(),
                        })
                    }
                };
            }
            // A fifth (modifier depth) field may follow; it is not needed.

            let span = match (
                usize::try_from(current.start),
                usize::try_from(current.length),
                usize::try_from(current.file),
            ) {
                (Ok(start), Ok(length), Ok(file)) => {
                    sources.span(SourceRange::new(file, start, length))
                }
                _ => None,
            };

            map.by_pc.insert(pc, map.mappings.len());
            map.mappings.push(SourceMapping { pc, span, jump: current.jump });

            pc += match bytecode.get(pc) {
                Some(opcode) => 1 + immediate_len(*opcode),
                None => 1,
            };
            previous = current;
        }

        Ok(map)
    }

    /// The mapping of the instruction at `pc`.
    pub fn get(&self, pc: usize) -> Option<&SourceMapping> {
        self.by_pc.get(&pc).map(|index| &self.mappings[*index])
    }

    /// All mappings in instruction order.
    pub fn mappings(&self) -> &[SourceMapping] {
        &self.mappings
    }

    /// Number of mappings.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;

    fn sources() -> SourceFiles {
        let mut sources = SourceFiles::new();
        sources.add(0, "A.sol", "contract A {\n  uint x;\n  function f() {}\n}\n");
        sources
    }

    #[test]
    fn test_one_mapping_per_entry() {
        // PUSH1 0x80, PUSH1 0x40, MSTORE, CALLVALUE
        let bytecode = [0x60, 0x80, 0x60, 0x40, 0x52, 0x34];
        let map = SourceMap::decode("0:44:0:-;;;15:6:0:i", &bytecode, &sources()).unwrap();

        assert_eq!(map.len(), 4);
        let pcs: Vec<_> = map.mappings().iter().map(|m| m.pc).collect();
        assert_eq!(pcs, vec![0, 2, 4, 5]);
        assert!(pcs.windows(2).all(|w| w[0] < w[1]));

        // empty entries repeat the previous one
        assert_eq!(map.get(2).unwrap().span, map.get(0).unwrap().span);

        let last = map.get(5).unwrap();
        assert_eq!(last.jump, JumpType::In);
        let span = last.span.as_ref().unwrap();
        assert_eq!(span.start, Position::new(1, 2));
        assert_eq!(&*span.path, "A.sol");

        // immediates never get a mapping
        assert!(map.get(1).is_none());
        assert!(map.get(3).is_none());
    }

    #[test]
    fn test_push32_immediate() {
        let mut bytecode = vec![0x7f];
        bytecode.extend([0u8; 32]);
        bytecode.push(0x00);
        let map = SourceMap::decode("0:1:0;1:1:0", &bytecode, &sources()).unwrap();
        assert_eq!(map.mappings()[1].pc, 33);
    }

    #[test]
    fn test_generated_code_has_no_span() {
        let map = SourceMap::decode("-1:-1:-1;0:1:0;5:1:-1;0:1:7", &[0x00; 4], &sources()).unwrap();
        let spans: Vec<_> = map.mappings().iter().map(|m| m.span.is_some()).collect();
        assert_eq!(spans, vec![false, true, false, false]);
    }

    #[test]
    fn test_entries_past_bytecode_end() {
        let map = SourceMap::decode("0:1:0;;;", &[0x60], &sources()).unwrap();
        let pcs: Vec<_> = map.mappings().iter().map(|m| m.pc).collect();
        assert_eq!(pcs, vec![0, 2, 3, 4]);
    }

    #[test]
    fn test_empty_and_invalid() {
        assert!(SourceMap::decode("", &[0x00], &sources()).unwrap().is_empty());
        assert!(matches!(
            SourceMap::decode("0:1:0;x:1:0", &[0x00, 0x00], &sources()),
            Err(SourceMapError::InvalidField { entry: 1, .. })
        ));
        assert!(matches!(
            SourceMap::decode("0:1:0:q", &[0x00], &sources()),
            Err(SourceMapError::InvalidJump { entry: 0, .. })
        ));
    }
}
