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

use std::{fmt::Display, str::FromStr};

use eyre::{bail, eyre, Error, Result};
use serde::{Deserialize, Serialize};

/// A line breakpoint in a source file.
///
/// Lines are 0-based, the same numbering produced by the source map decoder.
/// The `source` is matched against the mapped file path either exactly or as
/// a path suffix that starts at a `/` boundary, so `Token.sol` matches
/// `contracts/Token.sol` but not `contracts/MyToken.sol`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Breakpoint {
    /// Path (or path suffix) of the source file.
    pub source: String,
    /// 0-based line number.
    pub line: usize,
}

impl Breakpoint {
    /// Creates a new breakpoint.
    pub fn new(source: impl Into<String>, line: usize) -> Self {
        Self { source: source.into(), line }
    }

    /// Whether this breakpoint covers `line` of the file at `path`.
    pub fn matches(&self, path: &str, line: usize) -> bool {
        self.line == line && source_matches(&self.source, path)
    }
}

/// Whether a breakpoint source designates the file at `path`.
pub fn source_matches(source: &str, path: &str) -> bool {
    if source == path {
        return true;
    }
    path.strip_suffix(source).is_some_and(|prefix| prefix.ends_with('/'))
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.line)
    }
}

impl FromStr for Breakpoint {
    type Err = Error;

    /// Parses a breakpoint from `<source>:<line>`.
    ///
    /// The line is taken from the last `:` so paths containing colons still
    /// parse.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let Some((source, line)) = trimmed.rsplit_once(':') else {
            bail!("Invalid breakpoint format. Expected <source>:<line>, got: {s}");
        };

        let source = source.trim();
        if source.is_empty() {
            bail!("Breakpoint source is empty: {s}");
        }
        let line = line.trim().parse::<usize>().map_err(|e| eyre!("Invalid line number: {e}"))?;

        Ok(Self::new(source, line))
    }
}

/// A breakpoint as requested by a collaborator.
///
/// Editors usually send a column along with the line; the debugger only
/// tracks lines, so the column is accepted and ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakpointRequest {
    /// 0-based line number.
    pub line: usize,
    /// Optional column, ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    /// Source path or suffix.
    pub source: String,
}

impl From<BreakpointRequest> for Breakpoint {
    fn from(req: BreakpointRequest) -> Self {
        Self::new(req.source, req.line)
    }
}
