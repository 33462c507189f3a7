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

//! Payloads published when the debugger pauses, and the commands that
//! resume it.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Notification emitted when execution pauses on a breakpoint or step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PauseNotification {
    /// The source line that triggered the pause
    pub breakpoint: BreakpointHit,
    /// Source-level call stack, innermost call first
    pub call_stack: Vec<CallSnapshot>,
}

/// The location at which execution paused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakpointHit {
    /// 0-based line number
    pub line: usize,
    /// Path of the source file
    pub source: String,
}

/// One source-level call (function or modifier invocation) at pause time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    /// `Contract.method`, or `Contract.method > modifier` while inside a modifier
    pub name: String,
    /// Current source position of this call, if any
    pub mapping: Option<MappingInfo>,
    /// Decoded state variables of the executing contract
    pub storage: Vec<VariableSnapshot>,
    /// Decoded arguments, returns and in-scope locals
    pub vars: Vec<VariableSnapshot>,
    /// Set when state could not be retrieved for this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serializable view of a source mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MappingInfo {
    /// Program counter
    pub pc: usize,
    /// 0-based line
    pub line: usize,
    /// 0-based column
    pub column: usize,
    /// Compiler file index
    pub file_index: usize,
    /// File path
    pub source: String,
    /// Jump tag: `i`, `o` or `-`
    pub jump: char,
}

/// A decoded variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableSnapshot {
    /// Variable name
    pub name: String,
    /// Solidity type, e.g. `uint256` or `mapping(address => uint256)`
    #[serde(rename = "type")]
    pub ty: String,
    /// Decoded value
    pub value: serde_json::Value,
}

/// Command that releases a paused execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DebugCommand {
    /// Continue until the next breakpoint
    Resume,
    /// Pause on the next distinct source line
    StepInto,
    /// Pause on the next line at the same or a shallower call depth
    StepOver,
    /// Pause on the next line after the current call returns
    StepOut,
}

impl Display for DebugCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resume => "resume",
            Self::StepInto => "stepInto",
            Self::StepOver => "stepOver",
            Self::StepOut => "stepOut",
        };
        f.write_str(name)
    }
}
