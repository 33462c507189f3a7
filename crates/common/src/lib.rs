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

//! SDB Common - Shared functionality for SDB components
//!
//! This crate holds the pieces that collaborators of the debug engine need to
//! speak to it without depending on the engine itself: breakpoint values, the
//! pause notification payload, EVM opcode helpers and the logging setup.

/// Wire types exchanged with the debugger (breakpoints, pause notifications)
pub mod types;

/// Logging setup and utilities for consistent logging across SDB components
pub mod logging;
/// Opcode helpers used by the source map decoder and the tracers
pub mod opcode;

pub use logging::*;
pub use opcode::*;
pub use types::*;
