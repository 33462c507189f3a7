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

//! SDB Engine - source-level debugging for Solidity on revm
//!
//! Debug information is recovered from compiler output ([`CompilerArtifacts`])
//! into a [`DebugRegistry`]. A [`Debugger`] replays every VM step against it,
//! reconstructs the Solidity call stack, decides when to pause and decodes
//! variables for the pause notification. [`DebugInspector`] plugs the
//! debugger into revm and blocks the VM through an [`ExecutionController`].

pub mod artifact;
pub use artifact::*;

pub mod ast;
pub use ast::*;

pub mod config;
pub use config::*;

pub mod controller;
pub use controller::*;

pub mod debugger;
pub use debugger::*;

pub mod inspector;
pub use inspector::*;

pub mod preimage;
pub use preimage::*;

pub mod registry;
pub use registry::*;

pub mod snapshot;
pub use snapshot::*;

pub mod source;
pub use source::*;

pub mod source_map;
pub use source_map::*;

pub mod symbols;
pub use symbols::*;

pub mod tracer;
pub use tracer::*;

pub mod types;
pub use types::*;
