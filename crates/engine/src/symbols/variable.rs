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
use serde::{Deserialize, Serialize};

use crate::{normalize_descriptor, DataLocation, Position, SolType, SourceExtent};

/// What declared a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    /// Contract state variable
    State,
    /// Function or modifier parameter
    Argument,
    /// Named or unnamed return parameter
    Return,
    /// Block-scoped local
    Local,
}

/// A source-level variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Declared name, empty for unnamed parameters
    pub name: String,
    /// The compiler's type descriptor
    pub descriptor: String,
    /// Resolved type; `None` if the type is not supported
    pub ty: Option<SolType>,
    /// Where the data lives
    pub location: DataLocation,
    /// Stack slots taken when held on the stack
    pub stack_slots: usize,
    /// Offset from the first slot of the owning method
    pub stack_offset: usize,
    /// Slot and byte offset of a state variable in the storage layout
    pub storage: Option<(U256, usize)>,
    /// Extent of the declaring statement, for locals
    pub declaration: Option<SourceExtent>,
    /// Extent of the enclosing block, for locals
    pub scope: Option<SourceExtent>,
    /// Declaration kind
    pub kind: VariableKind,
}

impl Variable {
    /// Creates a variable, working out its stack width even if its type is
    /// unsupported.
    pub fn new(
        name: impl Into<String>,
        descriptor: impl Into<String>,
        ty: Option<SolType>,
        location: DataLocation,
        kind: VariableKind,
    ) -> Self {
        let descriptor = descriptor.into();
        let stack_slots = match &ty {
            Some(ty) => ty.stack_slots(location),
            None => fallback_stack_slots(&descriptor, location),
        };
        Self {
            name: name.into(),
            descriptor,
            ty,
            location,
            stack_slots,
            stack_offset: 0,
            storage: None,
            declaration: None,
            scope: None,
            kind,
        }
    }

    /// Whether the variable can be shown at `position`.
    ///
    /// Parameters are always visible. Locals are visible inside their scope
    /// once their declaration has started.
    pub fn is_visible_at(&self, file: usize, position: Position) -> bool {
        if self.kind != VariableKind::Local {
            return true;
        }
        let in_scope = self.scope.map(|s| s.contains(file, position)).unwrap_or(true);
        let declared =
            self.declaration.map(|d| d.file == file && d.start <= position).unwrap_or(true);
        in_scope && declared
    }
}

/// Stack width of a variable whose type could not be resolved.
fn fallback_stack_slots(descriptor: &str, location: DataLocation) -> usize {
    let descriptor = normalize_descriptor(descriptor);
    let dynamic = descriptor == "bytes" || descriptor == "string" || descriptor.ends_with("[]");
    if location == DataLocation::Calldata && dynamic {
        2
    } else {
        1
    }
}
