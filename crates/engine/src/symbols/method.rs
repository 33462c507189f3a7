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

use serde::{Deserialize, Serialize};

use super::{ContractId, Variable};
use crate::{Position, SourceExtent};

/// Identifies a method within a [`SymbolTable`](super::SymbolTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodId {
    /// Owning contract
    pub contract: ContractId,
    /// Index in the contract's method list
    pub index: usize,
}

/// Function visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// `external`
    External,
    /// `public`
    #[default]
    Public,
    /// `internal`
    Internal,
    /// `private`
    Private,
}

impl Visibility {
    /// Reads a `visibility` AST attribute.
    pub fn from_attribute(visibility: Option<&str>) -> Self {
        match visibility {
            Some("external") => Self::External,
            Some("internal") => Self::Internal,
            Some("private") => Self::Private,
            _ => Self::Public,
        }
    }

    /// Internal and private functions are only reachable by internal jumps.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal | Self::Private)
    }
}

/// The two kinds of methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    /// A function, possibly a constructor
    Function {
        /// Whether this is the contract's constructor
        is_constructor: bool,
        /// Declared visibility
        visibility: Visibility,
    },
    /// A modifier
    Modifier,
}

/// A modifier applied to a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierInvocation {
    /// Name as written at the invocation
    pub name: String,
    /// Extent of the invocation in the function header
    pub site: Option<SourceExtent>,
    /// The modifier, once resolved. Base constructor calls stay `None`.
    pub method: Option<MethodId>,
    /// Offset at which the modifier's own variables start
    pub stack_offset: usize,
}

/// A function or modifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    /// Declared name; constructors are named `constructor`
    pub name: String,
    /// Owning contract
    pub contract: ContractId,
    /// Source file index
    pub file: usize,
    /// Function or modifier
    pub kind: MethodKind,
    /// Extent of the whole definition
    pub extent: SourceExtent,
    /// Extent of the body block, if implemented
    pub body: Option<SourceExtent>,
    /// Parameters
    pub arguments: Vec<Variable>,
    /// Return parameters
    pub returns: Vec<Variable>,
    /// Block-scoped locals in declaration order
    pub locals: Vec<Variable>,
    /// Applied modifiers in order
    pub modifiers: Vec<ModifierInvocation>,
    /// Extents of local variable declaration statements
    pub declaration_spans: Vec<SourceExtent>,
    /// Stack slots of the method's own variables
    pub own_slots: usize,
    /// Own slots plus those of all applied modifiers
    pub total_slots: usize,
}

impl Method {
    /// Whether this is a function.
    pub fn is_function(&self) -> bool {
        matches!(self.kind, MethodKind::Function { .. })
    }

    /// Whether this is a modifier.
    pub fn is_modifier(&self) -> bool {
        matches!(self.kind, MethodKind::Modifier)
    }

    /// Whether this is a constructor.
    pub fn is_constructor(&self) -> bool {
        matches!(self.kind, MethodKind::Function { is_constructor: true, .. })
    }

    /// Declared visibility; modifiers are internal.
    pub fn visibility(&self) -> Visibility {
        match self.kind {
            MethodKind::Function { visibility, .. } => visibility,
            MethodKind::Modifier => Visibility::Internal,
        }
    }

    /// Stack slots taken by the arguments.
    pub fn argument_slots(&self) -> usize {
        self.arguments.iter().map(|v| v.stack_slots).sum()
    }

    /// All own variables in stack order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.arguments.iter().chain(&self.returns).chain(&self.locals)
    }

    /// Lays out arguments, returns and locals in that order and records
    /// [`Self::own_slots`].
    pub fn assign_stack_offsets(&mut self) {
        let mut offset = 0;
        for var in self.arguments.iter_mut().chain(&mut self.returns).chain(&mut self.locals) {
            var.stack_offset = offset;
            offset += var.stack_slots;
        }
        self.own_slots = offset;
        self.total_slots = offset;
    }

    /// Whether `position` lies in the body block.
    pub fn in_body(&self, file: usize, position: Position) -> bool {
        self.body.map(|b| b.contains(file, position)).unwrap_or(false)
    }

    /// Whether `position` lies in a local variable declaration statement.
    pub fn in_declaration(&self, file: usize, position: Position) -> bool {
        self.declaration_spans.iter().any(|span| span.contains(file, position))
    }

    /// Index of the modifier invocation written at `position`.
    pub fn invocation_at(&self, file: usize, position: Position) -> Option<usize> {
        self.modifiers
            .iter()
            .position(|m| m.site.map(|site| site.contains(file, position)).unwrap_or(false))
    }
}
