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

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Method, Variable};

/// Identifies a contract within a [`SymbolTable`](super::SymbolTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractId(pub usize);

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of contract a definition declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    /// `contract`
    #[default]
    Contract,
    /// `library`
    Library,
    /// `interface`
    Interface,
}

impl ContractKind {
    /// Reads the `contractKind` AST attribute, falling back to the older
    /// `isLibrary` flag.
    pub fn from_attributes(kind: Option<&str>, is_library: bool) -> Self {
        match kind {
            Some("library") => Self::Library,
            Some("interface") => Self::Interface,
            _ if is_library => Self::Library,
            _ => Self::Contract,
        }
    }
}

/// A contract, library or interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    /// Declared name
    pub name: String,
    /// Source file index
    pub file: usize,
    /// Contract, library or interface
    pub kind: ContractKind,
    /// AST node id
    pub ast_id: Option<u64>,
    /// AST ids of the linearized bases, most derived first
    pub linearized_ids: Vec<u64>,
    /// State variables declared by this contract
    pub state_variables: Vec<Variable>,
    /// All state variables including inherited ones, with their slots
    pub storage_layout: Vec<Variable>,
    /// Functions and modifiers declared by this contract
    pub methods: Vec<Method>,
    /// Direct base names as written
    pub parent_names: Vec<String>,
    /// Resolved direct bases
    pub parents: Vec<ContractId>,
    /// Resolved linearization, most derived first, starting with this contract
    pub linearized: Vec<ContractId>,
}

impl Contract {
    /// Whether this is a library.
    pub fn is_library(&self) -> bool {
        self.kind == ContractKind::Library
    }

    /// Finds a declared method by name.
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    /// Finds a declared modifier by name.
    pub fn modifier_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.is_modifier() && m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_attributes() {
        assert_eq!(ContractKind::from_attributes(Some("library"), false), ContractKind::Library);
        assert_eq!(
            ContractKind::from_attributes(Some("interface"), false),
            ContractKind::Interface
        );
        assert_eq!(ContractKind::from_attributes(None, true), ContractKind::Library);
        assert_eq!(ContractKind::from_attributes(Some("contract"), false), ContractKind::Contract);
    }
}
