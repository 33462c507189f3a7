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

//! Debug symbols recovered from the legacy AST.
//!
//! The table is built in two passes. The first pass records every contract
//! with its state variables, functions and modifiers. The second pass links
//! inheritance, lays out storage and resolves modifier invocations, which
//! may name definitions appearing later in the compilation.

mod builder;

mod contract;
pub use contract::*;

mod method;
pub use method::*;

mod variable;
pub use variable::*;

use itertools::Itertools;
use thiserror::Error;

use crate::{AstError, SourceExtent, TypeRegistry};

/// Errors that abort building a symbol table.
#[derive(Debug, Error)]
pub enum SymbolError {
    /// An AST node could not be read
    #[error(transparent)]
    Ast(#[from] AstError),

    /// A node refers to a source file that was not loaded
    #[error("source file {0} is not available")]
    MissingSource(usize),

    /// A definition has no source location
    #[error("{node} `{name}` has no source location")]
    MissingLocation {
        /// Node kind
        node: String,
        /// Declared name
        name: String,
    },
}

/// Contracts, methods and types of one compilation.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    contracts: Vec<Contract>,
    types: TypeRegistry,
    library_internals: Vec<MethodId>,
}

impl SymbolTable {
    /// All contracts in declaration order.
    pub fn contracts(&self) -> &[Contract] {
        &self.contracts
    }

    /// Looks up a contract.
    pub fn contract(&self, id: ContractId) -> Option<&Contract> {
        self.contracts.get(id.0)
    }

    /// Finds a contract by name.
    pub fn contract_id(&self, name: &str) -> Option<ContractId> {
        self.contracts.iter().position(|c| c.name == name).map(ContractId)
    }

    /// Finds a contract by name among those declared in source `file`.
    pub fn contract_in(&self, file: usize, name: &str) -> Option<ContractId> {
        self.contracts.iter().position(|c| c.file == file && c.name == name).map(ContractId)
    }

    /// Looks up a method.
    pub fn method(&self, id: MethodId) -> Option<&Method> {
        self.contract(id.contract)?.methods.get(id.index)
    }

    /// The user-defined types of the compilation.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Internal and private library functions.
    pub fn library_internals(&self) -> &[MethodId] {
        &self.library_internals
    }

    /// `Contract.method` for display.
    pub fn qualified_name(&self, id: MethodId) -> String {
        match (self.contract(id.contract), self.method(id)) {
            (Some(contract), Some(method)) => format!("{}.{}", contract.name, method.name),
            _ => format!("<unknown {}:{}>", id.contract, id.index),
        }
    }

    /// Functions that may execute in code compiled for `contract`.
    ///
    /// These are the functions of its linearized bases plus every internal
    /// library function, since the compiler inlines internal library calls
    /// into the caller's code.
    pub fn visible_functions(&self, contract: ContractId) -> Vec<MethodId> {
        let Some(entry) = self.contract(contract) else {
            return Vec::new();
        };
        let bases =
            if entry.linearized.is_empty() { vec![contract] } else { entry.linearized.clone() };

        bases
            .into_iter()
            .filter_map(|id| self.contract(id).map(|c| (id, c)))
            .flat_map(|(id, c)| {
                c.methods
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.is_function())
                    .map(move |(index, _)| MethodId { contract: id, index })
            })
            .chain(self.library_internals.iter().copied())
            .unique()
            .collect()
    }

    /// Finds the function a source extent belongs to.
    ///
    /// A function whose whole definition matches `extent` wins, then one
    /// whose body matches it. Anything else, including code inside a
    /// function, resolves to `None`.
    pub fn resolve_method(
        &self,
        contract: ContractId,
        extent: &SourceExtent,
    ) -> Option<MethodId> {
        let candidates: Vec<_> = self
            .visible_functions(contract)
            .into_iter()
            .filter_map(|id| self.method(id).map(|m| (id, m)))
            .collect();

        candidates
            .iter()
            .find(|(_, m)| m.extent == *extent)
            .or_else(|| candidates.iter().find(|(_, m)| m.body.as_ref() == Some(extent)))
            .map(|(id, _)| *id)
    }
}
