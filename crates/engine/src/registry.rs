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

//! Debug information per deployed address.

use std::sync::Arc;

use alloy_primitives::{map::HashMap, Address};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    CompilerArtifacts, ContractId, LinkableCode, SourceFiles, SourceMap, SourceMapError,
    SymbolError, SymbolTable,
};

/// `PUSH20` opcode, which starts the call guard of deployed libraries.
const PUSH20: u8 = 0x73;

/// Errors raised while preparing debug information.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The symbol table could not be built
    #[error(transparent)]
    Symbols(#[from] SymbolError),

    /// A source map could not be decoded
    #[error("invalid source map for `{contract}`")]
    SourceMap {
        /// Contract name
        contract: String,
        /// Underlying failure
        #[source]
        source: SourceMapError,
    },

    /// No unit with this index was added
    #[error("unknown debug unit {0}")]
    UnknownUnit(usize),

    /// The unit has no compiled contract of this name
    #[error("unknown contract `{0}`")]
    UnknownContract(String),

    /// Several source files declare a contract of this name
    #[error("contract name `{0}` is ambiguous, use `path:Name`")]
    AmbiguousContract(String),
}

/// A compiled contract with its decoded source maps.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    /// Source path
    pub path: String,
    /// Contract name
    pub name: String,
    /// Symbols of the contract, if its definition was found
    pub contract: Option<ContractId>,
    /// Init code
    pub creation: LinkableCode,
    /// Deployed code
    pub runtime: LinkableCode,
    /// Source map of the init code
    pub creation_map: SourceMap,
    /// Source map of the deployed code
    pub runtime_map: SourceMap,
}

/// The debug information of one compilation.
#[derive(Debug, Clone)]
pub struct DebugUnit {
    /// Symbols of all contracts
    pub symbols: SymbolTable,
    /// Source texts
    pub sources: SourceFiles,
    /// Compiled contracts
    pub contracts: Vec<CompiledContract>,
}

impl DebugUnit {
    /// Builds symbols and decodes both source maps of every contract.
    pub fn build(artifacts: &CompilerArtifacts) -> Result<Self, RegistryError> {
        let symbols = SymbolTable::build(&artifacts.asts, &artifacts.sources)?;

        let mut contracts = Vec::with_capacity(artifacts.contracts.len());
        for artifact in &artifacts.contracts {
            let decode = |map: &str, code: &LinkableCode| {
                SourceMap::decode(map, &code.bytes, &artifacts.sources).map_err(|source| {
                    RegistryError::SourceMap { contract: artifact.name.clone(), source }
                })
            };
            let contract = artifacts
                .sources
                .by_path(&artifact.path)
                .and_then(|file| symbols.contract_in(file.index, &artifact.name))
                .or_else(|| symbols.contract_id(&artifact.name));
            let mut runtime = artifact.runtime.clone();

            // Deployed libraries embed their own address behind a leading PUSH20.
            let is_library = contract
                .and_then(|id| symbols.contract(id))
                .map(|c| c.is_library())
                .unwrap_or(false);
            if is_library && runtime.bytes.first() == Some(&PUSH20) {
                runtime.mask(1..21);
            }

            contracts.push(CompiledContract {
                path: artifact.path.clone(),
                name: artifact.name.clone(),
                contract,
                creation_map: decode(&artifact.creation_source_map, &artifact.creation)?,
                runtime_map: decode(&artifact.runtime_source_map, &artifact.runtime)?,
                creation: artifact.creation.clone(),
                runtime,
            });
        }

        debug!(contracts = contracts.len(), "debug unit built");
        Ok(Self { symbols, sources: artifacts.sources.clone(), contracts })
    }

    /// Finds a compiled contract by `path:Name`, or by a bare name that
    /// only one source file declares.
    pub fn contract_index(&self, name: &str) -> Result<usize, RegistryError> {
        let qualified = name.rsplit_once(':');
        let mut matches = self.contracts.iter().enumerate().filter(|(_, c)| match qualified {
            Some((path, contract)) => c.path == path && c.name == contract,
            None => c.name == name,
        });
        match (matches.next(), matches.next()) {
            (Some((index, _)), None) => Ok(index),
            (Some(_), Some(_)) => Err(RegistryError::AmbiguousContract(name.to_string())),
            (None, _) => Err(RegistryError::UnknownContract(name.to_string())),
        }
    }
}

/// The code an address runs, with its debug information.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedCode<'a> {
    /// Compilation the code belongs to
    pub unit: &'a DebugUnit,
    /// The compiled contract
    pub compiled: &'a CompiledContract,
    /// Symbols of the contract
    pub contract: ContractId,
    /// Source map for the code being executed
    pub source_map: &'a SourceMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodeLink {
    unit: usize,
    contract: usize,
}

/// Debug units and the addresses running their code.
///
/// Units are immutable once added and shared between clones.
#[derive(Debug, Clone, Default)]
pub struct DebugRegistry {
    units: Vec<Arc<DebugUnit>>,
    links: HashMap<Address, CodeLink>,
}

impl DebugRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit and returns its index.
    pub fn add_unit(&mut self, unit: DebugUnit) -> usize {
        self.units.push(Arc::new(unit));
        self.units.len() - 1
    }

    /// All units.
    pub fn units(&self) -> &[Arc<DebugUnit>] {
        &self.units
    }

    /// Declares that `address` runs the contract `name` of unit `unit`.
    ///
    /// `name` is `path:Name` or a bare contract name.
    pub fn link(
        &mut self,
        address: Address,
        unit: usize,
        name: &str,
    ) -> Result<(), RegistryError> {
        let debug_unit = self.units.get(unit).ok_or(RegistryError::UnknownUnit(unit))?;
        let contract = debug_unit.contract_index(name)?;
        debug!(%address, contract = name, "linked address");
        self.links.insert(address, CodeLink { unit, contract });
        Ok(())
    }

    /// Links `address` to the contract whose code is `code`, unless it is
    /// linked already. Returns whether the address is linked afterwards.
    pub fn link_by_code(&mut self, address: Address, code: &[u8], creation: bool) -> bool {
        if self.links.contains_key(&address) {
            return true;
        }
        let found = self.units.iter().enumerate().find_map(|(unit, u)| {
            u.contracts.iter().position(|c| {
                if creation {
                    c.creation.matches(code, true)
                } else {
                    c.runtime.matches(code, false)
                }
            })
            .map(|contract| CodeLink { unit, contract })
        });

        match found {
            Some(link) => {
                trace!(%address, creation, "linked address by code");
                self.links.insert(address, link);
                true
            }
            None => false,
        }
    }

    /// Whether `address` has debug information.
    pub fn is_linked(&self, address: &Address) -> bool {
        self.links.contains_key(address)
    }

    /// Forgets the link of `address`.
    pub fn unlink(&mut self, address: &Address) {
        self.links.remove(address);
    }

    /// The debug information for the code at `address`.
    ///
    /// `creation` selects the init code source map.
    pub fn resolve(&self, address: &Address, creation: bool) -> Option<ResolvedCode<'_>> {
        let link = self.links.get(address)?;
        let unit = self.units.get(link.unit)?;
        let compiled = unit.contracts.get(link.contract)?;
        Some(ResolvedCode {
            unit,
            compiled,
            contract: compiled.contract?,
            source_map: if creation { &compiled.creation_map } else { &compiled.runtime_map },
        })
    }
}
