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

//! The solc legacy AST.
//!
//! Every node carries a `name` (the node kind), a `src` location string, a
//! free-form `attributes` object and its `children` in source order.

use std::str::FromStr;

use foundry_compilers::artifacts::ast::SourceLocation;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::SourceRange;

/// Errors raised while reading legacy AST nodes.
#[derive(Debug, Error)]
pub enum AstError {
    /// The `src` attribute is not `start:length:file`
    #[error("invalid source location `{0}`")]
    InvalidSrc(String),

    /// A node lacks something its kind requires
    #[error("malformed {node} node: {reason}")]
    Malformed {
        /// Node kind
        node: String,
        /// What is missing
        reason: String,
    },

    /// The JSON does not describe a node tree
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A node of the legacy AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstNode {
    /// Node id, unique within a compilation
    #[serde(default)]
    pub id: Option<u64>,
    /// Node kind, e.g. `ContractDefinition`
    pub name: String,
    /// `start:length:file`
    #[serde(default)]
    pub src: String,
    /// Kind-specific attributes
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Child nodes in source order
    #[serde(default)]
    pub children: Vec<AstNode>,
}

impl AstNode {
    /// Parses a node tree from JSON.
    pub fn from_json(value: Value) -> Result<Self, AstError> {
        Ok(serde_json::from_value(value)?)
    }

    /// String attribute.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Boolean attribute; absent or `null` reads as `false`.
    pub fn attr_bool(&self, key: &str) -> bool {
        self.attributes.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// List of integer ids, e.g. `linearizedBaseContracts`.
    pub fn attr_ids(&self, key: &str) -> Vec<u64> {
        self.attributes
            .get(key)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default()
    }

    /// The `name` attribute, which most declarations carry.
    pub fn declared_name(&self) -> Option<&str> {
        self.attr_str("name")
    }

    /// The `name` attribute, or an error naming this node kind.
    pub fn require_name(&self) -> Result<&str, AstError> {
        self.declared_name().ok_or_else(|| AstError::Malformed {
            node: self.name.clone(),
            reason: "missing `name` attribute".to_string(),
        })
    }

    /// Parses `src`. Generated code (`-1` fields) yields `None`.
    pub fn range(&self) -> Result<Option<SourceRange>, AstError> {
        let location = SourceLocation::from_str(&self.src)
            .map_err(|_| AstError::InvalidSrc(self.src.clone()))?;
        Ok(SourceRange::from_location(&location))
    }

    /// Children of a given kind.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First child of a given kind.
    pub fn child_named(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Visits this node and all descendants depth-first, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}
