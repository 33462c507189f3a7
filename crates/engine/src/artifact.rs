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

//! Loading compiler output.
//!
//! Reads the output of `solc --combined-json ast,bin,bin-runtime,srcmap,srcmap-runtime`
//! together with the source texts it was compiled from.

use std::{
    collections::BTreeMap,
    fs,
    ops::Range,
    path::{Path, PathBuf},
};

use alloy_primitives::{hex, Bytes};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{AstError, AstNode, SourceFiles};

/// Length of a library address placeholder in hex characters.
const PLACEHOLDER_HEX_LEN: usize = 40;

/// Errors raised while loading compiler output.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The compiler output is not valid JSON
    #[error("invalid compiler output: {0}")]
    Json(#[from] serde_json::Error),

    /// A source file could not be read
    #[error("failed to read source {path}")]
    Io {
        /// Path that was read
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// A source in the source list has no text
    #[error("no source text for `{0}`")]
    MissingSource(String),

    /// A source has no legacy AST
    #[error("no legacy AST for `{0}`")]
    MissingAst(String),

    /// An AST could not be read
    #[error(transparent)]
    Ast(#[from] AstError),

    /// Bytecode is not hex
    #[error("invalid bytecode for `{contract}`: {reason}")]
    InvalidBytecode {
        /// Contract key
        contract: String,
        /// What went wrong
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct CombinedJson {
    #[serde(default)]
    contracts: BTreeMap<String, CombinedContract>,
    #[serde(rename = "sourceList", default)]
    source_list: Vec<String>,
    #[serde(default)]
    sources: BTreeMap<String, CombinedSource>,
}

#[derive(Debug, Deserialize)]
struct CombinedContract {
    #[serde(default)]
    bin: String,
    #[serde(rename = "bin-runtime", default)]
    bin_runtime: String,
    #[serde(default)]
    srcmap: String,
    #[serde(rename = "srcmap-runtime", default)]
    srcmap_runtime: String,
}

#[derive(Debug, Deserialize)]
struct CombinedSource {
    #[serde(rename = "AST", alias = "legacyAST", default)]
    ast: Option<Value>,
}

/// Bytecode that may still contain unlinked library placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkableCode {
    /// Code with placeholders zero-filled
    pub bytes: Bytes,
    /// Byte ranges whose content is only known after linking or deployment
    pub placeholders: Vec<Range<usize>>,
}

impl LinkableCode {
    /// Parses hex bytecode, zero-filling `__…__` placeholders.
    pub fn parse(code: &str) -> Result<Self, String> {
        let code = code.trim().trim_start_matches("0x");
        let mut bytes = Vec::with_capacity(code.len() / 2);
        let mut placeholders = Vec::new();

        let mut rest = code;
        while !rest.is_empty() {
            match rest.find("__") {
                Some(start) => {
                    if start % 2 != 0 {
                        let at = code.len() - rest.len() + start;
                        return Err(format!("misaligned placeholder at {at}"));
                    }
                    bytes.extend(hex::decode(&rest[..start]).map_err(|e| e.to_string())?);
                    let end = (start + PLACEHOLDER_HEX_LEN).min(rest.len());
                    let filled = (end - start) / 2;
                    placeholders.push(bytes.len()..bytes.len() + filled);
                    bytes.resize(bytes.len() + filled, 0);
                    rest = &rest[end..];
                }
                None => {
                    bytes.extend(hex::decode(rest).map_err(|e| e.to_string())?);
                    rest = "";
                }
            }
        }

        Ok(Self { bytes: bytes.into(), placeholders })
    }

    /// Marks an extra byte range as unknown until deployment.
    pub fn mask(&mut self, range: Range<usize>) {
        self.placeholders.push(range);
    }

    /// Whether `code` is this bytecode.
    ///
    /// Placeholder bytes match anything. With `allow_suffix`, `code` may
    /// continue past the end (constructor arguments); otherwise only
    /// zero padding may follow.
    pub fn matches(&self, code: &[u8], allow_suffix: bool) -> bool {
        if self.bytes.is_empty() || code.len() < self.bytes.len() {
            return false;
        }
        let (head, tail) = code.split_at(self.bytes.len());
        if !allow_suffix && tail.iter().any(|b| *b != 0) {
            return false;
        }
        head.iter().zip(self.bytes.iter()).enumerate().all(|(index, (actual, expected))| {
            actual == expected || self.placeholders.iter().any(|p| p.contains(&index))
        })
    }
}

/// One compiled contract.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    /// Source path
    pub path: String,
    /// Contract name
    pub name: String,
    /// Init code
    pub creation: LinkableCode,
    /// Deployed code
    pub runtime: LinkableCode,
    /// Source map of the init code
    pub creation_source_map: String,
    /// Source map of the deployed code
    pub runtime_source_map: String,
}

/// Everything the compiler produced for one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompilerArtifacts {
    /// Source texts by compiler file index
    pub sources: SourceFiles,
    /// Legacy AST root per file index
    pub asts: Vec<(usize, AstNode)>,
    /// Compiled contracts
    pub contracts: Vec<ContractArtifact>,
}

impl CompilerArtifacts {
    /// Parses combined JSON output, reading source texts relative to `root`.
    pub fn from_combined_json(json: &str, root: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let root = root.as_ref();
        Self::parse(json, |path| {
            let full = root.join(path);
            trace!(path = %full.display(), "reading source");
            fs::read_to_string(&full).map_err(|source| ArtifactError::Io { path: full, source })
        })
    }

    /// Parses combined JSON output with source texts given by path.
    pub fn from_combined_json_with_sources(
        json: &str,
        sources: &BTreeMap<String, String>,
    ) -> Result<Self, ArtifactError> {
        Self::parse(json, |path| {
            sources.get(path).cloned().ok_or_else(|| ArtifactError::MissingSource(path.to_string()))
        })
    }

    fn parse(
        json: &str,
        mut load: impl FnMut(&str) -> Result<String, ArtifactError>,
    ) -> Result<Self, ArtifactError> {
        let mut output: CombinedJson = serde_json::from_str(json)?;
        let mut artifacts = Self::default();

        for (index, path) in output.source_list.iter().enumerate() {
            let content = load(path)?;
            artifacts.sources.add(index, path, content);

            let ast = output
                .sources
                .get_mut(path)
                .and_then(|s| s.ast.take())
                .ok_or_else(|| ArtifactError::MissingAst(path.clone()))?;
            artifacts.asts.push((index, AstNode::from_json(ast)?));
        }

        for (key, contract) in output.contracts {
            let (path, name) = match key.rsplit_once(':') {
                Some((path, name)) => (path.to_string(), name.to_string()),
                None => (String::new(), key.clone()),
            };
            let parse = |code: &str| {
                LinkableCode::parse(code).map_err(|reason| ArtifactError::InvalidBytecode {
                    contract: key.clone(),
                    reason,
                })
            };
            artifacts.contracts.push(ContractArtifact {
                creation: parse(&contract.bin)?,
                runtime: parse(&contract.bin_runtime)?,
                creation_source_map: contract.srcmap,
                runtime_source_map: contract.srcmap_runtime,
                path,
                name,
            });
        }

        debug!(
            sources = artifacts.sources.len(),
            contracts = artifacts.contracts.len(),
            "loaded compiler artifacts"
        );
        Ok(artifacts)
    }
}
