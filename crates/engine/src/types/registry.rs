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

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use tracing::debug;

use super::{DecodeError, EnumType, SolType, StructType};

/// Nesting depth at which type resolution gives up.
const MAX_TYPE_DEPTH: usize = 32;

/// Number of times a recursive struct is expanded again while decoding.
const MAX_STRUCT_UNFOLDS: usize = 32;

/// Data-location words the compiler appends to type descriptors.
const LOCATION_WORDS: &[&str] = &["storage", "memory", "calldata", "ref", "pointer", "slice"];

/// A recognizer for one family of type descriptors.
type Matcher = fn(&TypeRegistry, &str, Option<&str>, &mut Expansion) -> Option<SolType>;

/// Matchers in priority order. Mappings and arrays come first since their
/// descriptors embed other descriptors.
const MATCHERS: &[Matcher] =
    &[match_mapping, match_array, match_elementary, match_struct, match_enum, match_contract];

/// A struct as declared, with its member descriptors still unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDefinition {
    /// Canonical name, e.g. `Token.Info`
    pub name: String,
    /// Declaring contract, if any
    pub scope: Option<String>,
    /// Member names and type descriptors
    pub members: Vec<(String, String)>,
}

/// A struct member that refers back to a struct still being expanded.
///
/// Resolving it expands the struct one more level, so recursive types cost
/// as much as the data decoded through them.
#[derive(Clone)]
pub struct StructRef {
    /// Canonical name of the referenced struct
    pub name: String,
    scope: Option<String>,
    unfolds: usize,
    registry: TypeRegistry,
}

impl StructRef {
    /// Expands the referenced struct by one level.
    pub fn resolve(&self) -> Result<SolType, DecodeError> {
        let unresolved = || DecodeError::Unresolved { name: self.name.clone() };
        if self.unfolds > MAX_STRUCT_UNFOLDS {
            return Err(unresolved());
        }
        let mut expansion = Expansion { unfolds: self.unfolds, ..Default::default() };
        self.registry
            .create_nested(&format!("struct {}", self.name), self.scope.as_deref(), &mut expansion)
            .ok_or_else(unresolved)
    }
}

impl PartialEq for StructRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.scope == other.scope
    }
}

impl Eq for StructRef {}

impl Hash for StructRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.scope.hash(state);
    }
}

impl fmt::Debug for StructRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructRef").field("name", &self.name).finish_non_exhaustive()
    }
}

/// State of one descriptor resolution.
#[derive(Debug, Default)]
struct Expansion {
    depth: usize,
    /// Structs being expanded, outermost first
    structs: Vec<String>,
    /// Back-references already followed to get here
    unfolds: usize,
}

#[derive(Debug, Clone, Default)]
struct UserTypes {
    structs: BTreeMap<String, StructDefinition>,
    enums: BTreeMap<String, EnumType>,
    contracts: BTreeSet<String>,
}

/// Resolves compiler type descriptors to [`SolType`]s.
///
/// Holds the user-defined types of one compilation. Built-in types are
/// recognized by a fixed list of matchers; the first matcher that accepts a
/// descriptor wins. Clones share the registered types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Arc<UserTypes>,
}

impl TypeRegistry {
    /// Creates a registry with only the built-in types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a struct.
    pub fn register_struct(&mut self, definition: StructDefinition) {
        Arc::make_mut(&mut self.types).structs.insert(definition.name.clone(), definition);
    }

    /// Registers an enum.
    pub fn register_enum(&mut self, ty: EnumType) {
        Arc::make_mut(&mut self.types).enums.insert(ty.name.clone(), ty);
    }

    /// Registers a contract, library or interface name.
    pub fn register_contract(&mut self, name: impl Into<String>) {
        Arc::make_mut(&mut self.types).contracts.insert(name.into());
    }

    /// Whether a contract of this name was registered.
    pub fn has_contract(&self, name: &str) -> bool {
        self.types.contracts.contains(name)
    }

    /// Resolves `descriptor` as seen from inside `contract`.
    ///
    /// Returns `None` for anything no matcher recognizes, such as function
    /// types or tuples. Callers skip such variables. A struct reached again
    /// from inside its own members becomes a [`SolType::StructRef`].
    pub fn create(&self, descriptor: &str, contract: Option<&str>) -> Option<SolType> {
        self.create_nested(descriptor, contract, &mut Expansion::default())
    }

    fn create_nested(
        &self,
        descriptor: &str,
        contract: Option<&str>,
        expansion: &mut Expansion,
    ) -> Option<SolType> {
        if expansion.depth > MAX_TYPE_DEPTH {
            debug!(descriptor, "type nesting too deep");
            return None;
        }
        let descriptor = normalize_descriptor(descriptor);
        expansion.depth += 1;
        let ty = MATCHERS
            .iter()
            .find_map(|matcher| matcher(self, &descriptor, contract, &mut *expansion));
        expansion.depth -= 1;
        ty
    }
}

/// Finds a user-defined type by exact name, then qualified by the current
/// contract, then by a unique `.Name` suffix.
fn lookup<'a, T>(
    map: &'a BTreeMap<String, T>,
    name: &str,
    contract: Option<&str>,
) -> Option<&'a T> {
    if let Some(found) = map.get(name) {
        return Some(found);
    }
    if let Some(found) = contract.and_then(|c| map.get(&format!("{c}.{name}"))) {
        return Some(found);
    }
    let suffix = format!(".{name}");
    let mut candidates = map.iter().filter(|(key, _)| key.ends_with(&suffix));
    match (candidates.next(), candidates.next()) {
        (Some((_, found)), None) => Some(found),
        _ => None,
    }
}

/// Strips data-location words from a descriptor.
///
/// `string memory[] memory` becomes `string[]`, `struct A.S storage ref`
/// becomes `struct A.S`.
pub fn normalize_descriptor(descriptor: &str) -> String {
    let mut out = String::with_capacity(descriptor.len());
    for token in descriptor.split_whitespace() {
        if LOCATION_WORDS.contains(&token) {
            continue;
        }
        let glued = LOCATION_WORDS.iter().find_map(|word| {
            token.strip_prefix(word).filter(|rest| rest.starts_with('[') || rest.starts_with(')'))
        });
        if let Some(rest) = glued {
            out.push_str(rest);
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

fn match_mapping(
    registry: &TypeRegistry,
    descriptor: &str,
    contract: Option<&str>,
    expansion: &mut Expansion,
) -> Option<SolType> {
    let inner = descriptor.strip_prefix("mapping(")?.strip_suffix(')')?;

    let mut nesting = 0usize;
    let bytes = inner.as_bytes();
    let arrow = (0..bytes.len()).find(|&i| {
        match bytes[i] {
            b'(' => nesting += 1,
            b')' => nesting = nesting.saturating_sub(1),
            _ => {}
        }
        nesting == 0 && bytes[i..].starts_with(b"=>")
    })?;

    let key = registry.create_nested(inner[..arrow].trim(), contract, expansion)?;
    let value = registry.create_nested(inner[arrow + 2..].trim(), contract, expansion)?;
    Some(SolType::Mapping(Box::new(key), Box::new(value)))
}

fn match_array(
    registry: &TypeRegistry,
    descriptor: &str,
    contract: Option<&str>,
    expansion: &mut Expansion,
) -> Option<SolType> {
    let body = descriptor.strip_suffix(']')?;
    let open = body.rfind('[')?;
    let element = registry.create_nested(&body[..open], contract, expansion)?;

    let size = body[open + 1..].trim();
    if size.is_empty() {
        Some(SolType::DynamicArray(Box::new(element)))
    } else {
        size.parse().ok().map(|len| SolType::StaticArray(Box::new(element), len))
    }
}

fn match_elementary(
    _: &TypeRegistry,
    descriptor: &str,
    _: Option<&str>,
    _: &mut Expansion,
) -> Option<SolType> {
    let ty = match descriptor {
        "bool" => SolType::Bool,
        "address" | "address payable" => SolType::Address,
        "string" => SolType::String,
        "bytes" => SolType::Bytes,
        "byte" => SolType::FixedBytes(1),
        "uint" => SolType::Uint(32),
        "int" => SolType::Int(32),
        _ => {
            if let Some(bits) = descriptor.strip_prefix("uint") {
                SolType::Uint(integer_width(bits)?)
            } else if let Some(bits) = descriptor.strip_prefix("int") {
                SolType::Int(integer_width(bits)?)
            } else if let Some(len) = descriptor.strip_prefix("bytes") {
                let len: usize = len.parse().ok()?;
                if !(1..=32).contains(&len) {
                    return None;
                }
                SolType::FixedBytes(len)
            } else {
                return None;
            }
        }
    };
    Some(ty)
}

/// Byte width of an `intN`/`uintN` suffix.
fn integer_width(bits: &str) -> Option<usize> {
    let bits: usize = bits.parse().ok()?;
    (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(bits / 8)
}

fn match_struct(
    registry: &TypeRegistry,
    descriptor: &str,
    contract: Option<&str>,
    expansion: &mut Expansion,
) -> Option<SolType> {
    let name = descriptor.strip_prefix("struct ")?;
    let definition = lookup(&registry.types.structs, name, contract)?;
    let scope = definition.scope.as_deref().or(contract);

    if expansion.structs.contains(&definition.name) {
        return Some(SolType::StructRef(StructRef {
            name: definition.name.clone(),
            scope: scope.map(str::to_string),
            unfolds: expansion.unfolds + 1,
            registry: registry.clone(),
        }));
    }

    expansion.structs.push(definition.name.clone());
    let fields = definition
        .members
        .iter()
        .filter_map(|(member, member_descriptor)| {
            let ty = registry.create_nested(member_descriptor, scope, &mut *expansion);
            if ty.is_none() {
                debug!(
                    name = %definition.name,
                    %member,
                    %member_descriptor,
                    "dropping unsupported struct member"
                );
            }
            ty.map(|ty| (member.clone(), ty))
        })
        .collect();
    expansion.structs.pop();

    Some(SolType::Struct(StructType { name: definition.name.clone(), fields }))
}

fn match_enum(
    registry: &TypeRegistry,
    descriptor: &str,
    contract: Option<&str>,
    _: &mut Expansion,
) -> Option<SolType> {
    let name = descriptor.strip_prefix("enum ")?;
    lookup(&registry.types.enums, name, contract).cloned().map(SolType::Enum)
}

fn match_contract(
    _: &TypeRegistry,
    descriptor: &str,
    _: Option<&str>,
    _: &mut Expansion,
) -> Option<SolType> {
    let name =
        descriptor.strip_prefix("contract ").or_else(|| descriptor.strip_prefix("library "))?;
    Some(SolType::Contract(name.to_string()))
}
