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

use std::collections::HashMap;

use alloy_primitives::U256;
use tracing::{debug, trace, warn};

use super::{
    Contract, ContractId, ContractKind, Method, MethodId, MethodKind, ModifierInvocation,
    SymbolError, SymbolTable, Variable, VariableKind, Visibility,
};
use crate::{
    AstNode, DataLocation, EnumType, SourceExtent, SourceFiles, StorageCursor, StructDefinition,
    TypeRegistry,
};

impl SymbolTable {
    /// Builds the table from the legacy AST of every source unit.
    ///
    /// Fails if a definition points into a source file that is not in
    /// `sources`. Variables of unsupported types are kept for stack
    /// accounting but carry no type.
    pub fn build(asts: &[(usize, AstNode)], sources: &SourceFiles) -> Result<Self, SymbolError> {
        let mut types = TypeRegistry::new();
        for (_, ast) in asts {
            register_types(ast, None, &mut types);
        }

        let mut builder =
            Builder { sources, table: Self { types, ..Default::default() } };
        for (file, ast) in asts {
            trace!(file, "collecting contracts");
            for node in ast.children_named("ContractDefinition") {
                builder.contract(node)?;
            }
        }

        builder.link_parents();
        builder.linearize();
        builder.layout_storage();
        builder.resolve_modifiers();
        builder.collect_library_internals();

        debug!(
            contracts = builder.table.contracts.len(),
            library_internals = builder.table.library_internals.len(),
            "symbol table built"
        );
        Ok(builder.table)
    }
}

/// Registers contracts, structs and enums so that later type descriptors
/// can refer to them regardless of declaration order.
fn register_types(node: &AstNode, contract: Option<&str>, types: &mut TypeRegistry) {
    match node.name.as_str() {
        "ContractDefinition" => {
            if let Some(name) = node.declared_name() {
                types.register_contract(name);
                for child in &node.children {
                    register_types(child, Some(name), types);
                }
            }
            return;
        }
        "StructDefinition" => {
            if let Some(name) = canonical_name(node, contract) {
                let members = node
                    .children_named("VariableDeclaration")
                    .filter_map(|m| {
                        Some((m.declared_name()?.to_string(), m.attr_str("type")?.to_string()))
                    })
                    .collect();
                types.register_struct(StructDefinition {
                    name,
                    scope: contract.map(str::to_string),
                    members,
                });
            }
        }
        "EnumDefinition" => {
            if let Some(name) = canonical_name(node, contract) {
                let members = node
                    .children_named("EnumValue")
                    .filter_map(|v| v.declared_name().map(str::to_string))
                    .collect();
                types.register_enum(EnumType { name, members });
            }
        }
        _ => {}
    }
    for child in &node.children {
        register_types(child, contract, types);
    }
}

fn canonical_name(node: &AstNode, contract: Option<&str>) -> Option<String> {
    if let Some(name) = node.attr_str("canonicalName") {
        return Some(name.to_string());
    }
    let name = node.declared_name()?;
    Some(match contract {
        Some(contract) => format!("{contract}.{name}"),
        None => name.to_string(),
    })
}

struct Builder<'a> {
    sources: &'a SourceFiles,
    table: SymbolTable,
}

impl Builder<'_> {
    fn optional_extent(&self, node: &AstNode) -> Result<Option<SourceExtent>, SymbolError> {
        match node.range()? {
            Some(range) => {
                self.sources.extent(range).map(Some).ok_or(SymbolError::MissingSource(range.file))
            }
            None => Ok(None),
        }
    }

    fn extent(&self, node: &AstNode) -> Result<SourceExtent, SymbolError> {
        self.optional_extent(node)?.ok_or_else(|| SymbolError::MissingLocation {
            node: node.name.clone(),
            name: node.declared_name().unwrap_or_default().to_string(),
        })
    }

    fn contract(&mut self, node: &AstNode) -> Result<(), SymbolError> {
        let name = node.require_name()?.to_string();
        let extent = self.extent(node)?;
        let id = ContractId(self.table.contracts.len());

        let mut contract = Contract {
            name,
            file: extent.file,
            kind: ContractKind::from_attributes(
                node.attr_str("contractKind"),
                node.attr_bool("isLibrary"),
            ),
            ast_id: node.id,
            linearized_ids: node.attr_ids("linearizedBaseContracts"),
            state_variables: Vec::new(),
            storage_layout: Vec::new(),
            methods: Vec::new(),
            parent_names: Vec::new(),
            parents: Vec::new(),
            linearized: Vec::new(),
        };

        for child in &node.children {
            match child.name.as_str() {
                "InheritanceSpecifier" => {
                    if let Some(base) = child.children.first().and_then(AstNode::declared_name) {
                        contract.parent_names.push(base.to_string());
                    }
                }
                "VariableDeclaration" => {
                    if child.attr_bool("constant")
                        || matches!(child.attr_str("mutability"), Some("constant" | "immutable"))
                    {
                        trace!(
                            contract = %contract.name,
                            name = ?child.declared_name(),
                            "skipping non-storage state variable"
                        );
                        continue;
                    }
                    let var = self.variable(
                        child,
                        &contract.name,
                        DataLocation::Storage,
                        VariableKind::State,
                    );
                    contract.state_variables.push(var);
                }
                "FunctionDefinition" => {
                    let method = self.method(child, id, &contract.name, false)?;
                    contract.methods.push(method);
                }
                "ModifierDefinition" => {
                    let method = self.method(child, id, &contract.name, true)?;
                    contract.methods.push(method);
                }
                _ => {}
            }
        }

        debug!(
            contract = %contract.name,
            kind = ?contract.kind,
            state_variables = contract.state_variables.len(),
            methods = contract.methods.len(),
            "collected contract"
        );
        self.table.contracts.push(contract);
        Ok(())
    }

    fn variable(
        &self,
        node: &AstNode,
        contract: &str,
        location: DataLocation,
        kind: VariableKind,
    ) -> Variable {
        let name = node.declared_name().unwrap_or_default();
        let descriptor = node.attr_str("type").unwrap_or_default();
        let ty = self.table.types.create(descriptor, Some(contract));
        if ty.is_none() {
            debug!(
                contract,
                name,
                descriptor,
                "unsupported variable type, value will not be shown"
            );
        }
        Variable::new(name, descriptor, ty, location, kind)
    }

    fn parameters(&self, list: &AstNode, contract: &str, kind: VariableKind) -> Vec<Variable> {
        list.children_named("VariableDeclaration")
            .map(|p| {
                let location = DataLocation::from_attribute(p.attr_str("storageLocation"));
                self.variable(p, contract, location, kind)
            })
            .collect()
    }

    fn method(
        &self,
        node: &AstNode,
        contract: ContractId,
        contract_name: &str,
        is_modifier: bool,
    ) -> Result<Method, SymbolError> {
        let extent = self.extent(node)?;
        let declared = node.declared_name().unwrap_or_default();
        let is_constructor = !is_modifier
            && (node.attr_bool("isConstructor")
                || node.attr_str("kind") == Some("constructor")
                || declared == contract_name);
        let name = if is_constructor {
            "constructor"
        } else if declared.is_empty() {
            node.attr_str("kind").unwrap_or("fallback")
        } else {
            declared
        };

        let mut lists = node.children_named("ParameterList");
        let arguments = lists
            .next()
            .map(|list| self.parameters(list, contract_name, VariableKind::Argument))
            .unwrap_or_default();
        let returns = match lists.next() {
            Some(list) if !is_modifier => {
                self.parameters(list, contract_name, VariableKind::Return)
            }
            _ => Vec::new(),
        };

        let block = node.child_named("Block");
        let body = match block {
            Some(block) => self.optional_extent(block)?,
            None => None,
        };
        let mut locals = Vec::new();
        let mut declaration_spans = Vec::new();
        if let Some(block) = block {
            self.collect_locals(block, body, contract_name, &mut locals, &mut declaration_spans)?;
        }

        let modifiers = node
            .children_named("ModifierInvocation")
            .map(|invocation| {
                let name = invocation
                    .children
                    .first()
                    .and_then(|target| target.attr_str("value").or_else(|| target.declared_name()))
                    .unwrap_or_default()
                    .to_string();
                Ok(ModifierInvocation {
                    name,
                    site: self.optional_extent(invocation)?,
                    method: None,
                    stack_offset: 0,
                })
            })
            .collect::<Result<Vec<_>, SymbolError>>()?;

        let kind = if is_modifier {
            MethodKind::Modifier
        } else {
            MethodKind::Function {
                is_constructor,
                visibility: Visibility::from_attribute(node.attr_str("visibility")),
            }
        };

        let mut method = Method {
            name: name.to_string(),
            contract,
            file: extent.file,
            kind,
            extent,
            body,
            arguments,
            returns,
            locals,
            modifiers,
            declaration_spans,
            own_slots: 0,
            total_slots: 0,
        };
        method.assign_stack_offsets();
        trace!(
            contract = contract_name,
            method = %method.name,
            slots = method.own_slots,
            "collected method"
        );
        Ok(method)
    }

    /// Collects block-scoped locals in declaration order, tagging each with
    /// its declaring statement and the innermost enclosing scope.
    fn collect_locals(
        &self,
        node: &AstNode,
        scope: Option<SourceExtent>,
        contract: &str,
        locals: &mut Vec<Variable>,
        declaration_spans: &mut Vec<SourceExtent>,
    ) -> Result<(), SymbolError> {
        let scope = match node.name.as_str() {
            "Block" | "ForStatement" | "UncheckedBlock" => self.optional_extent(node)?.or(scope),
            _ => scope,
        };

        if node.name == "VariableDeclarationStatement" {
            let declaration = self.optional_extent(node)?;
            declaration_spans.extend(declaration);
            for decl in node.children_named("VariableDeclaration") {
                let location = DataLocation::from_attribute(decl.attr_str("storageLocation"));
                let mut var = self.variable(decl, contract, location, VariableKind::Local);
                var.declaration = declaration;
                var.scope = scope;
                locals.push(var);
            }
        }

        for child in &node.children {
            self.collect_locals(child, scope, contract, locals, declaration_spans)?;
        }
        Ok(())
    }

    fn link_parents(&mut self) {
        let mut by_name = HashMap::new();
        for (index, contract) in self.table.contracts.iter().enumerate() {
            by_name.entry(contract.name.clone()).or_insert(ContractId(index));
        }

        for contract in &mut self.table.contracts {
            contract.parents = contract
                .parent_names
                .iter()
                .filter_map(|parent| {
                    let id = by_name.get(parent).copied();
                    if id.is_none() {
                        warn!(contract = %contract.name, %parent, "base contract not found");
                    }
                    id
                })
                .collect();
        }
    }

    fn linearize(&mut self) {
        let by_ast: HashMap<u64, ContractId> = self
            .table
            .contracts
            .iter()
            .enumerate()
            .filter_map(|(index, c)| c.ast_id.map(|ast_id| (ast_id, ContractId(index))))
            .collect();

        for index in 0..self.table.contracts.len() {
            let id = ContractId(index);
            let mut linearized: Vec<_> = self.table.contracts[index]
                .linearized_ids
                .iter()
                .filter_map(|ast_id| by_ast.get(ast_id).copied())
                .collect();
            if linearized.first() != Some(&id) {
                linearized = self.fallback_linearization(id, &mut Vec::new());
            }
            self.table.contracts[index].linearized = linearized;
        }
    }

    /// Depth-first order over the declared bases, used when the AST carries
    /// no linearization.
    fn fallback_linearization(
        &self,
        id: ContractId,
        visiting: &mut Vec<ContractId>,
    ) -> Vec<ContractId> {
        if visiting.contains(&id) {
            return Vec::new();
        }
        visiting.push(id);
        let mut order = vec![id];
        if let Some(contract) = self.table.contract(id) {
            for parent in contract.parents.iter().rev() {
                for base in self.fallback_linearization(*parent, visiting) {
                    if !order.contains(&base) {
                        order.push(base);
                    }
                }
            }
        }
        visiting.pop();
        order
    }

    /// Assigns slots to state variables, most basic contract first.
    fn layout_storage(&mut self) {
        for index in 0..self.table.contracts.len() {
            let mut cursor = StorageCursor::new(U256::ZERO);
            let mut layout = Vec::new();
            for base in self.table.contracts[index].linearized.iter().rev() {
                let Some(base) = self.table.contract(*base) else { continue };
                for var in &base.state_variables {
                    let position = match &var.ty {
                        Some(ty) => cursor.reserve(ty),
                        None => {
                            cursor.align();
                            let position = (cursor.slot, 0);
                            cursor.advance_slots(1);
                            position
                        }
                    };
                    let mut var = var.clone();
                    var.storage = Some(position);
                    layout.push(var);
                }
            }
            self.table.contracts[index].storage_layout = layout;
        }
    }

    /// Binds modifier invocations to definitions, looking through the
    /// linearized bases most derived first, and stacks the modifiers'
    /// variables after the function's own.
    fn resolve_modifiers(&mut self) {
        for index in 0..self.table.contracts.len() {
            let linearized = self.table.contracts[index].linearized.clone();
            for position in 0..self.table.contracts[index].methods.len() {
                let method = &self.table.contracts[index].methods[position];
                let mut offset = method.own_slots;
                let mut invocations = method.modifiers.clone();

                for invocation in &mut invocations {
                    invocation.method = linearized.iter().find_map(|base| {
                        let index = self.table.contract(*base)?.modifier_index(&invocation.name)?;
                        Some(MethodId { contract: *base, index })
                    });
                    invocation.stack_offset = offset;
                    match invocation.method.and_then(|id| self.table.method(id)) {
                        Some(modifier) => offset += modifier.own_slots,
                        None if self.table.types.has_contract(&invocation.name) => {
                            trace!(base = %invocation.name, "base constructor invocation");
                        }
                        None => warn!(modifier = %invocation.name, "modifier definition not found"),
                    }
                }

                let method = &mut self.table.contracts[index].methods[position];
                method.modifiers = invocations;
                method.total_slots = offset;
            }
        }
    }

    fn collect_library_internals(&mut self) {
        self.table.library_internals = self
            .table
            .contracts
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_library())
            .flat_map(|(contract, c)| {
                c.methods
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.is_function() && m.visibility().is_internal())
                    .map(move |(index, _)| MethodId { contract: ContractId(contract), index })
            })
            .collect();
    }
}
