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

//! Shared fixture: a hand-written compilation of `Vault.sol` whose runtime
//! code is one `JUMPDEST` per source map entry, and a scripted execution of
//! `deposit(who, amount)` over it.

#![allow(dead_code)]

use std::collections::BTreeMap;

use alloy_primitives::{address, keccak256, Address, U256};
use sdb_common::{DebugCommand, PauseNotification};
use sdb_engine::{CompilerArtifacts, Debugger, DebuggerConfig, StepEvent, StorageProvider};
use serde_json::{json, Value};

pub const PATH: &str = "Vault.sol";

pub const SOURCE: &str = r#"pragma solidity ^0.4.24;

contract Vault {
    address owner;
    mapping(address => uint256) balances;

    modifier onlyOwner(uint8 level) {
        require(msg.sender == owner);
        _;
    }

    function deposit(address who, uint256 amount) public onlyOwner(1) {
        uint256 total;
        total = double(amount);
        balances[who] = total;
    }

    function double(uint256 x) internal returns (uint256 y) {
        y = x * 2;
    }
}
"#;

pub const VAULT: Address = address!("00000000000000000000000000000000000000aa");
pub const OWNER: Address = address!("00000000000000000000000000000000000000bb");
pub const WHO: Address = address!("00000000000000000000000000000000000000cc");
pub const AMOUNT: u64 = 21;

/// Slot of `balances`.
pub const BALANCES_SLOT: u64 = 1;

const JUMPDEST: &str = "5b";

/// `start:length` covering `from` up to and including the first `to` after it.
pub fn range(from: &str, to: &str) -> (usize, usize) {
    let start = SOURCE.find(from).unwrap();
    let end = start + SOURCE[start..].find(to).unwrap() + to.len();
    (start, end - start)
}

fn src(from: &str, to: &str) -> String {
    let (start, length) = range(from, to);
    format!("{start}:{length}:0")
}

fn node(name: &str, src: String, attributes: Value, children: Vec<Value>) -> Value {
    json!({ "name": name, "src": src, "attributes": attributes, "children": children })
}

fn var(name: &str, ty: &str, at: &str) -> Value {
    node(
        "VariableDeclaration",
        src(at, name),
        json!({ "name": name, "type": ty, "storageLocation": "default" }),
        vec![],
    )
}

pub fn ast() -> Value {
    let modifier = node(
        "ModifierDefinition",
        src("modifier onlyOwner", "_;\n    }"),
        json!({ "name": "onlyOwner", "visibility": "internal" }),
        vec![
            node(
                "ParameterList",
                src("(uint8 level)", ")"),
                json!({}),
                vec![var("level", "uint8", "uint8 level")],
            ),
            node("Block", src("{\n        require", "_;\n    }"), json!({}), vec![]),
        ],
    );

    let deposit = node(
        "FunctionDefinition",
        src("function deposit", "= total;\n    }"),
        json!({ "name": "deposit", "visibility": "public", "isConstructor": false }),
        vec![
            node(
                "ParameterList",
                src("(address who", "amount)"),
                json!({}),
                vec![
                    var("who", "address", "address who"),
                    var("amount", "uint256", "uint256 amount"),
                ],
            ),
            node(
                "ModifierInvocation",
                src("onlyOwner(1)", ")"),
                json!({}),
                vec![node(
                    "Identifier",
                    src("onlyOwner(1)", "onlyOwner"),
                    json!({ "value": "onlyOwner" }),
                    vec![],
                )],
            ),
            node(
                "Block",
                src("{\n        uint256 total", "= total;\n    }"),
                json!({}),
                vec![node(
                    "VariableDeclarationStatement",
                    src("uint256 total;", ";"),
                    json!({}),
                    vec![var("total", "uint256", "uint256 total;")],
                )],
            ),
        ],
    );

    let double = node(
        "FunctionDefinition",
        src("function double", "x * 2;\n    }"),
        json!({ "name": "double", "visibility": "internal", "isConstructor": false }),
        vec![
            node(
                "ParameterList",
                src("(uint256 x)", ")"),
                json!({}),
                vec![var("x", "uint256", "uint256 x")],
            ),
            node(
                "ParameterList",
                src("(uint256 y)", ")"),
                json!({}),
                vec![var("y", "uint256", "uint256 y")],
            ),
            node("Block", src("{\n        y = x", "x * 2;\n    }"), json!({}), vec![]),
        ],
    );

    let mut vault = node(
        "ContractDefinition",
        src("contract Vault", "x * 2;\n    }\n}"),
        json!({ "name": "Vault", "contractKind": "contract", "linearizedBaseContracts": [1] }),
        vec![
            var("owner", "address", "address owner"),
            var("balances", "mapping(address => uint256)", "mapping(address"),
            modifier,
            deposit,
            double,
        ],
    );

    vault["id"] = json!(1);

    node("SourceUnit", format!("0:{}:0", SOURCE.len()), json!({}), vec![vault])
}

/// Source map entry per runtime instruction: covered text and jump type.
fn runtime_entries() -> Vec<Option<(&'static str, &'static str, char)>> {
    vec![
        // 0: dispatcher
        Some(("contract Vault", "x * 2;\n    }\n}", '-')),
        // 1: entry of deposit
        Some(("function deposit", "= total;\n    }", '-')),
        // 2: modifier invocation
        Some(("onlyOwner(1)", ")", '-')),
        // 3, 4: inlined modifier body
        Some(("require(msg.sender", ";", '-')),
        Some(("_;", ";", '-')),
        // 5, 6: total = double(amount), calling into double
        Some(("total = double", ";", '-')),
        Some(("double(amount)", ")", 'i')),
        // 7, 8, 9: double, returning
        Some(("function double", "x * 2;\n    }", '-')),
        Some(("y = x * 2", ";", '-')),
        Some(("function double", "x * 2;\n    }", 'o')),
        // 10, 11: back in deposit, returning
        Some(("balances[who] = total", ";", '-')),
        Some(("function deposit", "= total;\n    }", 'o')),
        // 12: generated
        None,
    ]
}

pub fn runtime_source_map() -> String {
    runtime_entries()
        .into_iter()
        .map(|entry| match entry {
            Some((from, to, jump)) => {
                let (start, length) = range(from, to);
                format!("{start}:{length}:0:{jump}")
            }
            None => "-1:-1:-1:-".to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

pub fn runtime_code() -> Vec<u8> {
    vec![0x5b; runtime_entries().len()]
}

pub fn combined_json() -> String {
    let runtime = JUMPDEST.repeat(runtime_entries().len());
    json!({
        "contracts": {
            "Vault.sol:Vault": {
                "bin": "6080604052",
                "bin-runtime": runtime,
                "srcmap": format!("{};;", src("contract Vault", "x * 2;\n    }\n}")),
                "srcmap-runtime": runtime_source_map(),
            }
        },
        "sourceList": [PATH],
        "sources": { PATH: { "AST": ast() } },
        "version": "0.4.24+commit.e67f0147"
    })
    .to_string()
}

pub fn artifacts() -> CompilerArtifacts {
    let sources = BTreeMap::from([(PATH.to_string(), SOURCE.to_string())]);
    CompilerArtifacts::from_combined_json_with_sources(&combined_json(), &sources).unwrap()
}

/// A debugger with `Vault` deployed at [`VAULT`].
pub fn debugger() -> Debugger {
    let mut debugger = Debugger::new(DebuggerConfig::default());
    let unit = debugger.load_artifacts(&artifacts()).unwrap();
    debugger.link(VAULT, unit, "Vault").unwrap();
    debugger
}

/// Preimage of the storage slot of `balances[key]`.
pub fn balance_preimage(key: Address) -> Vec<u8> {
    let mut data = key.into_word().to_vec();
    data.extend_from_slice(&U256::from(BALANCES_SLOT).to_be_bytes::<32>());
    data
}

/// Storage slot of `balances[key]`.
pub fn balance_slot(key: Address) -> U256 {
    U256::from_be_bytes(keccak256(balance_preimage(key)).0)
}

fn word(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

/// `(pc, stack)` for each instruction of `deposit(WHO, AMOUNT)`.
pub fn deposit_steps() -> Vec<(usize, Vec<U256>)> {
    let selector = U256::from(0xb6b55f25u64);
    let ret = U256::from(0x40);
    let (who, amount, level) = (word(WHO), U256::from(AMOUNT), U256::from(1));
    let call_return = U256::from(10);
    let doubled = amount * U256::from(2);
    let zero = U256::ZERO;

    let entry = vec![selector, ret, who, amount];
    let mut with_total = entry.clone();
    with_total.push(zero);
    let mut in_modifier = with_total.clone();
    in_modifier.push(level);
    let mut calling = in_modifier.clone();
    calling.extend([call_return, amount]);
    let mut in_double = calling.clone();
    in_double.push(zero);
    let mut returning = calling.clone();
    returning.push(doubled);
    let after = vec![selector, ret, who, amount, doubled, level];

    vec![
        (0, vec![selector]),
        (1, entry),
        (2, with_total),
        (3, in_modifier.clone()),
        (4, in_modifier.clone()),
        (5, in_modifier),
        (6, calling),
        (7, in_double.clone()),
        (8, in_double),
        (9, returning),
        (10, after.clone()),
        (11, after),
        (12, vec![selector]),
    ]
}

/// Feeds one transaction of `deposit(WHO, AMOUNT)` to `debugger`. On each
/// pause the next of `commands` is applied, [`DebugCommand::Resume`] once
/// they run out.
pub fn run(
    debugger: &mut Debugger,
    storage: &dyn StorageProvider,
    commands: &[DebugCommand],
) -> Vec<PauseNotification> {
    let mut pauses = Vec::new();
    let mut commands = commands.iter().copied();
    for (pc, stack) in deposit_steps() {
        let event = StepEvent {
            pc,
            opcode: 0x5b,
            depth: 0,
            address: VAULT,
            creation: false,
            stack: &stack,
            memory: &[],
            calldata: &[],
        };
        if let Some(notification) = debugger.on_step(&event, storage) {
            pauses.push(notification);
            debugger.apply(commands.next().unwrap_or(DebugCommand::Resume));
        }
    }
    pauses
}

/// Lines of each pause.
pub fn lines(pauses: &[PauseNotification]) -> Vec<usize> {
    pauses.iter().map(|p| p.breakpoint.line).collect()
}

/// Variables of a call snapshot as `name -> value`.
pub fn vars(pause: &PauseNotification, call: usize) -> BTreeMap<String, Value> {
    pause.call_stack[call].vars.iter().map(|v| (v.name.clone(), v.value.clone())).collect()
}

/// Storage variables of a call snapshot as `name -> value`.
pub fn storage(pause: &PauseNotification, call: usize) -> BTreeMap<String, Value> {
    pause.call_stack[call].storage.iter().map(|v| (v.name.clone(), v.value.clone())).collect()
}
