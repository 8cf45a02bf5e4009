// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Built-in types, constants and functions of the
//! ledger environment.

use super::scope::ScopeStack;
use super::types::{Field, TypeId, TypeTable};
use crate::Mode;

pub const ON_COMPLETE_VALUES: &[&str] = &[
    "NoOp",
    "OptIn",
    "CloseOut",
    "ClearState",
    "UpdateApplication",
    "DeleteApplication",
];

pub const HASH_VALUES: &[&str] = &["SHA256", "Keccak256", "SHA512_256"];

/// Built-in functions and their arity.
pub const FUNCTIONS: &[(&str, usize)] = &[("Hash", 2)];

/// Ids of the built-in types the analyzer
/// refers to directly.
#[derive(Clone, Copy, Debug)]
pub struct Builtins {
    pub hash: TypeId,
    pub on_complete: TypeId,
    pub transaction: TypeId,
    pub app_call: TypeId,
    pub global: TypeId,
    pub bytes_array: TypeId,
}

fn uint() -> Field {
    Field::var(TypeTable::UINT64)
}

fn bytes() -> Field {
    Field::var(TypeTable::BYTES)
}

pub fn install_types(t: &mut TypeTable) -> Builtins {
    let bytes_array = t.array_of(TypeTable::BYTES, TypeTable::UINT64);
    t.array_of(TypeTable::UINT64, TypeTable::UINT64);

    let hash = t.add_enum("Hash", HASH_VALUES);
    let on_complete = t.add_enum("OnComplete", ON_COMPLETE_VALUES);

    let state_schema = t.add_struct(
        "StateSchema",
        None,
        &[("NumUint", uint()), ("NumByteSlice", uint())],
    );

    let state = t.add_struct("State", None, &[("OptedIn", uint())]);
    t.set_accessor(state, TypeTable::BYTES, Field::var(TypeTable::ANY));

    let asset_param = t.add_struct(
        "AssetParam",
        None,
        &[
            ("Total", uint()),
            ("Decimals", uint()),
            ("DefaultFrozen", uint()),
            ("UnitName", bytes()),
            ("Name", bytes()),
            ("URL", bytes()),
            ("MetadataHash", bytes()),
            ("ManagerAddr", bytes()),
            ("ReserveAddr", bytes()),
            ("FreezeAddr", bytes()),
            ("ClawbackAddr", bytes()),
            ("Creator", bytes()),
        ],
    );

    let application_param = t.add_struct(
        "ApplicationParam",
        None,
        &[
            ("ApprovalProgram", bytes()),
            ("ClearStateProgram", bytes()),
            ("GlobalStateSchema", Field::var(state_schema)),
            ("LocalStateSchema", Field::var(state_schema)),
            ("ExtraProgramPages", uint()),
        ],
    );

    let asset_holding = t.add_struct(
        "AssetHolding",
        None,
        &[("AssetBalance", uint()), ("AssetFrozen", uint())],
    );

    let asset = t.add_struct(
        "Asset",
        None,
        &[
            ("AssetHolding", Field::var(asset_holding)),
            ("AssetParam", Field::var(asset_param)),
        ],
    );

    let application = t.add_struct(
        "Application",
        None,
        &[
            ("Params", Field::var(application_param)),
            ("Creator", bytes()),
            ("Address", bytes()),
            ("State", Field::var(state)),
        ],
    );

    let app_states = t.array_of(state, application);
    let holdings = t.array_of(asset_holding, asset);
    let account = t.add_struct(
        "Account",
        None,
        &[
            ("Balance", uint()),
            ("MinBalance", uint()),
            ("State", Field::var(app_states)),
            ("Assets", Field::var(holdings)),
        ],
    );

    let global = t.add_struct(
        "Global",
        None,
        &[
            ("MinTxnFee", uint()),
            ("MinBalance", uint()),
            ("MaxTxnLife", uint()),
            ("ZeroAddress", bytes()),
            ("GroupSize", uint()),
            ("LogicSigVersion", uint()),
            ("Round", uint()),
            ("LatestTimestamp", uint()),
            ("CurrentApplication", Field::var(application)),
            ("GroupID", bytes()),
        ],
    );

    let transaction = t.add_struct(
        "Transaction",
        None,
        &[
            ("Fee", uint()),
            ("FirstValid", uint()),
            ("FirstValidTime", uint()),
            ("LastValid", uint()),
            ("GroupIndex", uint()),
            ("TxID", bytes()),
            ("RekeyTo", bytes()),
            ("Note", bytes()),
            ("Lease", bytes()),
            ("Sender", bytes()),
        ],
    );

    t.add_struct(
        "PaymentTransaction",
        Some(transaction),
        &[
            ("Receiver", bytes()),
            ("Amount", uint()),
            ("CloseRemainderTo", bytes()),
        ],
    );

    t.add_struct(
        "ParticipationTransaction",
        Some(transaction),
        &[
            ("VotePK", bytes()),
            ("SelectionPK", bytes()),
            ("VoteFirst", uint()),
            ("VoteLast", uint()),
            ("VoteKeyDilution", uint()),
            ("Nonparticipation", uint()),
        ],
    );

    t.add_struct(
        "AssetTransferTransaction",
        Some(transaction),
        &[
            ("AssetID", uint()),
            ("Amount", uint()),
            ("Receiver", bytes()),
            ("CloseTo", bytes()),
        ],
    );

    let accounts = t.array_of(account, TypeTable::UINT64);
    let assets = t.array_of(asset, TypeTable::UINT64);
    let applications = t.array_of(application, TypeTable::UINT64);
    let scratch = t.array_of(TypeTable::ANY, TypeTable::UINT64);

    let app_call = t.add_struct(
        "ApplicationCallTransaction",
        Some(transaction),
        &[
            ("ApplicationID", uint()),
            ("OnCompletion", Field::var(on_complete)),
            ("Args", Field::var(bytes_array)),
            ("Accounts", Field::var(accounts)),
            ("Assets", Field::var(assets)),
            ("Applications", Field::var(applications)),
            ("Scratch", Field::var(scratch)),
            ("Params", Field::var(application_param)),
        ],
    );

    t.add_struct(
        "AssetConfigurationTransaction",
        Some(transaction),
        &[("AssetID", uint()), ("Params", Field::var(asset_param))],
    );

    t.add_struct(
        "AssetFreezeTransaction",
        Some(transaction),
        &[
            ("AssetID", uint()),
            ("Account", bytes()),
            ("Frozen", uint()),
        ],
    );

    t.add_struct(
        "InnerTransactionResult",
        None,
        &[("Logs", Field::var(bytes_array))],
    );

    Builtins {
        hash,
        on_complete,
        transaction,
        app_call,
        global,
        bytes_array,
    }
}

/// Registers the global constants visible to every
/// function into the root frame.
pub fn install_constants(t: &mut TypeTable, b: &Builtins, scopes: &mut ScopeStack, mode: Mode) {
    let group = t.array_of(b.transaction, TypeTable::UINT64);

    scopes.declare("Txn", Field::constant(b.app_call));
    scopes.declare("TxnGroup", Field::constant(group));
    scopes.declare("Global", Field::constant(b.global));

    scopes.declare("true", Field::constant(TypeTable::UINT64));
    scopes.declare("false", Field::constant(TypeTable::UINT64));

    let names: Vec<String> = t.source_names().map(str::to_string).collect();
    for name in names {
        scopes.declare(&name, Field::constant(TypeTable::TYPE));
    }

    for v in HASH_VALUES {
        scopes.declare(v, Field::constant(b.hash));
    }

    if mode.is_application() {
        for v in ON_COMPLETE_VALUES {
            scopes.declare(v, Field::constant(b.on_complete));
        }
    }

    // application args or logic signature args
    scopes.declare("args", Field::constant(b.bytes_array));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txn_sees_base_transaction_fields() {
        let mut t = TypeTable::new();
        let b = install_types(&mut t);

        let fee = t.member(b.app_call, "Fee").unwrap();
        assert_eq!(fee.ty, TypeTable::UINT64);

        let args = t.member(b.app_call, "Args").unwrap();
        assert_eq!(args.ty, b.bytes_array);
        assert_eq!(t.accessor(args.ty).map(|a| a.index), Some(TypeTable::UINT64));
    }

    #[test]
    fn on_complete_values_only_in_application_mode() {
        let mut t = TypeTable::new();
        let b = install_types(&mut t);

        let mut sig = ScopeStack::new();
        install_constants(&mut t, &b, &mut sig, Mode::SIGNATURE);
        assert!(sig.lookup("OptIn").is_none());
        assert!(sig.lookup("SHA256").is_some());

        let mut app = ScopeStack::new();
        install_constants(&mut t, &b, &mut app, Mode::APPROVAL);
        assert_eq!(app.lookup("OptIn").map(|f| f.ty), Some(b.on_complete));
        assert_eq!(app.lookup("Uint64").map(|f| f.ty), Some(TypeTable::TYPE));
    }
}
