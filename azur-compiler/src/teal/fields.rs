// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Source member names mapped to TEAL field names.

use super::opcodes::StackType::{self, Bytes as B, Uint64 as U};

pub struct TxnField {
    pub member: &'static str,
    pub teal: &'static str,
    pub ty: StackType,
}

const fn f(member: &'static str, teal: &'static str, ty: StackType) -> TxnField {
    TxnField { member, teal, ty }
}

/// Scalar transaction fields readable with `txn`/`gtxn`.
pub const TXN_FIELDS: &[TxnField] = &[
    f("Fee", "Fee", U),
    f("FirstValid", "FirstValid", U),
    f("FirstValidTime", "FirstValidTime", U),
    f("LastValid", "LastValid", U),
    f("GroupIndex", "GroupIndex", U),
    f("TxID", "TxID", B),
    f("RekeyTo", "RekeyTo", B),
    f("Note", "Note", B),
    f("Lease", "Lease", B),
    f("Sender", "Sender", B),
    f("Receiver", "Receiver", B),
    f("Amount", "Amount", U),
    f("CloseRemainderTo", "CloseRemainderTo", B),
    f("VotePK", "VotePK", B),
    f("SelectionPK", "SelectionPK", B),
    f("VoteFirst", "VoteFirst", U),
    f("VoteLast", "VoteLast", U),
    f("VoteKeyDilution", "VoteKeyDilution", U),
    f("Nonparticipation", "Nonparticipation", U),
    f("ApplicationID", "ApplicationID", U),
    f("OnCompletion", "OnCompletion", U),
];

/// Array transaction fields read with `txna`/`txnas`.
pub struct TxnArray {
    pub member: &'static str,
    pub elem: &'static str,
    /// Field holding the element count.
    pub count: &'static str,
    pub ty: StackType,
}

pub const TXN_ARRAYS: &[TxnArray] = &[
    TxnArray {
        member: "Args",
        elem: "ApplicationArgs",
        count: "NumAppArgs",
        ty: B,
    },
    TxnArray {
        member: "Accounts",
        elem: "Accounts",
        count: "NumAccounts",
        ty: B,
    },
    TxnArray {
        member: "Assets",
        elem: "Assets",
        count: "NumAssets",
        ty: U,
    },
    TxnArray {
        member: "Applications",
        elem: "Applications",
        count: "NumApplications",
        ty: U,
    },
];

pub const GLOBAL_FIELDS: &[TxnField] = &[
    f("MinTxnFee", "MinTxnFee", U),
    f("MinBalance", "MinBalance", U),
    f("MaxTxnLife", "MaxTxnLife", U),
    f("ZeroAddress", "ZeroAddress", B),
    f("GroupSize", "GroupSize", U),
    f("LogicSigVersion", "LogicSigVersion", U),
    f("Round", "Round", U),
    f("LatestTimestamp", "LatestTimestamp", U),
    f("GroupID", "GroupID", B),
];

/// Members of `Global.CurrentApplication`.
pub const CURRENT_APPLICATION_FIELDS: &[TxnField] = &[
    f("Address", "CurrentApplicationAddress", B),
    f("Creator", "CreatorAddress", B),
];

/// `TypeEnum` value of each transaction subtype.
pub const TXN_TYPES: &[(&str, u64)] = &[
    ("PaymentTransaction", 1),
    ("ParticipationTransaction", 2),
    ("AssetConfigurationTransaction", 3),
    ("AssetTransferTransaction", 4),
    ("AssetFreezeTransaction", 5),
    ("ApplicationCallTransaction", 6),
];

pub fn txn_type_code(name: &str) -> Option<u64> {
    TXN_TYPES.iter().find(|(n, _)| *n == name).map(|(_, k)| *k)
}

pub fn lookup(table: &'static [TxnField], member: &str) -> Option<&'static TxnField> {
    table.iter().find(|f| f.member == member)
}

pub fn txn_array(member: &str) -> Option<&'static TxnArray> {
    TXN_ARRAYS.iter().find(|a| a.member == member)
}
