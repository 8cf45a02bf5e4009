// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

use azur_compiler::{Error, Mode, check_str};

fn reject(src: &str, mode: Mode) -> String {
    match check_str(src, mode) {
        Err(e @ Error::Semantic { .. }) => e.to_string(),
        other => panic!("expected a semantic error, got {other:?}"),
    }
}

fn reject_approval(body: &str) -> String {
    reject(&format!("def ApprovalProgram() {{ {body} }}"), Mode::APPROVAL)
}

#[test]
fn analysis_counts_functions_and_locals() {
    let src = "
        def twice(a) { b = a * 2; return b; }
        def ApprovalProgram() {
            x = twice(2);
            if (x > 3) { y = x; x = y + 1; }
            return x;
        }
        def ClearStateProgram() { return 1; }
    ";

    let a = check_str(src, Mode::APPROVAL | Mode::CLEAR_STATE).unwrap();
    assert_eq!(a.entry_points, ["ApprovalProgram", "ClearStateProgram"]);
    assert_eq!(a.functions, 3);
    assert_eq!(a.variables, 3);
}

#[test]
fn block_locals_end_with_their_block() {
    let msg = reject_approval("if (1) { y = 1; } return y;");
    assert!(msg.contains("`y` is not declared before first use"), "{msg}");

    // a do-while body is closed before its condition
    let msg = reject_approval("do { z = 1; } while (z < 2); return 1;");
    assert!(msg.contains("`z` is not declared"), "{msg}");
}

#[test]
fn functions_do_not_see_each_other_locals() {
    let msg = reject(
        "def g() { return a; }
        def ApprovalProgram() { a = 1; return g(); }",
        Mode::APPROVAL,
    );
    assert!(msg.contains("`a` is not declared before first use in `a` at 1:18"), "{msg}");
}

#[test]
fn parameters_shadow_nothing_and_may_be_reassigned() {
    check_str(
        "def inc(a) { a = a + 1; return a; }
        def ApprovalProgram() { a = 5; return inc(a); }",
        Mode::APPROVAL,
    )
    .unwrap();

    let msg = reject(
        "def f(a, a) { return a; } def ApprovalProgram() { return f(1, 2); }",
        Mode::APPROVAL,
    );
    assert!(msg.contains("duplicate parameter `a`"), "{msg}");
}

#[test]
fn entry_functions() {
    let msg = reject("def f() { return 1; }", Mode::APPROVAL);
    assert!(msg.contains("missing entry function `ApprovalProgram`"), "{msg}");

    let msg = reject("def Signature(a) { return 1; }", Mode::SIGNATURE);
    assert!(msg.contains("cannot take parameters"), "{msg}");

    let msg = reject(
        "def f() { return ApprovalProgram(); } def ApprovalProgram() { return 1; }",
        Mode::APPROVAL,
    );
    assert!(msg.contains("entry function `ApprovalProgram` cannot be called"), "{msg}");

    let msg = reject_approval("return \"yes\";");
    assert!(msg.contains("entry function must return Uint64"), "{msg}");

    let msg = reject(
        "def f() { return 1; } def f() { return 2; } def ApprovalProgram() { return f(); }",
        Mode::APPROVAL,
    );
    assert!(msg.contains("function `f` is already defined"), "{msg}");
}

#[test]
fn calls() {
    let msg = reject(
        "def g(a) { return a; } def ApprovalProgram() { return g(1, 2); }",
        Mode::APPROVAL,
    );
    assert!(msg.contains("`g` takes 1, got 2"), "{msg}");

    let msg = reject_approval("return nope(1);");
    assert!(msg.contains("unknown function `nope`"), "{msg}");

    let msg = reject(
        "def g() { x = 1; } def ApprovalProgram() { y = g(); return 1; }",
        Mode::APPROVAL,
    );
    assert!(msg.contains("function does not return a value"), "{msg}");

    let msg = reject(
        "def g(a) { if (a) { return 1; } return; } def ApprovalProgram() { return g(1); }",
        Mode::APPROVAL,
    );
    assert!(msg.contains("missing return value"), "{msg}");
}

#[test]
fn hash_needs_a_known_algorithm() {
    check_str(
        "def ApprovalProgram() { return Hash(Txn.Note, SHA256) == Hash(1, Keccak256); }",
        Mode::APPROVAL,
    )
    .unwrap();

    let msg = reject_approval("return Hash(Txn.Note, NoOp) == Txn.Note;");
    assert!(msg.contains("must be one of SHA256, Keccak256, SHA512_256"), "{msg}");
}

#[test]
fn throw_needs_a_literal() {
    check_str("def ApprovalProgram() { throw [0x6e, 0x6f]; }", Mode::APPROVAL).unwrap();

    let msg = reject_approval("x = \"no\"; throw x;");
    assert!(msg.contains("`throw` needs a string or byte list literal"), "{msg}");
}

#[test]
fn only_plain_variables_are_assignable() {
    let msg = reject_approval("Txn.Fee = 1; return 1;");
    assert!(msg.contains("through member or array access"), "{msg}");

    let msg = reject_approval("args[0] = \"a\"; return 1;");
    assert!(msg.contains("through member or array access"), "{msg}");

    let msg = reject_approval("Global = 1; return 1;");
    assert!(msg.contains("`Global` is not assignable"), "{msg}");

    let msg = reject_approval("1 = 2; return 1;");
    assert!(msg.contains("left part is not assignable"), "{msg}");
}

#[test]
fn operand_types() {
    let msg = reject_approval("x = 1; x = \"a\"; return x;");
    assert!(msg.contains("can't assign `Bytes` to `x` of type `Uint64`"), "{msg}");

    let msg = reject_approval("return 1 + \"a\" == 1;");
    assert!(msg.contains("different type operands `Uint64` and `Bytes`"), "{msg}");

    let msg = reject_approval("if (Txn.Note) { return 1; } return 0;");
    assert!(msg.contains("condition must be Uint64, found `Bytes`"), "{msg}");

    let msg = reject_approval("return Txn.Note && 1;");
    assert!(msg.contains("operator `&&` needs Uint64 operands"), "{msg}");

    let msg = reject_approval("return !Txn.Note;");
    assert!(msg.contains("`!` can only be done on Uint64"), "{msg}");

    let msg = reject_approval("switch (1) { case \"a\" { return 1; } } return 0;");
    assert!(msg.contains("same type as the tested value `Uint64`"), "{msg}");
}

#[test]
fn members_and_accessors() {
    let msg = reject_approval("return Txn.Bogus;");
    assert!(msg.contains("`Bogus` is not part of `ApplicationCallTransaction`"), "{msg}");

    let msg = reject_approval("return Global[0];");
    assert!(msg.contains("`Global` doesn't have a [] accessor"), "{msg}");

    check_str(
        "def ApprovalProgram() {
            return TxnGroup[0] == PaymentTransaction && Txn.Accounts[1].Balance > 0;
        }",
        Mode::APPROVAL,
    )
    .unwrap();
}

#[test]
fn members_without_a_program_value_are_rejected() {
    for src in [
        "return Txn.Assets[0].AssetParam.Total > 0;",
        "return Global.CurrentApplication.Params.ExtraProgramPages;",
        "return Txn.Params.ExtraProgramPages;",
        "return Txn.Accounts[0].Assets[Txn.Assets[0]].AssetBalance;",
    ] {
        let msg = reject_approval(src);
        assert!(msg.contains("cannot be read by a program"), "{src}: {msg}");
    }

    check_str(
        "def ApprovalProgram() { x = Txn.Scratch[0]; return Txn.Assets.len > 0; }",
        Mode::APPROVAL,
    )
    .unwrap();
}

#[test]
fn type_tests_only_apply_to_transactions() {
    let msg = reject_approval("x = 1; return x == Uint64;");
    assert!(msg.contains("needs `Txn` or `TxnGroup[i]` on the left"), "{msg}");

    let msg = reject_approval("return TxnGroup[0] == Transaction;");
    assert!(msg.contains("`Transaction` is not a transaction type"), "{msg}");

    let msg = reject_approval("return Txn == PaymentTransaction;");
    assert!(msg.contains("can't compare `Txn`"), "{msg}");
}

#[test]
fn casts() {
    check_str(
        "def ApprovalProgram() { return (Txn.Fee : Bytes) == Txn.Note; }",
        Mode::APPROVAL,
    )
    .unwrap();

    let msg = reject_approval("return (Txn : Uint64);");
    assert!(msg.contains("can't cast `Txn` to `Uint64`"), "{msg}");

    let msg = reject_approval("return (1 : 2);");
    assert!(msg.contains("cast target must be a type"), "{msg}");
}

#[test]
fn on_complete_values_depend_on_mode() {
    check_str(
        "def ApprovalProgram() { return Txn.OnCompletion == OptIn; }",
        Mode::APPROVAL,
    )
    .unwrap();

    let msg = reject("def Signature() { return NoOp == 0; }", Mode::SIGNATURE);
    assert!(msg.contains("`NoOp` is not declared"), "{msg}");
}

#[test]
fn errors_quote_the_first_line_only() {
    let msg = reject_approval("if (Txn.Note\n) { return 1; } return 0;");
    assert!(msg.contains("in `Txn.Note` at 1:29"), "{msg}");

    let msg = reject_approval("x = 1 +\n \"a\"; return 1;");
    assert!(msg.contains("in `1 + ...`"), "{msg}");
}
