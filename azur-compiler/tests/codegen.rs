// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

mod common;

use azur_compiler::{
    CompileOptions, CompiledProgram, Mode, TealInstruction, compile_all, compile_str, compile_with,
};
use common::{Env, Outcome, Value};
use std::collections::BTreeMap;

fn approval(src: &str) -> CompiledProgram {
    compile_str(src, Mode::APPROVAL).unwrap_or_else(|e| panic!("{e}"))
}

fn body(p: &CompiledProgram) -> Vec<String> {
    p.instructions.iter().map(|i| i.to_string()).collect()
}

fn result(p: &CompiledProgram) -> Outcome {
    common::run(p, Env::default()).0
}

#[test]
fn assignment_then_read_is_emitted_in_order() {
    let p = approval("def ApprovalProgram() { x = 1; return x + 2; }");

    assert_eq!(
        body(&p),
        [
            "pushint 0", "pushint 1", "swap", "pop", "dig 0", "pushint 2", "+", "return",
        ]
    );
    assert!(p.instructions.iter().all(|i| !matches!(i, TealInstruction::Label(_))));
    assert_eq!(result(&p), Outcome::Return(3));
    assert_eq!(p.metrics.placeholders, 1);
}

#[test]
fn falling_off_the_entry_rejects() {
    let p = approval("def ApprovalProgram() { x = 1; }");

    assert_eq!(body(&p).last().map(String::as_str), Some("return"));
    assert_eq!(result(&p), Outcome::Return(0));
}

#[test]
fn bare_entry_return_accepts() {
    let p = approval("def ApprovalProgram() { return; }");
    assert_eq!(body(&p), ["pushint 1", "return"]);
}

#[test]
fn nested_assignment_keeps_the_value() {
    let p = approval(
        "def ApprovalProgram() {
            a = 1;
            b = 2;
            a = b = 5;
            return a + b;
        }",
    );

    assert!(body(&p).contains(&"dup".to_string()));
    assert_eq!(result(&p), Outcome::Return(10));
}

#[test]
fn deep_slot_write_uses_cover_and_uncover() {
    let p = approval(
        "def ApprovalProgram() {
            a = 1;
            b = 2;
            a = 3;
            return a * 10 + b;
        }",
    );

    let ops = body(&p);
    assert!(ops.contains(&"cover 2".to_string()), "{ops:?}");
    assert!(ops.contains(&"uncover 1".to_string()), "{ops:?}");
    assert_eq!(result(&p), Outcome::Return(32));
}

const SWITCHED: &str = "
def classify(t) {
    switch (t) {
        case 1 { return 10; }
        case 2, 3 { return 20; }
        case 2 { return 99; }
        default { return 30; }
    }
    return 0;
}
";

const CHAINED: &str = "
def classify(t) {
    if (t == 1) { return 10; }
    else if (t == 2 || t == 3) { return 20; }
    else if (t == 2) { return 99; }
    else { return 30; }
}
";

#[test]
fn switch_behaves_like_the_if_chain() {
    for v in 0..6 {
        let entry = format!("def ApprovalProgram() {{ return classify({v}); }}");

        let switched = approval(&format!("{SWITCHED}{entry}"));
        let chained = approval(&format!("{CHAINED}{entry}"));

        assert_eq!(result(&switched), result(&chained), "t = {v}");
    }

    let p = approval(&format!(
        "{SWITCHED}def ApprovalProgram() {{ return classify(2); }}"
    ));
    assert_eq!(result(&p), Outcome::Return(20));
}

#[test]
fn switch_with_only_default_runs_it() {
    let p = approval(
        "def ApprovalProgram() {
            switch (7) { default { return 4; } }
        }",
    );

    assert_eq!(result(&p), Outcome::Return(4));
}

#[test]
fn while_and_do_loops_run() {
    let p = approval(
        "def ApprovalProgram() {
            i = 0;
            s = 0;
            while (i < 5) {
                s = s + i;
                i = i + 1;
            }
            do {
                s = s + 100;
            } while (s < 300);
            return s;
        }",
    );

    assert_eq!(result(&p), Outcome::Return(310));
}

#[test]
fn ternary_picks_an_arm() {
    let p = approval(
        "def ApprovalProgram() {
            x = 4;
            return x > 3 ? 7 : 9;
        }",
    );

    assert_eq!(result(&p), Outcome::Return(7));
}

#[test]
fn block_locals_are_popped_on_exit() {
    let p = approval(
        "def ApprovalProgram() {
            x = 1;
            if (x == 1) {
                y = 5;
                x = x + y;
            }
            return x;
        }",
    );

    assert_eq!(result(&p), Outcome::Return(6));
}

#[test]
fn subroutines_leave_exactly_their_result() {
    let p = approval(
        "def add(a, b) {
            c = a + b;
            return c;
        }

        def touch(a) {
            x = a + 1;
        }

        def early(a) {
            if (a > 1) { return; }
            y = a;
        }

        def ApprovalProgram() {
            touch(1);
            early(5);
            early(0);
            return add(2, add(3, 4));
        }",
    );

    let (outcome, calls) = common::run(&p, Env::default());
    assert_eq!(outcome, Outcome::Return(9));

    let expected: BTreeMap<&str, isize> =
        [("add", -1), ("touch", -1), ("early", -1)].into_iter().collect();
    assert_eq!(calls.len(), 5);
    for c in &calls {
        assert_eq!(c.delta, expected[c.name.as_str()], "{}", c.name);
    }
}

#[test]
fn generated_labels_are_defined_and_used_once() {
    let p = approval(
        "def ApprovalProgram() {
            i = 0;
            while (i < 3) {
                if (i == 1) { i = i + 2; } else { i = i + 1; }
            }
            do { i = i - 1; } while (i > 0);
            if (i == 0) { i = 1; }
            switch (i) { case 1 { return 1; } case 2 { return 2; } }
            return i > 0 ? 1 : 0;
        }",
    );

    let mut defined = BTreeMap::new();
    let mut used = BTreeMap::new();
    for i in &p.instructions {
        if let TealInstruction::Label(l) = i {
            *defined.entry(l.clone()).or_insert(0) += 1;
        }

        if let Some(t) = i.target() {
            *used.entry(t.to_string()).or_insert(0) += 1;
        }
    }

    assert!(!defined.is_empty());
    for (label, n) in &defined {
        assert!(label.starts_with("__"), "{label}");
        assert_eq!(*n, 1, "{label} defined {n} times");
        assert_eq!(used.get(label), Some(&1), "{label}");
    }
    assert_eq!(p.metrics.labels as usize, defined.len());
}

#[test]
fn compiling_twice_is_identical() {
    let src = format!("{SWITCHED}def ApprovalProgram() {{ return classify(3) == 20; }}");

    let a = approval(&src).to_assembly();
    let b = approval(&src).to_assembly();
    assert_eq!(a, b);
}

#[test]
fn unreachable_functions_are_pruned() {
    let p = approval(
        "def used() { return 1; }
        def unused() { return 2; }
        def ApprovalProgram() { return used(); }",
    );

    let asm = p.to_assembly();
    assert!(asm.contains("// used()\nused:\n"), "{asm}");
    assert!(!asm.contains("unused"), "{asm}");
    assert_eq!(p.metrics.pruned, 1);
    assert_eq!(p.metrics.subroutines, 1);
}

#[test]
fn value_function_without_return_ends_in_err() {
    let p = approval(
        "def f(a) {
            if (a) { return 1; }
        }
        def ApprovalProgram() { return f(0); }",
    );

    assert_eq!(body(&p).last().map(String::as_str), Some("err"));
    assert_eq!(result(&p), Outcome::Failed);
}

#[test]
fn transaction_fields_are_read() {
    let p = approval(
        "def ApprovalProgram() {
            if (Txn.OnCompletion != NoOp) { return 0; }
            return Txn.Fee <= Global.MinTxnFee && Txn.Args.len == 1;
        }",
    );

    let ops = body(&p);
    for op in ["txn OnCompletion", "pushint 0", "txn Fee", "global MinTxnFee", "txn NumAppArgs"] {
        assert!(ops.contains(&op.to_string()), "missing {op}: {ops:?}");
    }

    let mut env = Env::default();
    env.txn.insert("OnCompletion", Value::Uint(0));
    env.txn.insert("Fee", Value::Uint(1000));
    env.txn.insert("NumAppArgs", Value::Uint(1));
    env.global.insert("MinTxnFee", Value::Uint(1000));

    assert_eq!(common::run(&p, env).0, Outcome::Return(1));
}

#[test]
fn arrays_use_immediate_or_stack_index() {
    let p = approval(
        "def ApprovalProgram() {
            i = 1;
            a = Txn.Args[0];
            b = Txn.Args[i];
            c = TxnGroup[1].Fee;
            d = TxnGroup[i].Fee;
            e = Txn.Accounts[i].Balance;
            return a == b && c == d && e > 0 && TxnGroup.len == 2;
        }",
    );

    let ops = body(&p);
    for op in [
        "txna ApplicationArgs 0",
        "txnas ApplicationArgs",
        "gtxn 1 Fee",
        "gtxns Fee",
        "balance",
        "global GroupSize",
    ] {
        assert!(ops.contains(&op.to_string()), "missing {op}: {ops:?}");
    }
}

#[test]
fn byte_operands_select_byte_opcodes() {
    let p = approval(
        "def ApprovalProgram() {
            s = Txn.Note + Txn.Lease;
            return s == Txn.Note && Txn.Sender != Global.ZeroAddress && (Txn.Fee : Bytes) == Txn.Lease;
        }",
    );

    let ops = body(&p);
    assert!(ops.contains(&"b+".to_string()), "{ops:?}");
    assert!(ops.contains(&"!=".to_string()), "{ops:?}");
    assert!(ops.contains(&"itob".to_string()), "{ops:?}");
}

#[test]
fn hash_selects_the_algorithm() {
    let p = approval(
        "def ApprovalProgram() {
            return Hash(Txn.Note, Keccak256) == Hash(5, SHA512_256);
        }",
    );

    let ops = body(&p);
    assert!(ops.contains(&"keccak256".to_string()), "{ops:?}");
    assert!(ops.contains(&"sha512_256".to_string()), "{ops:?}");
    assert!(ops.contains(&"itob".to_string()), "{ops:?}");
}

#[test]
fn throw_logs_in_application_mode() {
    let p = approval("def ApprovalProgram() { throw \"no\"; }");
    assert_eq!(body(&p), ["pushbytes base64(bm8=)", "log", "err"]);

    let mut vm = common::Vm::new(&p, Env::default());
    assert_eq!(vm.run(), Ok(Outcome::Failed));
    assert_eq!(vm.logs, [b"no".to_vec()]);
}

#[test]
fn signature_mode_reads_logic_args() {
    let src = "def Signature() {
        if (args[0] == \"ok\") { return 1; }
        throw \"bad\";
    }";

    let p = compile_str(src, Mode::SIGNATURE).unwrap();
    let asm = p.to_assembly();
    assert!(asm.contains("arg 0\npushbytes base64(b2s=)\n==\n"), "{asm}");
    assert!(asm.contains("// throw bad\nerr\n"), "{asm}");

    let env = Env {
        args: vec![b"ok".to_vec()],
        ..Env::default()
    };
    assert_eq!(common::run(&p, env).0, Outcome::Return(1));
}

#[test]
fn one_program_per_selected_entry() {
    let src = "
        def helper() { return 1; }
        def ApprovalProgram() { return helper(); }
        def ClearStateProgram() { return 1; }
    ";

    let opts = CompileOptions::new(Mode::APPROVAL | Mode::CLEAR_STATE);
    let programs = compile_all(src, &opts).unwrap();

    assert_eq!(programs.len(), 2);
    assert!(programs[0].to_assembly().contains("helper:"));
    assert!(!programs[1].to_assembly().contains("helper"));
}

#[test]
fn old_teal_version_is_rejected_at_first_missing_opcode() {
    let src = "def ApprovalProgram() { a = 1; b = 2; a = 3; return a; }";

    let opts = CompileOptions::new(Mode::APPROVAL).teal_version(4);
    let err = compile_with(src, &opts).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("`cover` is not available in TEAL v4"), "{msg}");
    assert!(msg.contains("ApprovalProgram"), "{msg}");

    let opts = CompileOptions::new(Mode::APPROVAL).teal_version(4);
    let p = compile_with("def ApprovalProgram() { x = 1; return x; }", &opts).unwrap();
    assert!(p.to_assembly().starts_with("#pragma version 4\n"));
}

#[test]
fn type_tests_compare_the_type_enum() {
    let p = approval(
        "def ApprovalProgram() {
            i = 1;
            return TxnGroup[0] == PaymentTransaction
                && TxnGroup[i] != AssetTransferTransaction
                && Txn == ApplicationCallTransaction;
        }",
    );

    let asm = p.to_assembly();
    assert!(asm.contains("gtxn 0 TypeEnum\npushint 1\n==\n"), "{asm}");
    assert!(asm.contains("gtxns TypeEnum\npushint 4\n!=\n"), "{asm}");
    assert!(asm.contains("txn TypeEnum\npushint 6\n==\n"), "{asm}");
}

#[test]
fn scratch_reads_use_load() {
    let p = approval(
        "def ApprovalProgram() {
            i = 2;
            a = Txn.Scratch[3];
            b = Txn.Scratch[i];
            return a == b;
        }",
    );

    let ops = body(&p);
    assert!(ops.contains(&"load 3".to_string()), "{ops:?}");
    assert!(ops.contains(&"loads".to_string()), "{ops:?}");
}

#[test]
fn string_escapes_reach_the_program_verbatim() {
    let p = approval(r#"def ApprovalProgram() { throw "a\n"; }"#);
    assert_eq!(body(&p), ["pushbytes base64(YVxu)", "log", "err"]);

    let p = approval(r#"def ApprovalProgram() { x = "a\q"; return x == "a"; }"#);
    assert!(body(&p).contains(&"pushbytes base64(YVxx)".to_string()));
}

#[test]
fn byte_locals_keep_byte_opcodes_after_shadowing() {
    let p = approval(
        r#"def ApprovalProgram() {
            if (1) { x = 1; }
            x = "ab";
            y = x + x;
            z = ~x;
            return 1;
        }"#,
    );

    let ops = body(&p);
    assert!(ops.contains(&"b+".to_string()), "{ops:?}");
    assert!(ops.contains(&"b~".to_string()), "{ops:?}");
    assert!(!ops.contains(&"+".to_string()), "{ops:?}");
    assert!(!ops.contains(&"~".to_string()), "{ops:?}");
}

#[test]
fn metrics_track_depth_and_cost() {
    let p = approval("def ApprovalProgram() { x = 1; return x + 2; }");

    assert_eq!(p.metrics.ops, 8);
    assert_eq!(p.metrics.peak_depth, 3);
    assert_eq!(p.metrics.static_cost, 8);
}
