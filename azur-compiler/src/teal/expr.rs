// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Expression lowering.
//!
//! Every value expression leaves exactly one slot on the
//! stack; a call to a function without a return value
//! leaves none. Locals live in stack slots below the
//! temporaries and are reached with `dig`, and written
//! back with `swap`/`cover`/`uncover`.

use super::ctx::LowerCtx;
use super::fields::{self, CURRENT_APPLICATION_FIELDS, GLOBAL_FIELDS, TXN_FIELDS};
use super::instr::Operand;
use super::opcodes::{self, Opcode, StackType};
use crate::Error;
use crate::ast::*;
use crate::semantic::types::TypeTable;

/// Largest immediate accepted by `dig`, `cover`,
/// `uncover`, `txna` and `gtxn`.
const MAX_IMMEDIATE: u64 = 255;

pub fn lower_expr(cx: &mut LowerCtx<'_>, e: &Expr) -> Result<(), Error> {
    match e {
        Expr::Uint64(c) => cx.push_uint(c.value),
        Expr::Bytes(c) => cx.op_with(&opcodes::PUSHBYTES, vec![Operand::Bytes(c.value.clone())]),
        Expr::Unary(u) => lower_unary(cx, u),
        Expr::Binary(b) => lower_binary(cx, b),
        Expr::Call(c) => lower_call(cx, c),
        Expr::Var(v) => lower_load(cx, v),
    }
}

/// Expression evaluated for its effect only.
pub fn lower_expr_statement(cx: &mut LowerCtx<'_>, e: &Expr) -> Result<(), Error> {
    if let Some(b) = e.as_binary(BinaryOperator::Assign) {
        return lower_assign(cx, b, false);
    }

    let depth = cx.builder.depth();
    lower_expr(cx, e)?;

    while cx.builder.depth() > depth {
        cx.op(&opcodes::POP)?;
    }

    Ok(())
}

fn lower_unary(cx: &mut LowerCtx<'_>, u: &UnaryOp) -> Result<(), Error> {
    lower_expr(cx, &u.operand)?;

    match u.op {
        UnaryOperator::Not => cx.op(&opcodes::NOT),
        UnaryOperator::Complement if cx.builder.top() == Some(StackType::Bytes) => {
            cx.op(&opcodes::B_NOT)
        }
        UnaryOperator::Complement => cx.op(&opcodes::BIT_NOT),
    }
}

fn lower_binary(cx: &mut LowerCtx<'_>, b: &BinaryOp) -> Result<(), Error> {
    use BinaryOperator::*;

    match b.op {
        Assign => lower_assign(cx, b, true),
        Ternary => lower_ternary(cx, b),
        Colon => lower_cast(cx, b),
        Range | RangeInclusive => Err(Error::compilation(format!(
            "range operator `{}` cannot be lowered",
            b.op
        ))),
        Eq | Ne if is_type_name(cx, &b.right) => lower_type_test(cx, b),
        op => {
            lower_expr(cx, &b.left)?;
            lower_expr(cx, &b.right)?;
            lower_operator(cx, op)
        }
    }
}

/// Picks the numeric or the byte family by
/// the operand types on the stack.
fn lower_operator(cx: &mut LowerCtx<'_>, op: BinaryOperator) -> Result<(), Error> {
    use BinaryOperator::*;

    let left = cx.builder.type_at(1).unwrap_or(StackType::Any);
    let right = cx.builder.type_at(0).unwrap_or(StackType::Any);

    let numeric = |t: StackType| t != StackType::Bytes;
    if numeric(left) && numeric(right) {
        return cx.op(uint_opcode(op)?);
    }

    if matches!(op, And | Or | Pow | Shl | Shr) {
        return Err(Error::compilation(format!(
            "operator `{op}` has no byte-string form"
        )));
    }

    let mixed = (left == StackType::Uint64 && right == StackType::Bytes)
        || (left == StackType::Bytes && right == StackType::Uint64);
    if matches!(op, Eq | Ne) && !mixed {
        return cx.op(uint_opcode(op)?);
    }

    if left == StackType::Uint64 {
        cx.op(&opcodes::SWAP)?;
        cx.op(&opcodes::ITOB)?;
        cx.op(&opcodes::SWAP)?;
    }

    if right == StackType::Uint64 {
        cx.op(&opcodes::ITOB)?;
    }

    cx.op(bytes_opcode(op)?)
}

fn uint_opcode(op: BinaryOperator) -> Result<&'static Opcode, Error> {
    use BinaryOperator::*;

    let o = match op {
        Or => &opcodes::OR,
        And => &opcodes::AND,
        BitOr => &opcodes::BIT_OR,
        BitXor => &opcodes::BIT_XOR,
        BitAnd => &opcodes::BIT_AND,
        Eq => &opcodes::EQ,
        Ne => &opcodes::NE,
        Lt => &opcodes::LT,
        Gt => &opcodes::GT,
        Le => &opcodes::LE,
        Ge => &opcodes::GE,
        Shl => &opcodes::SHL,
        Shr => &opcodes::SHR,
        Add => &opcodes::ADD,
        Sub => &opcodes::SUB,
        Mul => &opcodes::MUL,
        Div => &opcodes::DIV,
        Mod => &opcodes::MOD,
        Pow => &opcodes::EXP,
        other => {
            return Err(Error::compilation(format!(
                "operator `{other}` has no opcode"
            )));
        }
    };

    Ok(o)
}

fn bytes_opcode(op: BinaryOperator) -> Result<&'static Opcode, Error> {
    use BinaryOperator::*;

    let o = match op {
        BitOr => &opcodes::B_OR,
        BitXor => &opcodes::B_XOR,
        BitAnd => &opcodes::B_AND,
        Eq => &opcodes::B_EQ,
        Ne => &opcodes::B_NE,
        Lt => &opcodes::B_LT,
        Gt => &opcodes::B_GT,
        Le => &opcodes::B_LE,
        Ge => &opcodes::B_GE,
        Add => &opcodes::B_ADD,
        Sub => &opcodes::B_SUB,
        Mul => &opcodes::B_MUL,
        Div => &opcodes::B_DIV,
        Mod => &opcodes::B_MOD,
        other => {
            return Err(Error::compilation(format!(
                "operator `{other}` has no byte-string opcode"
            )));
        }
    };

    Ok(o)
}

fn is_type_name(cx: &LowerCtx<'_>, e: &Expr) -> bool {
    e.as_reference()
        .is_some_and(|r| cx.slot(&r.name).is_none() && cx.types.lookup(&r.name).is_some())
}

/// `Txn == T` or `TxnGroup[i] == T` for a transaction
/// subtype `T`, compared through `TypeEnum`.
fn lower_type_test(cx: &mut LowerCtx<'_>, b: &BinaryOp) -> Result<(), Error> {
    let cannot = || Error::compilation(format!("type test `{b}` cannot be lowered"));

    let code = b
        .right
        .as_reference()
        .and_then(|r| fields::txn_type_code(&r.name))
        .ok_or_else(cannot)?;

    let Expr::Var(v) = &*b.left else {
        return Err(cannot());
    };

    let mut path = Vec::new();
    flatten(v, &mut path);

    match path.as_slice() {
        [Seg::Name("Txn")] => cx.op_with(&opcodes::TXN, vec![Operand::Field("TypeEnum")])?,
        [Seg::Name("TxnGroup"), Seg::Index(i)] => match const_index(i) {
            Some(k) => cx.op_with(
                &opcodes::GTXN,
                vec![Operand::Uint(k), Operand::Field("TypeEnum")],
            )?,
            None => {
                lower_expr(cx, i)?;
                cx.op_with(&opcodes::GTXNS, vec![Operand::Field("TypeEnum")])?;
            }
        },
        _ => return Err(cannot()),
    }

    cx.builder.retype_top(StackType::Uint64);
    cx.push_uint(code)?;

    match b.op {
        BinaryOperator::Ne => cx.op(&opcodes::NE),
        _ => cx.op(&opcodes::EQ),
    }
}

/// Whether `e` is a transaction the type test
/// lowering understands.
pub fn is_transaction_path(e: &Expr) -> bool {
    let Expr::Var(v) = e else {
        return false;
    };

    let mut path = Vec::new();
    flatten(v, &mut path);

    matches!(
        path.as_slice(),
        [Seg::Name("Txn")] | [Seg::Name("TxnGroup"), Seg::Index(_)]
    )
}

/// `keep` leaves a copy of the stored value
/// on the stack, for nested assignments.
pub fn lower_assign(cx: &mut LowerCtx<'_>, b: &BinaryOp, keep: bool) -> Result<(), Error> {
    let Some(target) = b.left.as_reference() else {
        return Err(Error::compilation(format!(
            "`{}` is not a plain variable",
            b.left
        )));
    };

    let Some(slot) = cx.slot(&target.name) else {
        return Err(Error::compilation(format!(
            "`{}` has no stack slot",
            target.name
        )));
    };

    lower_expr(cx, &b.right)?;
    let ty = cx.builder.top().unwrap_or(StackType::Any);

    if keep {
        cx.op(&opcodes::DUP)?;
    }

    let n = distance(cx, slot.pos)?;
    if n == 1 {
        cx.op(&opcodes::SWAP)?;
    } else {
        cx.op_with(&opcodes::COVER, vec![Operand::Uint(n)])?;
        cx.op_with(&opcodes::UNCOVER, vec![Operand::Uint(n - 1)])?;
    }

    cx.op(&opcodes::POP)?;
    cx.note_store(&target.name, ty);

    Ok(())
}

/// Distance from the stack top to the slot
/// whose depth-after-push is `pos`.
fn distance(cx: &LowerCtx<'_>, pos: usize) -> Result<u64, Error> {
    let n = cx
        .builder
        .depth()
        .checked_sub(pos)
        .ok_or_else(|| Error::compilation("variable slot above the stack top"))? as u64;

    if n > MAX_IMMEDIATE {
        return Err(Error::compilation(format!(
            "variable is {n} slots deep, at most {MAX_IMMEDIATE} are reachable"
        )));
    }

    Ok(n)
}

fn lower_ternary(cx: &mut LowerCtx<'_>, b: &BinaryOp) -> Result<(), Error> {
    let Some(arms) = b.right.as_binary(BinaryOperator::Colon) else {
        return Err(Error::compilation(format!(
            "`{b}` is missing its `:` arm"
        )));
    };

    let else_label = cx.builder.fresh_label("ternary_else");
    let end_label = cx.builder.fresh_label("ternary_end");

    lower_expr(cx, &b.left)?;
    cx.op_with(&opcodes::BZ, vec![Operand::Label(else_label.clone())])?;
    let before = cx.builder.snapshot();

    lower_expr(cx, &arms.left)?;
    let then_state = cx.builder.snapshot();
    cx.op_with(&opcodes::BRANCH, vec![Operand::Label(end_label.clone())])?;

    cx.builder.label(else_label);
    cx.builder.restore(before);
    lower_expr(cx, &arms.right)?;

    cx.builder.label(end_label);
    cx.builder.merge(&then_state)
}

fn lower_cast(cx: &mut LowerCtx<'_>, b: &BinaryOp) -> Result<(), Error> {
    let Some(name) = b.right.as_reference().map(|r| r.name.as_str()) else {
        return Err(Error::compilation(format!(
            "cast target `{}` is not a type",
            b.right
        )));
    };

    let Some(target) = cx.types.lookup(name) else {
        return Err(Error::compilation(format!("unknown type `{name}`")));
    };

    lower_expr(cx, &b.left)?;
    let from = cx.builder.top();

    match target {
        TypeTable::UINT64 if from == Some(StackType::Bytes) => cx.op(&opcodes::BTOI),
        TypeTable::BYTES if from == Some(StackType::Uint64) => cx.op(&opcodes::ITOB),
        TypeTable::UINT64 => {
            cx.builder.retype_top(StackType::Uint64);
            Ok(())
        }
        TypeTable::BYTES => {
            cx.builder.retype_top(StackType::Bytes);
            Ok(())
        }
        TypeTable::ANY => {
            cx.builder.retype_top(StackType::Any);
            Ok(())
        }
        t if cx.types.is_enum(t) => {
            if from == Some(StackType::Bytes) {
                cx.op(&opcodes::BTOI)?;
            }

            cx.builder.retype_top(StackType::Uint64);

            Ok(())
        }
        _ => Err(Error::compilation(format!(
            "cast to `{name}` cannot be lowered"
        ))),
    }
}

fn lower_call(cx: &mut LowerCtx<'_>, c: &Call) -> Result<(), Error> {
    let name = c.function.name.as_str();
    if name == "Hash" {
        return lower_hash(cx, c);
    }

    let Some(callee) = cx.program.function(name) else {
        return Err(Error::compilation(format!("unknown function `{name}`")));
    };

    for arg in &c.args {
        let depth = cx.builder.depth();
        lower_expr(cx, arg)?;

        if cx.builder.depth() != depth + 1 {
            return Err(Error::compilation(format!(
                "argument `{arg}` of `{name}` has no value"
            )));
        }
    }

    cx.op_with(&opcodes::CALLSUB, vec![Operand::Label(name.to_string())])?;
    cx.builder.call_effect(c.args.len(), callee.returns_value())
}

fn lower_hash(cx: &mut LowerCtx<'_>, c: &Call) -> Result<(), Error> {
    let [input, algo] = c.args.as_slice() else {
        return Err(Error::compilation("`Hash` takes two arguments"));
    };

    let index = algo.as_reference().and_then(|r| {
        cx.types
            .enum_values(cx.builtins.hash)
            .and_then(|values| values.iter().position(|v| *v == r.name))
    });

    let op = match index {
        Some(0) => &opcodes::SHA256,
        Some(1) => &opcodes::KECCAK256,
        Some(2) => &opcodes::SHA512_256,
        _ => {
            return Err(Error::compilation(format!(
                "`{algo}` is not a hash algorithm"
            )));
        }
    };

    lower_expr(cx, input)?;
    if cx.builder.top() == Some(StackType::Uint64) {
        cx.op(&opcodes::ITOB)?;
    }

    cx.op(op)
}

#[derive(Clone, Copy, Debug)]
enum Seg<'e> {
    Name(&'e str),
    Index(&'e Expr),
}

fn flatten<'e>(v: &'e Variable, out: &mut Vec<Seg<'e>>) {
    match v {
        Variable::Reference(r) => out.push(Seg::Name(&r.name)),
        Variable::ArrayAccess(a) => {
            flatten(&a.base, out);
            out.push(Seg::Index(&a.index));
        }
        Variable::MemberAccess(m) => {
            flatten(&m.owner, out);
            out.push(Seg::Name(&m.member.name));
        }
    }
}

/// A variable path with a value form.
#[derive(Clone, Copy)]
enum Load<'e> {
    /// Local, parameter or named constant.
    Name(&'e str),
    /// `txn`/`global` field with no immediate index.
    Field(&'static Opcode, &'static str, StackType),
    Account(&'static Opcode, &'e Expr),
    TxnArray(&'static fields::TxnArray, &'e Expr),
    Scratch(&'e Expr),
    Group(&'e Expr, &'static fields::TxnField),
    ArgCount,
    Arg(&'e Expr),
}

fn classify<'e>(path: &[Seg<'e>]) -> Option<Load<'e>> {
    use Seg::{Index, Name};

    let load = match path {
        [Name(n)] => Load::Name(*n),

        [Name("Txn"), Name("Accounts"), Index(i), Name(f)] => {
            let op = match *f {
                "Balance" => &opcodes::BALANCE,
                "MinBalance" => &opcodes::MIN_BALANCE,
                _ => return None,
            };

            Load::Account(op, *i)
        }
        [Name("Txn"), Name(arr), Name("len")] => {
            let a = fields::txn_array(arr)?;
            Load::Field(&opcodes::TXN, a.count, StackType::Uint64)
        }
        [Name("Txn"), Name("Scratch"), Index(i)] => Load::Scratch(*i),
        [Name("Txn"), Name(arr), Index(i)] => Load::TxnArray(fields::txn_array(arr)?, *i),
        [Name("Txn"), Name(f)] => {
            let field = fields::lookup(TXN_FIELDS, f)?;
            Load::Field(&opcodes::TXN, field.teal, field.ty)
        }

        [Name("Global"), Name("CurrentApplication"), Name(f)] => {
            let field = fields::lookup(CURRENT_APPLICATION_FIELDS, f)?;
            Load::Field(&opcodes::GLOBAL, field.teal, field.ty)
        }
        [Name("Global"), Name(f)] => {
            let field = fields::lookup(GLOBAL_FIELDS, f)?;
            Load::Field(&opcodes::GLOBAL, field.teal, field.ty)
        }

        [Name("TxnGroup"), Name("len")] => {
            Load::Field(&opcodes::GLOBAL, "GroupSize", StackType::Uint64)
        }
        [Name("TxnGroup"), Index(i), Name(f)] => Load::Group(*i, fields::lookup(TXN_FIELDS, f)?),

        [Name("args"), Name("len")] => Load::ArgCount,
        [Name("args"), Index(i)] => Load::Arg(*i),

        _ => return None,
    };

    Some(load)
}

/// Whether the generator can put the value of `v` on the
/// stack. Plain names are left to scope resolution.
pub fn is_loadable(v: &Variable) -> bool {
    let mut path = Vec::new();
    flatten(v, &mut path);

    classify(&path).is_some()
}

fn lower_load(cx: &mut LowerCtx<'_>, v: &Variable) -> Result<(), Error> {
    let mut path = Vec::new();
    flatten(v, &mut path);

    let cannot = || Error::compilation(format!("cannot load `{v}`"));

    match classify(&path).ok_or_else(cannot)? {
        Load::Name(n) => {
            if load_name(cx, n, v.span().start())? {
                Ok(())
            } else {
                Err(cannot())
            }
        }
        Load::Field(op, field, ty) => load_field(cx, op, vec![Operand::Field(field)], ty),
        Load::Account(op, i) => {
            lower_expr(cx, i)?;
            cx.op(op)
        }
        Load::TxnArray(a, i) => load_txn_array(cx, a, i),
        Load::Scratch(i) => match const_index(i) {
            Some(k) => cx.op_with(&opcodes::LOAD, vec![Operand::Uint(k)]),
            None => {
                lower_expr(cx, i)?;
                cx.op(&opcodes::LOADS)
            }
        },
        Load::Group(i, field) => match const_index(i) {
            Some(k) => load_field(
                cx,
                &opcodes::GTXN,
                vec![Operand::Uint(k), Operand::Field(field.teal)],
                field.ty,
            ),
            None => {
                lower_expr(cx, i)?;
                load_field(cx, &opcodes::GTXNS, vec![Operand::Field(field.teal)], field.ty)
            }
        },
        Load::ArgCount => {
            if !cx.flags.is_application() {
                return Err(Error::compilation(
                    "`args.len` is only available in application mode",
                ));
            }

            load_field(
                cx,
                &opcodes::TXN,
                vec![Operand::Field("NumAppArgs")],
                StackType::Uint64,
            )
        }
        Load::Arg(i) => {
            if cx.flags.is_application() {
                let a = fields::txn_array("Args").ok_or_else(cannot)?;
                return load_txn_array(cx, a, i);
            }

            match const_index(i) {
                Some(k) => cx.op_with(&opcodes::ARG, vec![Operand::Uint(k)]),
                None => {
                    lower_expr(cx, i)?;
                    cx.op(&opcodes::ARGS)
                }
            }
        }
    }
}

/// Locals, `true`/`false` and enum constants.
/// `false` when the name has no value form.
fn load_name(cx: &mut LowerCtx<'_>, name: &str, offset: usize) -> Result<bool, Error> {
    if let Some(slot) = cx.slot(name) {
        let n = distance(cx, slot.pos)?;
        cx.op_with(&opcodes::DIG, vec![Operand::Uint(n)])?;
        if let Some(ty) = cx.read_type(offset, slot) {
            cx.builder.retype_top(ty);
        }

        return Ok(true);
    }

    let value = match name {
        "true" => 1,
        "false" => 0,
        _ => match cx.enum_value(name) {
            Some(v) => v,
            None => return Ok(false),
        },
    };

    cx.push_uint(value)?;

    Ok(true)
}

fn load_field(
    cx: &mut LowerCtx<'_>,
    op: &'static Opcode,
    operands: Vec<Operand>,
    ty: StackType,
) -> Result<(), Error> {
    cx.op_with(op, operands)?;
    cx.builder.retype_top(ty);

    Ok(())
}

fn load_txn_array(cx: &mut LowerCtx<'_>, a: &fields::TxnArray, index: &Expr) -> Result<(), Error> {
    match const_index(index) {
        Some(k) => load_field(
            cx,
            &opcodes::TXNA,
            vec![Operand::Field(a.elem), Operand::Uint(k)],
            a.ty,
        ),
        None => {
            lower_expr(cx, index)?;
            load_field(cx, &opcodes::TXNAS, vec![Operand::Field(a.elem)], a.ty)
        }
    }
}

fn const_index(e: &Expr) -> Option<u64> {
    match e {
        Expr::Uint64(c) if c.value <= MAX_IMMEDIATE => Some(c.value),
        _ => None,
    }
}
