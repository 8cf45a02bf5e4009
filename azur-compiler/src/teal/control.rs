// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Blocks, branches, loops and returns.
//!
//! Lowering functions here return `true` when the
//! instruction ends every execution path through it;
//! the rest of the enclosing block is then dropped.

use super::ctx::LowerCtx;
use super::expr::{lower_expr, lower_expr_statement};
use super::instr::Operand;
use super::opcodes;
use crate::Error;
use crate::ast::*;

pub fn lower_block(cx: &mut LowerCtx<'_>, b: &CodeBlock) -> Result<bool, Error> {
    cx.enter_block();

    // first assignments in this block's own
    // expressions get their slot up front
    for instr in &b.instructions {
        for e in instr.own_expressions() {
            for a in Node::Expr(e).assignments() {
                if let Some(r) = a.left.as_reference() {
                    if cx.slot(&r.name).is_none() {
                        cx.declare(&r.name)?;
                    }
                }
            }
        }
    }

    let mut terminated = false;
    for instr in &b.instructions {
        terminated = lower_instruction(cx, instr)?;
        if terminated {
            break;
        }
    }

    cx.leave_block(terminated)?;

    Ok(terminated)
}

fn lower_instruction(cx: &mut LowerCtx<'_>, instr: &Instruction) -> Result<bool, Error> {
    match instr {
        Instruction::If(i) => cx.with_ctx("if", |cx| lower_if(cx, i)),
        Instruction::While(w) => cx.with_ctx("while", |cx| lower_while(cx, w)),
        Instruction::DoWhile(d) => cx.with_ctx("do", |cx| lower_do_while(cx, d)),
        Instruction::Switch(s) => cx.with_ctx("switch", |cx| lower_switch(cx, s)),
        Instruction::Return(r) => cx.with_ctx(r.kind.keyword(), |cx| lower_return(cx, r)),
        Instruction::Expr(e) => {
            lower_expr_statement(cx, e)?;
            Ok(false)
        }
    }
}

fn lower_if(cx: &mut LowerCtx<'_>, i: &If) -> Result<bool, Error> {
    lower_expr(cx, &i.condition)?;

    let Some(else_block) = &i.else_block else {
        let end = cx.builder.fresh_label("if_end");
        cx.op_with(&opcodes::BZ, vec![Operand::Label(end.clone())])?;

        let before = cx.builder.snapshot();
        let then_term = lower_block(cx, &i.then_block)?;
        cx.builder.label(end);

        if then_term {
            cx.builder.restore(before);
        } else {
            cx.builder.merge(&before)?;
        }

        return Ok(false);
    };

    let else_label = cx.builder.fresh_label("if_else");
    let end = cx.builder.fresh_label("if_end");
    cx.op_with(&opcodes::BZ, vec![Operand::Label(else_label.clone())])?;

    let before = cx.builder.snapshot();
    let then_term = lower_block(cx, &i.then_block)?;
    let then_state = cx.builder.snapshot();
    cx.op_with(&opcodes::BRANCH, vec![Operand::Label(end.clone())])?;

    cx.builder.label(else_label);
    cx.builder.restore(before);
    let else_term = lower_block(cx, else_block)?;
    cx.builder.label(end);

    match (then_term, else_term) {
        (false, false) => cx.builder.merge(&then_state)?,
        (false, true) => cx.builder.restore(then_state),
        _ => {}
    }

    Ok(then_term && else_term)
}

fn lower_while(cx: &mut LowerCtx<'_>, w: &While) -> Result<bool, Error> {
    let start = cx.builder.fresh_label("while_start");
    let end = cx.builder.fresh_label("while_end");

    cx.builder.label(start.clone());
    lower_expr(cx, &w.condition)?;
    cx.op_with(&opcodes::BZ, vec![Operand::Label(end.clone())])?;

    let before = cx.builder.snapshot();
    lower_block(cx, &w.block)?;
    cx.op_with(&opcodes::BRANCH, vec![Operand::Label(start)])?;

    cx.builder.label(end);
    cx.builder.restore(before);

    Ok(false)
}

fn lower_do_while(cx: &mut LowerCtx<'_>, d: &DoWhile) -> Result<bool, Error> {
    let start = cx.builder.fresh_label("do_start");

    cx.builder.label(start.clone());
    let before = cx.builder.snapshot();
    let body_term = lower_block(cx, &d.block)?;

    // keep the back edge even after a terminating
    // body so the loop label stays referenced
    cx.builder.restore(before);
    lower_expr(cx, &d.condition)?;
    cx.op_with(&opcodes::BNZ, vec![Operand::Label(start)])?;

    Ok(body_term)
}

/// Lowered as a right-folded chain of `if`/`else`
/// whose conditions compare the tested value
/// against each case value.
fn lower_switch(cx: &mut LowerCtx<'_>, s: &Switch) -> Result<bool, Error> {
    match desugar_switch(s)? {
        Some(chain) => lower_instruction(cx, &chain),
        None => match &s.default {
            Some(d) => lower_block(cx, d),
            None => Ok(false),
        },
    }
}

fn desugar_switch(s: &Switch) -> Result<Option<Instruction>, Error> {
    let mut chain: Option<Instruction> = None;
    let mut else_block = s.default.clone();

    for case in s.cases.iter().rev() {
        let mut tests = case.values.iter().map(|v| {
            Expr::Binary(BinaryOp {
                op: BinaryOperator::Eq,
                left: Box::new(s.tested.clone()),
                right: Box::new(v.clone()),
                span: v.span(),
            })
        });

        let Some(first) = tests.next() else {
            return Err(Error::compilation("switch case without values"));
        };

        let condition = tests.fold(first, |acc, t| {
            Expr::Binary(BinaryOp {
                op: BinaryOperator::Or,
                left: Box::new(acc),
                right: Box::new(t),
                span: case.span,
            })
        });

        let link = Instruction::If(If {
            condition,
            then_block: case.block.clone(),
            else_block,
            span: case.span,
        });

        else_block = Some(CodeBlock {
            instructions: vec![link.clone()],
            span: case.span,
        });
        chain = Some(link);
    }

    Ok(chain)
}

fn lower_return(cx: &mut LowerCtx<'_>, r: &Return) -> Result<bool, Error> {
    match r.kind {
        ReturnKind::Throw => {
            let Some(Expr::Bytes(msg)) = &r.value else {
                return Err(Error::compilation("`throw` needs a literal message"));
            };

            if cx.flags.is_application() {
                cx.op_with(&opcodes::PUSHBYTES, vec![Operand::Bytes(msg.value.clone())])?;
                cx.op(&opcodes::LOG)?;
            } else {
                let text = String::from_utf8_lossy(&msg.value);
                cx.builder.comment(format!(" throw {text}"));
            }

            cx.op(&opcodes::ERR)?;
        }
        ReturnKind::Exit => {
            let Some(v) = &r.value else {
                return Err(Error::compilation("`exit` needs a value"));
            };

            lower_expr(cx, v)?;
            cx.op(&opcodes::RETURN)?;
        }
        ReturnKind::Return if cx.is_main() => {
            match &r.value {
                Some(v) => lower_expr(cx, v)?,
                None => cx.push_uint(1)?,
            }

            cx.op(&opcodes::RETURN)?;
        }
        ReturnKind::Return => {
            match &r.value {
                Some(v) => {
                    lower_expr(cx, v)?;
                    drop_below_top(cx)?;
                }
                None => {
                    while cx.builder.depth() > 0 {
                        cx.op(&opcodes::POP)?;
                    }
                }
            }

            cx.op(&opcodes::RETSUB)?;
        }
    }

    Ok(true)
}

/// Leaves only the top slot of the function's
/// own stack.
fn drop_below_top(cx: &mut LowerCtx<'_>) -> Result<(), Error> {
    let below = cx.builder.depth().saturating_sub(1) as u64;

    match below {
        0 => {}
        n if n > 255 => {
            return Err(Error::compilation(format!(
                "{n} slots below the return value, at most 255 can be dropped"
            )));
        }
        1 => {
            cx.op(&opcodes::SWAP)?;
            cx.op(&opcodes::POP)?;
        }
        n => {
            cx.op_with(&opcodes::COVER, vec![Operand::Uint(n)])?;
            for _ in 0..n {
                cx.op(&opcodes::POP)?;
            }
        }
    }

    Ok(())
}
