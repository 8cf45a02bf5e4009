// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! TEAL code generation.
//!
//! Each entry program is generated on its own: functions
//! reachable from the entry are collected breadth first,
//! the entry is emitted inline and every other function
//! becomes a `callsub` target. Locals and parameters live
//! on the evaluation stack, so the builder tracks the
//! abstract stack exactly and [`builder::TealBuilder::finalize`]
//! checks the label graph before a program is returned.

pub mod builder;
pub mod ctx;
pub mod fields;
pub mod instr;
pub mod opcodes;

mod control;
mod expr;

pub use instr::{CompiledProgram, Operand, TealInstruction};

pub(crate) use expr::{is_loadable, is_transaction_path};

use crate::ast::{Function, Node, Program};
use crate::semantic::Analysis;
use crate::{CompileOptions, Error, Mode};
use builder::TealBuilder;
use ctx::{Flags, LowerCtx};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// One program per entry selected by the mode, in the
/// order approval, clear-state, signature.
pub fn generate(
    program: &Program,
    analysis: &Analysis,
    opts: &CompileOptions,
) -> Result<Vec<CompiledProgram>, Error> {
    [Mode::APPROVAL, Mode::CLEAR_STATE, Mode::SIGNATURE]
        .into_iter()
        .filter(|m| opts.mode.contains(*m))
        .map(|mode| generate_entry(program, analysis, &CompileOptions { mode, ..*opts }))
        .collect()
}

/// Generates the first entry program selected by the mode.
#[instrument(level = "debug", skip(program, analysis, opts), fields(mode = %opts.mode))]
pub fn generate_entry(
    program: &Program,
    analysis: &Analysis,
    opts: &CompileOptions,
) -> Result<CompiledProgram, Error> {
    let entry_mode = [Mode::APPROVAL, Mode::CLEAR_STATE, Mode::SIGNATURE]
        .into_iter()
        .find(|m| opts.mode.contains(*m))
        .ok_or(Error::InvalidMode("no entry program selected"))?;

    let entry = entry_mode
        .entry_points()
        .first()
        .copied()
        .ok_or(Error::InvalidMode("no entry program selected"))?;

    let Some(main) = program.function(entry) else {
        return Err(Error::compilation(format!(
            "missing entry function `{entry}`"
        )));
    };

    let order = reachable(program, main);

    let mut builder = TealBuilder::new(opts.teal_version, entry_mode);
    builder
        .metrics_mut()
        .set_pruned((program.functions.len() - order.len()) as u32);

    {
        let mut cx = LowerCtx::new(
            &mut builder,
            program,
            &analysis.local_types,
            Flags::for_entry(entry_mode),
        );
        for f in order.iter().copied() {
            let is_main = f.name == entry;
            cx.with_ctx(&f.name, |cx| lower_function(cx, f, is_main))
                .map_err(|e| cx.annotate(e))?;
        }
    }

    builder.finalize(entry)
}

/// Functions called directly or indirectly from
/// `main`, `main` first, in breadth-first order.
fn reachable<'p>(program: &'p Program, main: &'p Function) -> Vec<&'p Function> {
    let mut order = vec![main];
    let mut seen = BTreeSet::from([main.name.as_str()]);

    let mut next = 0;
    while next < order.len() {
        let f = order[next];
        next += 1;

        for call in Node::Function(f).calls() {
            // builtins have no definition
            let Some(callee) = program.function(&call.function.name) else {
                continue;
            };

            if seen.insert(callee.name.as_str()) {
                order.push(callee);
            }
        }
    }

    order
}

fn lower_function(cx: &mut LowerCtx<'_>, f: &Function, is_main: bool) -> Result<(), Error> {
    debug!(function = %f, is_main, "lower function");

    if !is_main {
        cx.builder.comment(format!(" {f}"));
        cx.builder.label(f.name.clone());
        cx.builder.metrics_mut().inc_subroutines();
    }

    cx.start_function(&f.params, is_main);

    if control::lower_block(cx, &f.body)? {
        return Ok(());
    }

    // falling off the end
    if is_main {
        cx.push_uint(0)?;
        cx.op(&opcodes::RETURN)
    } else if f.returns_value() {
        cx.op(&opcodes::ERR)
    } else {
        while cx.builder.depth() > 0 {
            cx.op(&opcodes::POP)?;
        }

        cx.op(&opcodes::RETSUB)
    }
}
