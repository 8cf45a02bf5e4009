// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

use super::builder::TealBuilder;
use super::instr::Operand;
use super::opcodes::{self, Opcode, StackType};
use crate::ast::Program;
use crate::semantic::builtins::{self, Builtins};
use crate::semantic::types::TypeTable;
use crate::{Error, Mode};
use std::collections::BTreeMap;
use std::ops::BitOr;

/// Generation flags: the entry program being
/// built and whether the main function is current.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    pub const APPROVAL: Flags = Flags(1);
    pub const CLEAR_STATE: Flags = Flags(2);
    pub const SIGNATURE: Flags = Flags(4);
    pub const MAIN_FUNCTION: Flags = Flags(8);

    pub fn for_entry(mode: Mode) -> Self {
        if mode.contains(Mode::APPROVAL) {
            Flags::APPROVAL
        } else if mode.contains(Mode::CLEAR_STATE) {
            Flags::CLEAR_STATE
        } else {
            Flags::SIGNATURE
        }
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn without(self, other: Flags) -> Flags {
        Flags(self.0 & !other.0)
    }

    pub fn is_application(self) -> bool {
        self.contains(Flags::APPROVAL) || self.contains(Flags::CLEAR_STATE)
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Stack slot owned by a local variable or parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    /// Stack depth right after the slot was pushed.
    pub pos: usize,
    /// Joined type of every value stored so far;
    /// `None` while only the placeholder is there.
    pub ty: Option<StackType>,
}

#[derive(Debug)]
struct Frame {
    base: usize,
    names: Vec<String>,
}

#[derive(Debug)]
pub struct LowerCtx<'a> {
    pub builder: &'a mut TealBuilder,
    pub program: &'a Program,
    pub flags: Flags,

    /// Types the analyzer inferred for reads of
    /// locals, by source offset.
    local_types: &'a BTreeMap<usize, StackType>,

    /// Type names and enum values, for casts
    /// and enum constants.
    pub types: TypeTable,
    pub builtins: Builtins,

    slots: BTreeMap<String, Slot>,
    frames: Vec<Frame>,
    ctx_stack: Vec<&'a str>,
    failed_at: Option<String>,
}

impl<'a> LowerCtx<'a> {
    pub fn new(
        builder: &'a mut TealBuilder,
        program: &'a Program,
        local_types: &'a BTreeMap<usize, StackType>,
        flags: Flags,
    ) -> Self {
        let mut types = TypeTable::new();
        let builtins = builtins::install_types(&mut types);

        Self {
            builder,
            program,
            flags,
            local_types,
            types,
            builtins,
            slots: BTreeMap::new(),
            frames: Vec::new(),
            ctx_stack: Vec::new(),
            failed_at: None,
        }
    }

    /// Fresh abstract stack holding only the parameters.
    pub fn start_function(&mut self, params: &[String], main: bool) {
        self.slots.clear();
        self.frames.clear();

        self.flags = if main {
            self.flags | Flags::MAIN_FUNCTION
        } else {
            self.flags.without(Flags::MAIN_FUNCTION)
        };

        self.builder.restore(vec![StackType::Any; params.len()]);
        for (i, p) in params.iter().enumerate() {
            self.slots.insert(
                p.clone(),
                Slot {
                    pos: i + 1,
                    ty: Some(StackType::Any),
                },
            );
        }
    }

    pub fn op(&mut self, op: &'static Opcode) -> Result<(), Error> {
        self.builder.push(op, Vec::new())
    }

    pub fn op_with(&mut self, op: &'static Opcode, operands: Vec<Operand>) -> Result<(), Error> {
        self.builder.push(op, operands)
    }

    pub fn push_uint(&mut self, v: u64) -> Result<(), Error> {
        self.builder.push(&opcodes::PUSHINT, vec![Operand::Uint(v)])
    }

    pub fn is_main(&self) -> bool {
        self.flags.contains(Flags::MAIN_FUNCTION)
    }

    pub fn slot(&self, name: &str) -> Option<Slot> {
        self.slots.get(name).copied()
    }

    /// Type of the value read at `offset`. The analyzer
    /// tells apart same-named locals of different blocks
    /// that end up sharing one slot, so its answer wins
    /// over the slot's joined type.
    pub fn read_type(&self, offset: usize, slot: Slot) -> Option<StackType> {
        match self.local_types.get(&offset) {
            Some(StackType::Any) | None => slot.ty,
            Some(t) => Some(*t),
        }
    }

    /// Reserves a slot for `name` with a `pushint 0`.
    pub fn declare(&mut self, name: &str) -> Result<(), Error> {
        self.push_uint(0)?;
        self.builder.metrics_mut().inc_placeholders();

        let slot = Slot {
            pos: self.builder.depth(),
            ty: None,
        };
        self.slots.insert(name.to_string(), slot);

        if let Some(frame) = self.frames.last_mut() {
            frame.names.push(name.to_string());
        }

        Ok(())
    }

    pub fn note_store(&mut self, name: &str, ty: StackType) {
        if let Some(slot) = self.slots.get_mut(name) {
            slot.ty = Some(match slot.ty {
                None => ty,
                Some(prev) if prev == ty => prev,
                Some(_) => StackType::Any,
            });
        }
    }

    pub fn enter_block(&mut self) {
        self.frames.push(Frame {
            base: self.builder.depth(),
            names: Vec::new(),
        });
    }

    /// Releases the block's locals. On a path that
    /// already ended nothing is emitted.
    pub fn leave_block(&mut self, terminated: bool) -> Result<(), Error> {
        let Some(frame) = self.frames.pop() else {
            return Err(Error::compilation("block frame underflow"));
        };

        for name in &frame.names {
            self.slots.remove(name);
        }

        if terminated {
            self.builder.forget(frame.base);
            return Ok(());
        }

        let expected = frame.base + frame.names.len();
        if self.builder.depth() != expected {
            return Err(Error::compilation(format!(
                "unbalanced block: depth {} but {expected} expected",
                self.builder.depth()
            )));
        }

        for _ in &frame.names {
            self.op(&opcodes::POP)?;
        }

        Ok(())
    }

    /// Index of an enum constant such as `NoOp`.
    pub fn enum_value(&self, name: &str) -> Option<u64> {
        let mut tables = vec![builtins::HASH_VALUES];
        if self.flags.is_application() {
            tables.push(builtins::ON_COMPLETE_VALUES);
        }

        tables
            .into_iter()
            .find_map(|t| t.iter().position(|v| *v == name))
            .map(|i| i as u64)
    }

    pub fn with_ctx<F, T>(&mut self, label: &'a str, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut LowerCtx<'a>) -> Result<T, Error>,
    {
        self.ctx_stack.push(label);

        let res = f(self);
        if res.is_err() && self.failed_at.is_none() {
            // innermost context wins
            self.failed_at = Some(self.format_ctx());
        }

        self.ctx_stack.pop();

        res
    }

    pub fn format_ctx(&self) -> String {
        if self.ctx_stack.is_empty() {
            "(root)".to_string()
        } else {
            self.ctx_stack.join(" -> ")
        }
    }

    /// Adds the lowering position recorded by
    /// [`Self::with_ctx`] to a generation error.
    pub fn annotate(&self, e: Error) -> Error {
        match (e, &self.failed_at) {
            (Error::Compilation(msg), Some(at)) => Error::Compilation(format!("{msg} (in {at})")),
            (e, _) => e,
        }
    }
}
