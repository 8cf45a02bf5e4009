// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Instruction stream builder.
//!
//! [`TealBuilder`] appends instructions and simulates the
//! evaluation stack as a list of [`StackType`]s. Every
//! opcode is checked against the target version, the run
//! mode and the types it pops, so a lowering bug surfaces
//! as [`Error::Compilation`] instead of a broken program.

use super::instr::{CompiledProgram, Operand, TealInstruction};
use super::opcodes::{Opcode, RunMode, StackType};
use crate::metrics::CompilerMetrics;
use crate::{Error, Mode};
use std::collections::BTreeSet;
use tracing::trace;

#[derive(Debug)]
pub struct TealBuilder {
    out: Vec<TealInstruction>,
    stack: Vec<StackType>,
    version: u8,
    mode: Mode,
    metrics: CompilerMetrics,
    next_label: u32,
}

impl TealBuilder {
    pub fn new(version: u8, mode: Mode) -> Self {
        Self {
            out: Vec::new(),
            stack: Vec::new(),
            version,
            mode,
            metrics: CompilerMetrics::default(),
            next_label: 0,
        }
    }

    pub fn push(&mut self, op: &'static Opcode, operands: Vec<Operand>) -> Result<(), Error> {
        let cost = op.cost_at(self.version).ok_or_else(|| {
            Error::compilation(format!(
                "`{}` is not available in TEAL v{}",
                op.name, self.version
            ))
        })?;

        match op.mode {
            RunMode::Signature if !self.mode.contains(Mode::SIGNATURE) => {
                return Err(Error::compilation(format!(
                    "`{}` is only available in signature mode",
                    op.name
                )));
            }
            RunMode::Application if !self.mode.is_application() => {
                return Err(Error::compilation(format!(
                    "`{}` is only available in application mode",
                    op.name
                )));
            }
            _ => {}
        }

        if operands.len() != op.params.len() {
            return Err(Error::compilation(format!(
                "`{}` takes {} operand(s), got {}",
                op.name,
                op.params.len(),
                operands.len()
            )));
        }

        self.apply(op, &operands)?;

        self.metrics.inc_ops(cost);
        self.metrics.set_cur_depth(self.stack.len() as u32);

        trace!(op = op.name, depth = self.stack.len(), "emit");

        self.out.push(TealInstruction::Opcode { op, operands });

        Ok(())
    }

    fn apply(&mut self, op: &'static Opcode, operands: &[Operand]) -> Result<(), Error> {
        match op.name {
            "dup" => {
                let t = self.peek(op, 0)?;
                self.stack.push(t);
            }
            "dup2" => {
                let a = self.peek(op, 1)?;
                let b = self.peek(op, 0)?;
                self.stack.extend([a, b]);
            }
            "dig" => {
                let n = uint_operand(op, operands)?;
                let t = self.peek(op, n)?;
                self.stack.push(t);
            }
            "swap" => {
                self.peek(op, 1)?;
                let len = self.stack.len();
                self.stack.swap(len - 1, len - 2);
            }
            "cover" => {
                let n = uint_operand(op, operands)?;
                self.peek(op, n)?;
                if let Some(t) = self.stack.pop() {
                    let at = self.stack.len() - n;
                    self.stack.insert(at, t);
                }
            }
            "uncover" => {
                let n = uint_operand(op, operands)?;
                self.peek(op, n)?;
                let t = self.stack.remove(self.stack.len() - 1 - n);
                self.stack.push(t);
            }
            _ => {
                let k = op.pops.len();
                if self.stack.len() < k {
                    return Err(self.underflow(op, k));
                }

                let base = self.stack.len() - k;
                for (i, want) in op.pops.iter().enumerate() {
                    let have = self.stack[base + i];
                    if !want.matches(have) {
                        return Err(Error::compilation(format!(
                            "`{}` expects {want} in operand {}, found {have}",
                            op.name,
                            i + 1
                        )));
                    }
                }

                self.stack.truncate(base);
                self.stack.extend_from_slice(op.pushes);
            }
        }

        Ok(())
    }

    /// Type at `depth` below the top.
    fn peek(&self, op: &Opcode, depth: usize) -> Result<StackType, Error> {
        self.type_at(depth).ok_or_else(|| self.underflow(op, depth + 1))
    }

    fn underflow(&self, op: &Opcode, need: usize) -> Error {
        Error::compilation(format!(
            "stack underflow at `{}`: needs {need}, has {}",
            op.name,
            self.stack.len()
        ))
    }

    pub fn label(&mut self, name: impl Into<String>) {
        self.metrics.inc_labels();
        self.out.push(TealInstruction::Label(name.into()));
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        self.out.push(TealInstruction::Comment(text.into()));
    }

    /// Unique within one compiled program.
    pub fn fresh_label(&mut self, prefix: &str) -> String {
        let n = self.next_label;
        self.next_label += 1;

        format!("__{prefix}__{n}")
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn type_at(&self, depth: usize) -> Option<StackType> {
        let len = self.stack.len();
        if depth >= len {
            return None;
        }

        Some(self.stack[len - 1 - depth])
    }

    pub fn top(&self) -> Option<StackType> {
        self.type_at(0)
    }

    /// Narrows or widens the type of the top slot.
    pub fn retype_top(&mut self, ty: StackType) {
        if let Some(t) = self.stack.last_mut() {
            *t = ty;
        }
    }

    /// Applies the effect of a `callsub` on the caller's
    /// stack: the arguments go, the result (if any) comes.
    pub fn call_effect(&mut self, args: usize, returns_value: bool) -> Result<(), Error> {
        if self.stack.len() < args {
            return Err(Error::compilation(format!(
                "stack underflow at call: needs {args}, has {}",
                self.stack.len()
            )));
        }

        self.stack.truncate(self.stack.len() - args);
        if returns_value {
            self.stack.push(StackType::Any);
        }

        self.metrics.set_cur_depth(self.stack.len() as u32);

        Ok(())
    }

    pub fn snapshot(&self) -> Vec<StackType> {
        self.stack.clone()
    }

    pub fn restore(&mut self, stack: Vec<StackType>) {
        self.stack = stack;
    }

    /// Joins two control flow paths that reach the same
    /// label. Slots whose types differ become `Any`.
    pub fn merge(&mut self, other: &[StackType]) -> Result<(), Error> {
        if other.len() != self.stack.len() {
            return Err(Error::compilation(format!(
                "unbalanced branches: depth {} vs {}",
                self.stack.len(),
                other.len()
            )));
        }

        for (mine, theirs) in self.stack.iter_mut().zip(other) {
            if *mine != *theirs {
                *mine = StackType::Any;
            }
        }

        Ok(())
    }

    /// Discards slots without emitting code, used
    /// after the path has already ended.
    pub fn forget(&mut self, depth: usize) {
        self.stack.truncate(depth);
    }

    pub fn metrics_mut(&mut self) -> &mut CompilerMetrics {
        &mut self.metrics
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn finalize(self, entry: &str) -> Result<CompiledProgram, Error> {
        let mut defined = BTreeSet::new();
        for i in &self.out {
            if let TealInstruction::Label(name) = i {
                if !defined.insert(name.as_str()) {
                    return Err(Error::compilation(format!("label `{name}` is defined twice")));
                }
            }
        }

        for i in &self.out {
            if let Some(target) = i.target() {
                if !defined.contains(target) {
                    return Err(Error::compilation(format!("undefined label `{target}`")));
                }
            }
        }

        Ok(CompiledProgram {
            entry: entry.to_string(),
            teal_version: self.version,
            instructions: self.out,
            metrics: self.metrics,
        })
    }
}

fn uint_operand(op: &Opcode, operands: &[Operand]) -> Result<usize, Error> {
    match operands.first() {
        Some(Operand::Uint(n)) => usize::try_from(*n)
            .map_err(|_| Error::compilation(format!("`{}` operand out of range", op.name))),
        _ => Err(Error::compilation(format!(
            "`{}` needs an integer operand",
            op.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teal::opcodes::*;

    fn builder() -> TealBuilder {
        TealBuilder::new(5, Mode::APPROVAL)
    }

    #[test]
    fn cover_and_uncover_permute_exactly() {
        let mut b = builder();
        b.push(&PUSHINT, vec![Operand::Uint(1)]).unwrap();
        b.push(&PUSHBYTES, vec![Operand::Bytes(vec![1])]).unwrap();
        b.push(&PUSHINT, vec![Operand::Uint(2)]).unwrap();

        b.push(&COVER, vec![Operand::Uint(2)]).unwrap();
        assert_eq!(
            b.snapshot(),
            [StackType::Uint64, StackType::Uint64, StackType::Bytes]
        );

        b.push(&UNCOVER, vec![Operand::Uint(1)]).unwrap();
        assert_eq!(
            b.snapshot(),
            [StackType::Uint64, StackType::Bytes, StackType::Uint64]
        );
    }

    #[test]
    fn pops_are_type_checked() {
        let mut b = builder();
        b.push(&PUSHBYTES, vec![Operand::Bytes(vec![])]).unwrap();
        b.push(&PUSHINT, vec![Operand::Uint(1)]).unwrap();

        let err = b.push(&ADD, vec![]).unwrap_err();
        assert!(err.to_string().contains("expects uint64"), "{err}");
    }

    #[test]
    fn version_and_mode_are_enforced() {
        let mut old = TealBuilder::new(4, Mode::APPROVAL);
        old.push(&PUSHINT, vec![Operand::Uint(1)]).unwrap();
        let err = old.push(&COVER, vec![Operand::Uint(0)]).unwrap_err();
        assert!(err.to_string().contains("not available in TEAL v4"), "{err}");

        let mut sig = TealBuilder::new(5, Mode::SIGNATURE);
        sig.push(&PUSHBYTES, vec![Operand::Bytes(vec![])]).unwrap();
        let err = sig.push(&LOG, vec![]).unwrap_err();
        assert!(err.to_string().contains("application mode"), "{err}");
    }

    #[test]
    fn finalize_rejects_dangling_branch() {
        let mut b = builder();
        b.push(&BRANCH, vec![Operand::Label("nowhere".into())]).unwrap();

        let err = b.finalize("ApprovalProgram").unwrap_err();
        assert!(err.to_string().contains("undefined label `nowhere`"), "{err}");
    }

    #[test]
    fn fresh_labels_count_up() {
        let mut b = builder();
        assert_eq!(b.fresh_label("if_end"), "__if_end__0");
        assert_eq!(b.fresh_label("while_start"), "__while_start__1");
    }
}
