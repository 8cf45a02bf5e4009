// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Semantic analysis.
//!
//! Walks the tree once, resolving names through a stack of
//! scopes and inferring a type for every expression. The
//! first violated rule aborts the pass with
//! [`Error::Semantic`], quoting the offending source text.
//! The tree is never modified.

pub mod builtins;
pub mod scope;
pub mod types;

use crate::ast::*;
use crate::teal::{self, opcodes::StackType};
use crate::{Error, Mode};
use builtins::Builtins;
use scope::{Boundary, ScopeStack};
use std::collections::BTreeMap;
use tracing::debug;
use types::{Field, TypeId, TypeTable};

/// Summary of a successful analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Analysis {
    pub entry_points: Vec<String>,
    pub functions: usize,
    /// Local variables declared by a first assignment.
    pub variables: usize,
    /// Stack type of every read of a local or parameter,
    /// keyed by the source offset of the reference.
    pub local_types: BTreeMap<usize, StackType>,
}

#[derive(Clone, Copy, Debug)]
struct Signature {
    arity: usize,
    returns_value: bool,
    builtin: bool,
}

pub fn analyze(program: &Program, mode: Mode, src: &str) -> Result<Analysis, Error> {
    mode.validate()?;

    let mut types = TypeTable::new();
    let builtins = builtins::install_types(&mut types);

    let mut scopes = ScopeStack::new();
    builtins::install_constants(&mut types, &builtins, &mut scopes, mode);

    let mut cx = Analyzer {
        src,
        mode,
        types,
        builtins,
        scopes,
        functions: BTreeMap::new(),
        current: None,
        variables: 0,
        local_types: BTreeMap::new(),
    };

    cx.program(program)?;

    debug!(
        functions = program.functions.len(),
        variables = cx.variables,
        "semantic analysis done"
    );

    Ok(Analysis {
        entry_points: mode.entry_points().into_iter().map(String::from).collect(),
        functions: program.functions.len(),
        variables: cx.variables,
        local_types: cx.local_types,
    })
}

struct Analyzer<'a> {
    src: &'a str,
    mode: Mode,
    types: TypeTable,
    builtins: Builtins,
    scopes: ScopeStack,
    functions: BTreeMap<String, Signature>,
    current: Option<&'a Function>,
    variables: usize,
    local_types: BTreeMap<usize, StackType>,
}

impl<'a> Analyzer<'a> {
    fn program(&mut self, program: &'a Program) -> Result<(), Error> {
        for (name, arity) in builtins::FUNCTIONS {
            self.functions.insert(
                name.to_string(),
                Signature {
                    arity: *arity,
                    returns_value: true,
                    builtin: true,
                },
            );
        }

        for f in &program.functions {
            let sig = Signature {
                arity: f.params.len(),
                returns_value: f.returns_value(),
                builtin: false,
            };

            if self.functions.insert(f.name.clone(), sig).is_some() {
                return Err(self.error(
                    f.span,
                    format!("function `{}` is already defined", f.name),
                ));
            }
        }

        for entry in self.mode.entry_points() {
            let Some(f) = program.function(entry) else {
                return Err(self.error(
                    program.span,
                    format!("missing entry function `{entry}`"),
                ));
            };

            if !f.params.is_empty() {
                return Err(self.error(
                    f.span,
                    format!("entry function `{entry}` cannot take parameters"),
                ));
            }
        }

        for f in &program.functions {
            self.function(f)?;
        }

        Ok(())
    }

    fn function(&mut self, f: &'a Function) -> Result<(), Error> {
        self.current = Some(f);
        self.scopes.push(Boundary::Opaque);

        for p in &f.params {
            if !self.scopes.declare(p, Field::var(TypeTable::ANY)) {
                return Err(self.error(f.span, format!("duplicate parameter `{p}`")));
            }
        }

        self.block(&f.body)?;
        self.scopes.pop();

        Ok(())
    }

    fn block(&mut self, b: &CodeBlock) -> Result<(), Error> {
        self.scopes.push(Boundary::Transparent);

        for instr in &b.instructions {
            self.instruction(instr)?;
        }

        self.scopes.pop();

        Ok(())
    }

    fn instruction(&mut self, instr: &Instruction) -> Result<(), Error> {
        match instr {
            Instruction::If(i) => {
                self.condition(&i.condition)?;
                self.block(&i.then_block)?;
                if let Some(e) = &i.else_block {
                    self.block(e)?;
                }
            }
            Instruction::While(w) => {
                self.condition(&w.condition)?;
                self.block(&w.block)?;
            }
            Instruction::DoWhile(d) => {
                // body locals are gone by the time
                // the condition runs
                self.block(&d.block)?;
                self.condition(&d.condition)?;
            }
            Instruction::Switch(s) => {
                let tested = self.value(&s.tested)?;

                for case in &s.cases {
                    for v in &case.values {
                        let ty = self.value(v)?;
                        if !self.types.is_compatible(ty, tested) {
                            return Err(self.error(
                                v.span(),
                                format!(
                                    "must be of the same type as the tested value `{}`",
                                    self.types.name(tested)
                                ),
                            ));
                        }
                    }

                    self.block(&case.block)?;
                }

                if let Some(d) = &s.default {
                    self.block(d)?;
                }
            }
            Instruction::Return(r) => self.return_instr(r)?,
            Instruction::Expr(e) => {
                self.expr(e)?;
            }
        }

        Ok(())
    }

    fn condition(&mut self, e: &Expr) -> Result<(), Error> {
        let ty = self.value(e)?;
        if !self.types.is_uint64_like(ty) {
            return Err(self.error(
                e.span(),
                format!("condition must be Uint64, found `{}`", self.types.name(ty)),
            ));
        }

        Ok(())
    }

    fn return_instr(&mut self, r: &Return) -> Result<(), Error> {
        let in_entry = self.current.is_some_and(|f| self.is_entry(&f.name));

        match (r.kind, &r.value) {
            (ReturnKind::Throw, Some(Expr::Bytes(_))) => Ok(()),
            (ReturnKind::Throw, _) => Err(self.error(
                r.span,
                "`throw` needs a string or byte list literal",
            )),
            (ReturnKind::Exit, Some(v)) => {
                let ty = self.value(v)?;
                if !self.types.is_uint64_like(ty) {
                    return Err(self.error(v.span(), "`exit` value must be Uint64"));
                }

                Ok(())
            }
            (ReturnKind::Return, Some(v)) => {
                let ty = self.value(v)?;
                if in_entry && !self.types.is_uint64_like(ty) {
                    return Err(self.error(v.span(), "entry function must return Uint64"));
                }

                if !self.types.is_value(ty) {
                    return Err(self.error(
                        v.span(),
                        format!("cannot return a value of type `{}`", self.types.name(ty)),
                    ));
                }

                Ok(())
            }
            (ReturnKind::Return, None) => {
                let returns_value = self.current.is_some_and(|f| f.returns_value());
                if !in_entry && returns_value {
                    return Err(self.error(
                        r.span,
                        "missing return value in a function that returns a value",
                    ));
                }

                Ok(())
            }
            (ReturnKind::Exit, None) => Err(self.error(r.span, "`exit` needs a value")),
        }
    }

    /// Type of an expression whose result is consumed.
    fn value(&mut self, e: &Expr) -> Result<TypeId, Error> {
        let ty = self.expr(e)?;
        if ty == TypeTable::VOID {
            return Err(self.error(e.span(), "function does not return a value"));
        }

        Ok(ty)
    }

    fn expr(&mut self, e: &Expr) -> Result<TypeId, Error> {
        match e {
            Expr::Uint64(_) => Ok(TypeTable::UINT64),
            Expr::Bytes(_) => Ok(TypeTable::BYTES),
            Expr::Unary(u) => {
                let ty = self.value(&u.operand)?;
                match u.op {
                    UnaryOperator::Not if self.types.is_uint64_like(ty) => Ok(TypeTable::UINT64),
                    UnaryOperator::Not => Err(self.error(
                        u.span,
                        "operation `!` can only be done on Uint64",
                    )),
                    UnaryOperator::Complement if self.types.is_basic(ty) => Ok(ty),
                    UnaryOperator::Complement => Err(self.error(
                        u.span,
                        "operation `~` can only be done on Uint64 or Bytes",
                    )),
                }
            }
            Expr::Binary(b) => self.binary(b),
            Expr::Call(c) => self.call(c),
            Expr::Var(v) => {
                let field = self.resolve(v)?;
                if !matches!(v, Variable::Reference(_)) && !teal::is_loadable(v) {
                    return Err(
                        self.error(v.span(), format!("`{v}` cannot be read by a program"))
                    );
                }

                Ok(field.ty)
            }
        }
    }

    fn binary(&mut self, b: &BinaryOp) -> Result<TypeId, Error> {
        use BinaryOperator::*;

        match b.op {
            Assign => self.assign(b),
            Ternary => {
                let Some(arms) = b.right.as_binary(Colon) else {
                    return Err(self.error(b.span, "`?` must be followed by `then : else` arms"));
                };

                self.condition(&b.left)?;

                let then_ty = self.value(&arms.left)?;
                let else_ty = self.value(&arms.right)?;
                if !self.types.is_compatible(then_ty, else_ty) {
                    return Err(self.error(b.span, "ternary arms must have the same type"));
                }

                Ok(if then_ty == TypeTable::ANY {
                    else_ty
                } else {
                    then_ty
                })
            }
            Colon => {
                let from = self.value(&b.left)?;
                let Some(target) = self.type_operand(&b.right) else {
                    return Err(self.error(b.right.span(), "cast target must be a type"));
                };

                let castable = self.types.is_assignable_from(target, from)
                    || self.types.is_assignable_from(from, target)
                    || (self.types.is_value(from) && self.types.is_value(target));
                if !castable {
                    return Err(self.error(
                        b.span,
                        format!("can't cast `{}` to `{}`", b.left, self.types.name(target)),
                    ));
                }

                Ok(target)
            }
            Range | RangeInclusive => Err(self.error(
                b.span,
                format!("range operator `{}` is not supported here", b.op),
            )),
            Eq | Ne if self.type_operand(&b.right).is_some() => {
                let target = self.type_operand(&b.right).unwrap_or(TypeTable::ANY);
                let from = match &*b.left {
                    Expr::Var(v) if teal::is_transaction_path(&b.left) => self.resolve(v)?.ty,
                    _ => {
                        return Err(self.error(
                            b.left.span(),
                            "type test needs `Txn` or `TxnGroup[i]` on the left",
                        ));
                    }
                };

                if teal::fields::txn_type_code(self.types.name(target)).is_none() {
                    return Err(self.error(
                        b.right.span(),
                        format!("`{}` is not a transaction type", self.types.name(target)),
                    ));
                }

                if !self.types.is_assignable_from(from, target)
                    && !self.types.is_assignable_from(target, from)
                {
                    return Err(self.error(
                        b.span,
                        format!("can't compare `{}` with type `{}`", b.left, self.types.name(target)),
                    ));
                }

                Ok(TypeTable::UINT64)
            }
            op => {
                let left = self.value(&b.left)?;
                let right = self.value(&b.right)?;

                if matches!(op, And | Or | Pow | Shl | Shr)
                    && !(self.types.is_uint64_like(left) && self.types.is_uint64_like(right))
                {
                    return Err(self.error(
                        b.span,
                        format!("operator `{op}` needs Uint64 operands"),
                    ));
                }

                if !self.types.is_value(left) || !self.types.is_value(right) {
                    return Err(self.error(b.span, "can't operate on non-basic type operands"));
                }

                if !self.types.is_compatible(left, right) {
                    return Err(self.error(
                        b.span,
                        format!(
                            "can't operate on different type operands `{}` and `{}`",
                            self.types.name(left),
                            self.types.name(right)
                        ),
                    ));
                }

                if op.is_comparison() || op.is_logical() {
                    Ok(TypeTable::UINT64)
                } else {
                    Ok(left)
                }
            }
        }
    }

    fn assign(&mut self, b: &BinaryOp) -> Result<TypeId, Error> {
        let Expr::Var(target) = &*b.left else {
            return Err(self.error(b.span, "left part is not assignable"));
        };

        let Variable::Reference(r) = target else {
            return Err(self.error(
                b.span,
                "assignment through member or array access is not supported",
            ));
        };

        match self.scopes.lookup(&r.name) {
            None => {
                let ty = self.value(&b.right)?;
                if !self.types.is_value(ty) {
                    return Err(self.error(
                        b.span,
                        format!("can't store a value of type `{}` in `{}`", self.types.name(ty), r.name),
                    ));
                }

                self.scopes.declare(&r.name, Field::var(ty));
                self.variables += 1;

                Ok(ty)
            }
            Some(field) => {
                if field.const_reference || field.const_members {
                    return Err(self.error(b.span, format!("`{}` is not assignable", r.name)));
                }

                let ty = self.value(&b.right)?;
                if !self.types.is_compatible(field.ty, ty) {
                    return Err(self.error(
                        b.span,
                        format!(
                            "can't assign `{}` to `{}` of type `{}`",
                            self.types.name(ty),
                            r.name,
                            self.types.name(field.ty)
                        ),
                    ));
                }

                Ok(field.ty)
            }
        }
    }

    fn call(&mut self, c: &Call) -> Result<TypeId, Error> {
        let name = &c.function.name;
        let Some(sig) = self.functions.get(name).copied() else {
            return Err(self.error(c.span, format!("unknown function `{name}`")));
        };

        if self.is_entry(name) {
            return Err(self.error(c.span, format!("entry function `{name}` cannot be called")));
        }

        if c.args.len() != sig.arity {
            return Err(self.error(
                c.span,
                format!(
                    "wrong number of arguments: `{name}` takes {}, got {}",
                    sig.arity,
                    c.args.len()
                ),
            ));
        }

        if sig.builtin {
            return self.hash_call(c);
        }

        for arg in &c.args {
            let ty = self.value(arg)?;
            if !self.types.is_value(ty) {
                return Err(self.error(
                    arg.span(),
                    format!("can't pass a value of type `{}`", self.types.name(ty)),
                ));
            }
        }

        Ok(if sig.returns_value {
            TypeTable::ANY
        } else {
            TypeTable::VOID
        })
    }

    fn hash_call(&mut self, c: &Call) -> Result<TypeId, Error> {
        let text = self.value(&c.args[0])?;
        if !self.types.is_basic(text) {
            return Err(self.error(c.args[0].span(), "`Hash` input must be Uint64 or Bytes"));
        }

        let algo = c.args[1]
            .as_reference()
            .and_then(|r| self.scopes.lookup(&r.name))
            .map(|f| f.ty);
        if algo != Some(self.builtins.hash) {
            return Err(self.error(
                c.args[1].span(),
                "second argument of `Hash` must be one of SHA256, Keccak256, SHA512_256",
            ));
        }

        Ok(TypeTable::BYTES)
    }

    fn resolve(&mut self, v: &Variable) -> Result<Field, Error> {
        match v {
            Variable::Reference(r) => {
                let field = self.scopes.lookup(&r.name).ok_or_else(|| {
                    self.error(r.span, format!("`{}` is not declared before first use", r.name))
                })?;

                if !field.const_reference {
                    let ty = self.stack_type(field.ty);
                    self.local_types.insert(r.span.start(), ty);
                }

                Ok(field)
            }
            Variable::MemberAccess(m) => {
                let owner = self.resolve(&m.owner)?;
                let Some(field) = self.types.member(owner.ty, &m.member.name) else {
                    return Err(self.error(
                        m.span,
                        format!(
                            "`{}` is not part of `{}`",
                            m.member.name,
                            self.types.name(owner.ty)
                        ),
                    ));
                };

                Ok(Field {
                    ty: field.ty,
                    const_reference: field.const_reference || owner.const_members,
                    const_members: field.const_members || owner.const_members,
                })
            }
            Variable::ArrayAccess(a) => {
                let base = self.resolve(&a.base)?;
                let Some(acc) = self.types.accessor(base.ty).cloned() else {
                    return Err(self.error(
                        a.span,
                        format!("`{}` doesn't have a [] accessor", self.types.name(base.ty)),
                    ));
                };

                let index = self.value(&a.index)?;
                if !self.types.is_compatible(index, acc.index)
                    && !self.types.is_assignable_from(acc.index, index)
                {
                    return Err(self.error(
                        a.index.span(),
                        format!("index of `{}` must be `{}`", self.types.name(base.ty), self.types.name(acc.index)),
                    ));
                }

                Ok(Field {
                    ty: acc.element.ty,
                    const_reference: acc.element.const_reference || base.const_members,
                    const_members: acc.element.const_members || base.const_members,
                })
            }
        }
    }

    /// The named type when `e` is a bare type-name constant.
    fn type_operand(&self, e: &Expr) -> Option<TypeId> {
        let r = e.as_reference()?;
        let field = self.scopes.lookup(&r.name)?;
        if field.ty != TypeTable::TYPE {
            return None;
        }

        self.types.lookup(&r.name)
    }

    /// How a value of `ty` sits on the stack.
    fn stack_type(&self, ty: TypeId) -> StackType {
        match ty {
            TypeTable::UINT64 => StackType::Uint64,
            TypeTable::BYTES => StackType::Bytes,
            t if self.types.is_enum(t) => StackType::Uint64,
            _ => StackType::Any,
        }
    }

    fn is_entry(&self, name: &str) -> bool {
        self.mode.entry_points().contains(&name)
    }

    fn error(&self, span: Span, message: impl Into<String>) -> Error {
        Error::semantic(self.src, span, message)
    }
}
