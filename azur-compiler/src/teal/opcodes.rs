// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! TEAL opcode table.
//!
//! Costs are listed per TEAL version 1..=5; a negative cost
//! means the opcode does not exist in that version. `pops`
//! and `pushes` are ordered bottom to top.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StackType {
    Uint64,
    Bytes,
    Any,
}

impl StackType {
    /// `Any` matches every type on either side.
    pub fn matches(self, other: StackType) -> bool {
        self == StackType::Any || other == StackType::Any || self == other
    }
}

impl fmt::Display for StackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StackType::Uint64 => "uint64",
            StackType::Bytes => "bytes",
            StackType::Any => "any",
        };

        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Uint,
    Bytes,
    Label,
    Field,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Any,
    Signature,
    Application,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Opcode {
    pub code: u8,
    pub name: &'static str,
    pub cost: [i16; 5],
    pub pops: &'static [StackType],
    pub pushes: &'static [StackType],
    pub params: &'static [ParamKind],
    pub mode: RunMode,
}

impl Opcode {
    pub fn cost_at(&self, version: u8) -> Option<u64> {
        let idx = usize::from(version).checked_sub(1)?;
        let c = *self.cost.get(idx)?;

        u64::try_from(c).ok()
    }

    pub fn is_available(&self, version: u8) -> bool {
        self.cost_at(version).is_some()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

use ParamKind as P;
use StackType::{Any as A, Bytes as B, Uint64 as U};

const V1: [i16; 5] = [1, 1, 1, 1, 1];
const V2: [i16; 5] = [-1, 1, 1, 1, 1];
const V3: [i16; 5] = [-1, -1, 1, 1, 1];
const V4: [i16; 5] = [-1, -1, -1, 1, 1];
const V5: [i16; 5] = [-1, -1, -1, -1, 1];

const fn op(
    code: u8,
    name: &'static str,
    cost: [i16; 5],
    pops: &'static [StackType],
    pushes: &'static [StackType],
) -> Opcode {
    Opcode {
        code,
        name,
        cost,
        pops,
        pushes,
        params: &[],
        mode: RunMode::Any,
    }
}

const fn with(
    base: Opcode,
    params: &'static [ParamKind],
    mode: RunMode,
) -> Opcode {
    Opcode {
        params,
        mode,
        ..base
    }
}

pub const ERR: Opcode = op(0x00, "err", V1, &[], &[]);
pub const SHA256: Opcode = op(0x01, "sha256", [7, 35, 35, 35, 35], &[B], &[B]);
pub const KECCAK256: Opcode = op(0x02, "keccak256", [26, 130, 130, 130, 130], &[B], &[B]);
pub const SHA512_256: Opcode = op(0x03, "sha512_256", [9, 45, 45, 45, 45], &[B], &[B]);

pub const ADD: Opcode = op(0x08, "+", V1, &[U, U], &[U]);
pub const SUB: Opcode = op(0x09, "-", V1, &[U, U], &[U]);
pub const DIV: Opcode = op(0x0a, "/", V1, &[U, U], &[U]);
pub const MUL: Opcode = op(0x0b, "*", V1, &[U, U], &[U]);
pub const LT: Opcode = op(0x0c, "<", V1, &[U, U], &[U]);
pub const GT: Opcode = op(0x0d, ">", V1, &[U, U], &[U]);
pub const LE: Opcode = op(0x0e, "<=", V1, &[U, U], &[U]);
pub const GE: Opcode = op(0x0f, ">=", V1, &[U, U], &[U]);
pub const AND: Opcode = op(0x10, "&&", V1, &[U, U], &[U]);
pub const OR: Opcode = op(0x11, "||", V1, &[U, U], &[U]);
pub const EQ: Opcode = op(0x12, "==", V1, &[A, A], &[U]);
pub const NE: Opcode = op(0x13, "!=", V1, &[A, A], &[U]);
pub const NOT: Opcode = op(0x14, "!", V1, &[U], &[U]);
pub const LEN: Opcode = op(0x15, "len", V1, &[B], &[U]);
pub const ITOB: Opcode = op(0x16, "itob", V1, &[U], &[B]);
pub const BTOI: Opcode = op(0x17, "btoi", V1, &[B], &[U]);
pub const MOD: Opcode = op(0x18, "%", V1, &[U, U], &[U]);
pub const BIT_OR: Opcode = op(0x19, "|", V1, &[U, U], &[U]);
pub const BIT_AND: Opcode = op(0x1a, "&", V1, &[U, U], &[U]);
pub const BIT_XOR: Opcode = op(0x1b, "^", V1, &[U, U], &[U]);
pub const BIT_NOT: Opcode = op(0x1c, "~", V1, &[U], &[U]);

pub const ARG: Opcode = with(op(0x2c, "arg", V1, &[], &[B]), &[P::Uint], RunMode::Signature);
pub const TXN: Opcode = with(op(0x31, "txn", V1, &[], &[A]), &[P::Field], RunMode::Any);
pub const GLOBAL: Opcode = with(op(0x32, "global", V1, &[], &[A]), &[P::Field], RunMode::Any);
pub const GTXN: Opcode = with(
    op(0x33, "gtxn", V1, &[], &[A]),
    &[P::Uint, P::Field],
    RunMode::Any,
);
pub const LOAD: Opcode = with(op(0x34, "load", V1, &[], &[A]), &[P::Uint], RunMode::Any);
pub const TXNA: Opcode = with(
    op(0x36, "txna", V2, &[], &[A]),
    &[P::Field, P::Uint],
    RunMode::Any,
);
pub const GTXNS: Opcode = with(op(0x38, "gtxns", V3, &[U], &[A]), &[P::Field], RunMode::Any);
pub const LOADS: Opcode = op(0x3e, "loads", V5, &[U], &[A]);

pub const BNZ: Opcode = with(op(0x40, "bnz", V1, &[U], &[]), &[P::Label], RunMode::Any);
pub const BZ: Opcode = with(op(0x41, "bz", V2, &[U], &[]), &[P::Label], RunMode::Any);
pub const BRANCH: Opcode = with(op(0x42, "b", V2, &[], &[]), &[P::Label], RunMode::Any);
pub const RETURN: Opcode = op(0x43, "return", V2, &[U], &[]);
pub const ASSERT: Opcode = op(0x44, "assert", V3, &[U], &[]);
pub const POP: Opcode = op(0x48, "pop", V1, &[A], &[]);
pub const DUP: Opcode = op(0x49, "dup", V1, &[A], &[A, A]);
pub const DUP2: Opcode = op(0x4a, "dup2", V2, &[A, A], &[A, A, A, A]);
pub const DIG: Opcode = with(op(0x4b, "dig", V3, &[], &[A]), &[P::Uint], RunMode::Any);
pub const SWAP: Opcode = op(0x4c, "swap", V3, &[A, A], &[A, A]);
pub const SELECT: Opcode = op(0x4d, "select", V3, &[A, A, U], &[A]);
pub const COVER: Opcode = with(op(0x4e, "cover", V5, &[A], &[A]), &[P::Uint], RunMode::Any);
pub const UNCOVER: Opcode = with(op(0x4f, "uncover", V5, &[], &[A]), &[P::Uint], RunMode::Any);
pub const CONCAT: Opcode = op(0x50, "concat", V2, &[B, B], &[B]);

pub const BALANCE: Opcode = with(op(0x60, "balance", V2, &[A], &[U]), &[], RunMode::Application);
pub const MIN_BALANCE: Opcode = with(
    op(0x78, "min_balance", V3, &[A], &[U]),
    &[],
    RunMode::Application,
);

pub const PUSHBYTES: Opcode = with(op(0x80, "pushbytes", V3, &[], &[B]), &[P::Bytes], RunMode::Any);
pub const PUSHINT: Opcode = with(op(0x81, "pushint", V3, &[], &[U]), &[P::Uint], RunMode::Any);
pub const CALLSUB: Opcode = with(op(0x88, "callsub", V4, &[], &[]), &[P::Label], RunMode::Any);
pub const RETSUB: Opcode = op(0x89, "retsub", V4, &[], &[]);

pub const SHL: Opcode = op(0x90, "shl", V4, &[U, U], &[U]);
pub const SHR: Opcode = op(0x91, "shr", V4, &[U, U], &[U]);
pub const SQRT: Opcode = op(0x92, "sqrt", [-1, -1, -1, 4, 4], &[U], &[U]);
pub const BITLEN: Opcode = op(0x93, "bitlen", V4, &[A], &[U]);
pub const EXP: Opcode = op(0x94, "exp", V4, &[U, U], &[U]);

pub const B_ADD: Opcode = op(0xa0, "b+", [-1, -1, -1, 10, 10], &[B, B], &[B]);
pub const B_SUB: Opcode = op(0xa1, "b-", [-1, -1, -1, 10, 10], &[B, B], &[B]);
pub const B_DIV: Opcode = op(0xa2, "b/", [-1, -1, -1, 20, 20], &[B, B], &[B]);
pub const B_MUL: Opcode = op(0xa3, "b*", [-1, -1, -1, 20, 20], &[B, B], &[B]);
pub const B_LT: Opcode = op(0xa4, "b<", V4, &[B, B], &[U]);
pub const B_GT: Opcode = op(0xa5, "b>", V4, &[B, B], &[U]);
pub const B_LE: Opcode = op(0xa6, "b<=", V4, &[B, B], &[U]);
pub const B_GE: Opcode = op(0xa7, "b>=", V4, &[B, B], &[U]);
pub const B_EQ: Opcode = op(0xa8, "b==", V4, &[B, B], &[U]);
pub const B_NE: Opcode = op(0xa9, "b!=", V4, &[B, B], &[U]);
pub const B_MOD: Opcode = op(0xaa, "b%", [-1, -1, -1, 20, 20], &[B, B], &[B]);
pub const B_OR: Opcode = op(0xab, "b|", [-1, -1, -1, 6, 6], &[B, B], &[B]);
pub const B_AND: Opcode = op(0xac, "b&", [-1, -1, -1, 6, 6], &[B, B], &[B]);
pub const B_XOR: Opcode = op(0xad, "b^", [-1, -1, -1, 6, 6], &[B, B], &[B]);
pub const B_NOT: Opcode = op(0xae, "b~", [-1, -1, -1, 4, 4], &[B], &[B]);
pub const BZERO: Opcode = op(0xaf, "bzero", V4, &[U], &[B]);

pub const LOG: Opcode = with(op(0xb0, "log", V5, &[B], &[]), &[], RunMode::Application);
pub const TXNAS: Opcode = with(op(0xc0, "txnas", V5, &[U], &[A]), &[P::Field], RunMode::Any);
pub const ARGS: Opcode = with(op(0xc3, "args", V5, &[U], &[B]), &[], RunMode::Signature);

pub const ALL: &[&Opcode] = &[
    &ERR, &SHA256, &KECCAK256, &SHA512_256, &ADD, &SUB, &DIV, &MUL, &LT, &GT, &LE, &GE, &AND,
    &OR, &EQ, &NE, &NOT, &LEN, &ITOB, &BTOI, &MOD, &BIT_OR, &BIT_AND, &BIT_XOR, &BIT_NOT, &ARG,
    &TXN, &GLOBAL, &GTXN, &LOAD, &TXNA, &GTXNS, &LOADS, &BNZ, &BZ, &BRANCH, &RETURN, &ASSERT,
    &POP, &DUP, &DUP2, &DIG, &SWAP, &SELECT, &COVER, &UNCOVER, &CONCAT, &BALANCE, &MIN_BALANCE,
    &PUSHBYTES, &PUSHINT, &CALLSUB, &RETSUB, &SHL, &SHR, &SQRT, &BITLEN, &EXP, &B_ADD, &B_SUB,
    &B_DIV, &B_MUL, &B_LT, &B_GT, &B_LE, &B_GE, &B_EQ, &B_NE, &B_MOD, &B_OR, &B_AND, &B_XOR,
    &B_NOT, &BZERO, &LOG, &TXNAS, &ARGS,
];

pub fn by_name(name: &str) -> Option<&'static Opcode> {
    ALL.iter().copied().find(|o| o.name == name)
}
