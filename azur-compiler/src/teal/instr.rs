// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Symbolic TEAL instructions and their assembly text.

use super::opcodes::Opcode;
use crate::metrics::CompilerMetrics;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Uint(u64),
    Bytes(Vec<u8>),
    Label(String),
    /// Named transaction or global field.
    Field(&'static str),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Uint(v) => write!(f, "{v}"),
            Operand::Bytes(b) => write!(f, "base64({})", STANDARD.encode(b)),
            Operand::Label(l) => f.write_str(l),
            Operand::Field(n) => f.write_str(n),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TealInstruction {
    Opcode {
        op: &'static Opcode,
        operands: Vec<Operand>,
    },
    Label(String),
    Comment(String),
}

impl TealInstruction {
    /// Branch or call target, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            TealInstruction::Opcode { operands, .. } => operands.iter().find_map(|o| match o {
                Operand::Label(l) => Some(l.as_str()),
                _ => None,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for TealInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TealInstruction::Opcode { op, operands } => {
                f.write_str(op.name)?;
                for o in operands {
                    write!(f, " {o}")?;
                }

                Ok(())
            }
            TealInstruction::Label(name) => write!(f, "{name}:"),
            TealInstruction::Comment(text) => write!(f, "//{text}"),
        }
    }
}

/// One entry program.
#[derive(Clone, Debug)]
pub struct CompiledProgram {
    /// Name of the entry function.
    pub entry: String,
    pub teal_version: u8,
    pub instructions: Vec<TealInstruction>,
    pub metrics: CompilerMetrics,
}

impl CompiledProgram {
    pub fn to_assembly(&self) -> String {
        let mut out = format!("#pragma version {}\n", self.teal_version);
        for i in &self.instructions {
            out.push_str(&i.to_string());
            out.push('\n');
        }

        out
    }
}
