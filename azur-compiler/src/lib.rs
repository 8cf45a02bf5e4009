// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Compiler for the Azur contract language.
//!
//! Source text is preprocessed (`#define`), lexed, parsed,
//! checked by the semantic analyzer and lowered into
//! symbolic TEAL instructions. Nothing here assembles
//! bytecode; [`CompiledProgram::to_assembly`] renders the
//! instruction list as TEAL assembly text.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod semantic;
pub mod teal;

mod metrics;

pub use lexer::{Position, Token, TokenKind};
pub use metrics::CompilerMetrics;
pub use semantic::Analysis;
pub use teal::{CompiledProgram, Operand, TealInstruction};

use crate::ast::Span;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, instrument};

pub const MAX_TOKENS: usize = 200_000;
pub const MAX_PARSE_DEPTH: usize = 256;

pub const DEFAULT_TEAL_VERSION: u8 = 5;
pub const MAX_TEAL_VERSION: u8 = 5;

pub const APPROVAL_ENTRY: &str = "ApprovalProgram";
pub const CLEAR_STATE_ENTRY: &str = "ClearStateProgram";
pub const SIGNATURE_ENTRY: &str = "Signature";

#[derive(Debug, Error)]
pub enum Error {
    #[error("preprocess: {message} at {pos}")]
    Preprocess { message: String, pos: Position },
    #[error("lex: {message} at {pos}")]
    Lex { message: String, pos: Position },
    #[error("syntax: expected {expected}, found {found} at {pos}")]
    Syntax {
        expected: String,
        found: String,
        pos: Position,
    },
    #[error("syntax: {construct} is not supported at {pos}")]
    Unsupported { construct: String, pos: Position },
    #[error("semantic: {message} in `{extract}` at {pos}")]
    Semantic {
        message: String,
        extract: String,
        pos: Position,
    },
    #[error("compile: {0}")]
    Compilation(String),
    #[error("invalid mode: {0}")]
    InvalidMode(&'static str),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("limit: {0}")]
    Limit(&'static str),
}

impl Error {
    pub(crate) fn syntax(src: &str, found: Option<&Token>, expected: impl Into<String>) -> Self {
        let (found, offset) = match found {
            Some(t) => (t.describe(), t.offset),
            None => ("end of input".to_string(), src.len()),
        };

        Error::Syntax {
            expected: expected.into(),
            found,
            pos: Position::locate(src, offset),
        }
    }

    pub(crate) fn semantic(src: &str, span: Span, message: impl Into<String>) -> Self {
        Error::Semantic {
            message: message.into(),
            extract: short_extract(span.extract(src)),
            pos: Position::locate(src, span.start()),
        }
    }

    pub(crate) fn compilation(message: impl Into<String>) -> Self {
        Error::Compilation(message.into())
    }
}

// multi-line nodes are quoted by their first line only
fn short_extract(text: &str) -> String {
    match text.split_once('\n') {
        Some((first, _)) => format!("{} ...", first.trim_end()),
        None => text.to_string(),
    }
}

/// Which entry programs are compiled. Application modes
/// (approval and clear-state) may be combined; signature
/// mode stands alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Mode(u8);

impl Mode {
    pub const APPROVAL: Mode = Mode(1);
    pub const CLEAR_STATE: Mode = Mode(2);
    pub const SIGNATURE: Mode = Mode(4);

    const ALL_BITS: u8 = 0b111;

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Mode(bits)
    }

    pub fn contains(self, other: Mode) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_application(self) -> bool {
        self.contains(Mode::APPROVAL) || self.contains(Mode::CLEAR_STATE)
    }

    pub fn validate(self) -> Result<(), Error> {
        if self.0 & !Self::ALL_BITS != 0 {
            return Err(Error::InvalidMode("unknown mode bits"));
        }

        if self.is_empty() {
            return Err(Error::InvalidMode("no entry program selected"));
        }

        if self.contains(Mode::SIGNATURE) && self != Mode::SIGNATURE {
            return Err(Error::InvalidMode(
                "signature mode cannot be combined with application modes",
            ));
        }

        Ok(())
    }

    /// Entry function names in compilation order.
    pub fn entry_points(self) -> Vec<&'static str> {
        [
            (Mode::APPROVAL, APPROVAL_ENTRY),
            (Mode::CLEAR_STATE, CLEAR_STATE_ENTRY),
            (Mode::SIGNATURE, SIGNATURE_ENTRY),
        ]
        .into_iter()
        .filter(|(m, _)| self.contains(*m))
        .map(|(_, name)| name)
        .collect()
    }
}

impl BitOr for Mode {
    type Output = Mode;

    fn bitor(self, rhs: Mode) -> Mode {
        Mode(self.0 | rhs.0)
    }
}

impl BitOrAssign for Mode {
    fn bitor_assign(&mut self, rhs: Mode) {
        self.0 |= rhs.0;
    }
}

impl FromStr for Mode {
    type Err = Error;

    /// Comma separated list: `approval`, `clear`
    /// (or `clear-state`), `signature`.
    fn from_str(s: &str) -> Result<Self, Error> {
        let mut mode = Mode::default();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            mode |= match part {
                "approval" => Mode::APPROVAL,
                "clear" | "clear-state" => Mode::CLEAR_STATE,
                "signature" => Mode::SIGNATURE,
                other => return Err(Error::InvalidOption(format!("unknown mode '{other}'"))),
            };
        }

        mode.validate()?;

        Ok(mode)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Mode::APPROVAL, "approval"),
            (Mode::CLEAR_STATE, "clear"),
            (Mode::SIGNATURE, "signature"),
        ]
        .into_iter()
        .filter(|(m, _)| self.contains(*m))
        .map(|(_, n)| n)
        .collect();

        f.write_str(&names.join(","))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    pub mode: Mode,
    pub teal_version: u8,
    pub preprocess: bool,
}

impl CompileOptions {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            teal_version: DEFAULT_TEAL_VERSION,
            preprocess: true,
        }
    }

    pub fn teal_version(mut self, version: u8) -> Self {
        self.teal_version = version;
        self
    }

    pub fn preprocess(mut self, enabled: bool) -> Self {
        self.preprocess = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.mode.validate()?;

        if !(1..=MAX_TEAL_VERSION).contains(&self.teal_version) {
            return Err(Error::InvalidOption(format!(
                "TEAL version {} is out of range 1..={MAX_TEAL_VERSION}",
                self.teal_version
            )));
        }

        Ok(())
    }
}

pub fn lex(src: &str) -> Result<Vec<Token>, Error> {
    lexer::tokenize(src)
}

pub fn parse(src: &str) -> Result<ast::Program, Error> {
    let toks = lex(src)?;
    parser::parse(&toks, src)
}

/// Runs every stage up to semantic analysis.
#[instrument(level = "info", skip(src))]
pub fn check_str(src: &str, mode: Mode) -> Result<Analysis, Error> {
    mode.validate()?;

    let text = preprocess::preprocess(src)?;
    let program = parse(&text)?;
    debug!(functions = program.functions.len(), "parsed");

    semantic::analyze(&program, mode, &text)
}

/// Compiles the first entry program selected by `mode`.
pub fn compile_str(src: &str, mode: Mode) -> Result<CompiledProgram, Error> {
    compile_with(src, &CompileOptions::new(mode))
}

pub fn compile_with(src: &str, opts: &CompileOptions) -> Result<CompiledProgram, Error> {
    compile_all(src, opts)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::compilation("no entry program was generated"))
}

/// Compiles one program per entry selected by the mode.
#[instrument(level = "info", skip(src))]
pub fn compile_all(src: &str, opts: &CompileOptions) -> Result<Vec<CompiledProgram>, Error> {
    opts.validate()?;

    let text = if opts.preprocess {
        preprocess::preprocess(src)?
    } else {
        src.to_string()
    };

    let toks = lex(&text)?;
    debug!(toks_len = toks.len(), "lexed");

    let program = parser::parse(&toks, &text)?;
    debug!(functions = program.functions.len(), "parsed");

    let analysis = semantic::analyze(&program, opts.mode, &text)?;
    debug!(
        entries = analysis.entry_points.len(),
        variables = analysis.variables,
        "analyzed"
    );

    let programs = teal::generate(&program, &analysis, opts)?;
    for p in &programs {
        debug!(
            entry = %p.entry,
            ops = p.metrics.ops,
            labels = p.metrics.labels,
            peak_depth = p.metrics.peak_depth,
            "lowered"
        );
    }

    Ok(programs)
}
