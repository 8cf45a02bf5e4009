// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Textual `#define` substitution run before lexing.
//!
//! Directives are collected and cut out of the text first
//! (the line break after each one stays, so line numbers of
//! the remaining source do not move); then every define, in
//! source order, replaces all literal occurrences of its name.

use crate::Error;
use crate::lexer::{Position, is_ident_continue};
use tracing::debug;

const DIRECTIVE: &str = "#define";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Define {
    pub name: String,
    pub value: String,
}

pub fn preprocess(src: &str) -> Result<String, Error> {
    let (text, defines) = strip_defines(src)?;
    if defines.is_empty() {
        return Ok(text);
    }

    debug!(defines = defines.len(), "preprocessing");

    let mut out = text;
    for d in &defines {
        out = out.replace(&d.name, &d.value);
    }

    Ok(out)
}

/// Splits `src` into the text without directives and
/// the list of defines in source order.
pub fn strip_defines(src: &str) -> Result<(String, Vec<Define>), Error> {
    let mut out = String::with_capacity(src.len());
    let mut defines = Vec::new();
    let mut cursor = 0usize;

    while let Some(found) = src[cursor..].find(DIRECTIVE) {
        let start = cursor + found;
        out.push_str(&src[cursor..start]);

        let line_end = src[start..].find('\n').map_or(src.len(), |i| start + i);
        let line = src[start + DIRECTIVE.len()..line_end].trim_end_matches('\r');

        defines.push(parse_directive(src, start, line)?);
        cursor = line_end;
    }

    out.push_str(&src[cursor..]);

    Ok((out, defines))
}

fn parse_directive(src: &str, start: usize, line: &str) -> Result<Define, Error> {
    let err = |message: &str| Error::Preprocess {
        message: message.to_string(),
        pos: Position::locate(src, start),
    };

    if !line.starts_with([' ', '\t']) {
        return Err(err("`#define` must be followed by a name"));
    }

    let body = line.trim_start();
    let name_len = body.find(|c: char| !is_ident_continue(c)).unwrap_or(body.len());
    let name = &body[..name_len];

    match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(err("`#define` name must start with a letter")),
    }

    Ok(Define {
        name: name.to_string(),
        value: body[name_len..].trim().to_string(),
    })
}
