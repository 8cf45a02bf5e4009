// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Tokenizer for Azur source text.
//!
//! The lexer produces a flat token list where every token
//! remembers its byte offset and length in the source, so
//! later stages can point diagnostics at exact text.

use crate::{Error, MAX_TOKENS};
use std::fmt;

/// Operator and punctuation symbols. Matching picks the
/// longest symbol that prefixes the remaining input.
pub const SYMBOLS: &[&str] = &[
    "...", "..", "**", "*", "/", "%", "+", "-", "<<", ">>", "<=", ">=", "<", ">", "==", "!=", "&&",
    "||", "^", "&", "|", "?", ":", "=", ".", "{", "}", "(", ")", "[", "]", "@", ",", ";", "!", "~",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    Symbol,
    Comment,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Lexeme payload. Numbers drop their radix prefix,
    /// strings drop the quotes and keep escapes verbatim.
    pub text: String,
    pub offset: usize,
    pub len: usize,
    /// Radix of numeric literals.
    pub base: Option<u32>,
}

impl Token {
    pub fn is_symbol(&self, sym: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == sym
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == name
    }

    /// Human readable form used in diagnostics.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Identifier => format!("`{}`", self.text),
            TokenKind::Number => format!("number `{}`", self.text),
            TokenKind::String => format!("string \"{}\"", self.text),
            TokenKind::Symbol => format!("'{}'", self.text),
            TokenKind::Comment => "comment".to_string(),
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Line/column of a byte offset, both 1-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn locate(src: &str, offset: usize) -> Self {
        let mut offset = offset.min(src.len());
        while !src.is_char_boundary(offset) {
            offset -= 1;
        }

        let before = &src[..offset];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };

        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, Error> {
    let mut lx = Lexer {
        src,
        pos: 0,
        out: Vec::new(),
    };

    lx.run()?;

    if lx.out.len() > MAX_TOKENS {
        return Err(Error::Limit("too many tokens"));
    }

    Ok(lx.out)
}

pub fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    out: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<(), Error> {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
                continue;
            }

            let rest = self.rest();
            if rest.starts_with("//") {
                let len = rest.find('\n').unwrap_or(rest.len());
                self.push(TokenKind::Comment, self.pos, len, rest[..len].to_string(), None);
            } else if rest.starts_with("/*") {
                let Some(close) = rest[2..].find("*/") else {
                    return Err(self.error(self.pos, "unterminated block comment"));
                };

                let len = close + 4;
                self.push(TokenKind::Comment, self.pos, len, rest[..len].to_string(), None);
            } else if ch == '"' {
                self.string()?;
            } else if ch.is_ascii_digit() {
                self.number()?;
            } else if is_ident_start(ch) {
                let len = rest
                    .find(|c: char| !is_ident_continue(c))
                    .unwrap_or(rest.len());
                self.push(TokenKind::Identifier, self.pos, len, rest[..len].to_string(), None);
            } else {
                let Some(sym) = SYMBOLS
                    .iter()
                    .filter(|s| rest.starts_with(**s))
                    .max_by_key(|s| s.len())
                else {
                    return Err(self.error(self.pos, &format!("unexpected character '{ch}'")));
                };

                self.push(TokenKind::Symbol, self.pos, sym.len(), sym.to_string(), None);
            }
        }

        Ok(())
    }

    fn string(&mut self) -> Result<(), Error> {
        let start = self.pos;
        let body = &self.src[start + 1..];
        let mut chars = body.char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    // keep the escape, skip whatever it escapes
                    chars.next();
                }
                '"' => {
                    let text = body[..i].to_string();
                    self.push(TokenKind::String, start, i + 2, text, None);
                    return Ok(());
                }
                _ => {}
            }
        }

        Err(self.error(start, "unterminated string literal"))
    }

    fn number(&mut self) -> Result<(), Error> {
        let start = self.pos;
        let rest = self.rest();

        let (prefix, base, is_digit): (usize, u32, fn(char) -> bool) =
            if rest.starts_with("0x") || rest.starts_with("0X") {
                (2, 16, |c: char| c.is_ascii_hexdigit())
            } else if rest.starts_with("0b") || rest.starts_with("0B") {
                (2, 2, |c: char| c == '0' || c == '1')
            } else if rest.starts_with('0') {
                (1, 8, |c: char| ('0'..='7').contains(&c))
            } else {
                (0, 10, |c: char| c.is_ascii_digit())
            };

        let digits = &rest[prefix..];
        let n = digits.find(|c: char| !is_digit(c)).unwrap_or(digits.len());

        if let Some(next) = digits[n..].chars().next() {
            if is_ident_continue(next) {
                return Err(self.error(
                    start + prefix + n,
                    &format!("invalid digit '{next}' in base {base} literal"),
                ));
            }
        }

        let text = match (base, n) {
            // a lone `0` reads as octal zero
            (8, 0) => "0".to_string(),
            (16 | 2, 0) => {
                return Err(self.error(start, "numeric literal has no digits after its prefix"));
            }
            _ => digits[..n].to_string(),
        };

        self.push(TokenKind::Number, start, prefix + n, text, Some(base));

        Ok(())
    }

    fn push(&mut self, kind: TokenKind, offset: usize, len: usize, text: String, base: Option<u32>) {
        self.out.push(Token {
            kind,
            text,
            offset,
            len,
            base,
        });
        self.pos = offset + len;
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, offset: usize, message: &str) -> Error {
        Error::Lex {
            message: message.to_string(),
            pos: Position::locate(self.src, offset),
        }
    }
}
