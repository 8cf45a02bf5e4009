// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Syntax analyzer.
//!
//! Statements are parsed by recursive descent. Expressions
//! are parsed by first collecting the token run of the
//! expression (up to a `, ; ) ] { }` outside any brackets)
//! and then splitting it on the operators of each
//! precedence level, loosest first.

use crate::ast::*;
use crate::lexer::{Token, TokenKind};
use crate::{Error, MAX_PARSE_DEPTH, Position};

pub const KEYWORDS: &[&str] = &[
    "def", "if", "else", "for", "in", "while", "do", "switch", "case", "default", "continue",
    "break", "true", "false", "return", "exit", "throw",
];

pub const RESERVED_IDENTIFIERS: &[&str] = &["txn"];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

/// Binary operator levels, loosest binding first.
const LEVELS: &[(&[&str], Assoc)] = &[
    (&["="], Assoc::Right),
    (&["?", ":"], Assoc::Right),
    (&["||"], Assoc::Left),
    (&["&&"], Assoc::Left),
    (&["|"], Assoc::Left),
    (&["^"], Assoc::Left),
    (&["&"], Assoc::Left),
    (&["==", "!="], Assoc::Left),
    (&["<", ">", "<=", ">="], Assoc::Left),
    (&["<<", ">>"], Assoc::Left),
    (&["+", "-"], Assoc::Left),
    (&["*", "/", "%"], Assoc::Left),
    (&["**"], Assoc::Right),
    (&["..", "..."], Assoc::Right),
];

const TERMINATORS: &[&str] = &[",", ";", ")", "]", "{", "}"];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

pub fn parse(tokens: &[Token], src: &str) -> Result<Program, Error> {
    let toks = tokens
        .iter()
        .filter(|t| t.kind != TokenKind::Comment)
        .cloned()
        .collect();

    let mut p = Parser {
        toks,
        src,
        pos: 0,
        depth: 0,
    };

    p.program()
}

struct Parser<'a> {
    toks: Vec<Token>,
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn program(&mut self) -> Result<Program, Error> {
        let mut functions = Vec::new();
        while self.pos < self.toks.len() {
            functions.push(self.function()?);
        }

        let span = match self.toks.len() {
            0 => Span::default(),
            n => Span::new(self.tp(0), self.tp(0), self.tp(n - 1)),
        };

        Ok(Program {
            constants: Vec::new(),
            functions,
            span,
        })
    }

    fn function(&mut self) -> Result<Function, Error> {
        let def = self.expect_keyword("def")?;
        let (name, name_idx) = self.expect_name("function name")?;

        self.expect_symbol("(")?;

        let mut params = Vec::new();
        if !self.at_symbol(")") {
            loop {
                params.push(self.expect_name("parameter name")?.0);
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }

        self.expect_symbol(")")?;

        let body = self.block()?;
        let span = Span::new(self.tp(def), self.tp(name_idx), body.span.last);

        Ok(Function {
            name,
            params,
            body,
            span,
        })
    }

    fn block(&mut self) -> Result<CodeBlock, Error> {
        self.nested(|p| {
            let open = p.expect_symbol("{")?;
            let mut instructions = Vec::new();

            loop {
                match p.peek() {
                    None => return Err(p.error_here("'}'")),
                    Some(t) if t.is_symbol("}") => break,
                    Some(_) => instructions.push(p.instruction()?),
                }
            }

            let close = p.expect_symbol("}")?;

            Ok(CodeBlock {
                instructions,
                span: Span::new(p.tp(open), p.tp(open), p.tp(close)),
            })
        })
    }

    /// A braced block or a single instruction.
    fn simplified_block(&mut self) -> Result<CodeBlock, Error> {
        if self.at_symbol("{") {
            return self.block();
        }

        let instr = self.nested(|p| p.instruction())?;
        let span = instr.span();

        Ok(CodeBlock {
            instructions: vec![instr],
            span,
        })
    }

    fn instruction(&mut self) -> Result<Instruction, Error> {
        let Some(tok) = self.peek() else {
            return Err(self.error_here("statement"));
        };

        if tok.kind == TokenKind::Identifier {
            match tok.text.as_str() {
                "if" => return self.if_stmt(),
                "while" => return self.while_stmt(),
                "do" => return self.do_while_stmt(),
                "switch" => return self.switch_stmt(),
                "return" => return self.return_stmt(ReturnKind::Return),
                "throw" => return self.return_stmt(ReturnKind::Throw),
                "exit" => return self.return_stmt(ReturnKind::Exit),
                "for" | "break" | "continue" => {
                    return Err(Error::Unsupported {
                        construct: format!("`{}`", tok.text),
                        pos: Position::locate(self.src, tok.offset),
                    });
                }
                _ => {}
            }
        }

        let expr = self.expression()?;
        self.expect_symbol(";")?;

        Ok(Instruction::Expr(expr))
    }

    fn if_stmt(&mut self) -> Result<Instruction, Error> {
        let kw = self.expect_keyword("if")?;
        let condition = self.parenthesized()?;
        let then_block = self.simplified_block()?;

        let else_block = if self.at_keyword("else") {
            self.pos += 1;
            Some(self.simplified_block()?)
        } else {
            None
        };

        let last = else_block.as_ref().unwrap_or(&then_block).span.last;

        Ok(Instruction::If(If {
            condition,
            then_block,
            else_block,
            span: Span::new(self.tp(kw), self.tp(kw), last),
        }))
    }

    fn while_stmt(&mut self) -> Result<Instruction, Error> {
        let kw = self.expect_keyword("while")?;
        let condition = self.parenthesized()?;
        let block = self.simplified_block()?;
        let span = Span::new(self.tp(kw), self.tp(kw), block.span.last);

        Ok(Instruction::While(While {
            condition,
            block,
            span,
        }))
    }

    fn do_while_stmt(&mut self) -> Result<Instruction, Error> {
        let kw = self.expect_keyword("do")?;
        let block = self.block()?;

        self.expect_keyword("while")?;

        let condition = self.parenthesized()?;
        let semi = self.expect_symbol(";")?;

        Ok(Instruction::DoWhile(DoWhile {
            block,
            condition,
            span: Span::new(self.tp(kw), self.tp(kw), self.tp(semi)),
        }))
    }

    fn switch_stmt(&mut self) -> Result<Instruction, Error> {
        let kw = self.expect_keyword("switch")?;
        let tested = self.parenthesized()?;

        self.expect_symbol("{")?;

        let mut cases = Vec::new();
        let mut default = None;

        let close = loop {
            match self.peek() {
                Some(t) if t.is_symbol("}") => break self.expect_symbol("}")?,
                Some(t) if t.is_identifier("case") => {
                    let case_kw = self.expect_keyword("case")?;

                    let mut values = vec![self.expression()?];
                    while self.eat_symbol(",") {
                        values.push(self.expression()?);
                    }

                    let block = self.block()?;
                    let span = Span::new(self.tp(case_kw), self.tp(case_kw), block.span.last);

                    cases.push(SwitchCase {
                        values,
                        block,
                        span,
                    });
                }
                Some(t) if t.is_identifier("default") => {
                    self.pos += 1;
                    default = Some(self.block()?);

                    // default closes the switch
                    break self.expect_symbol("}")?;
                }
                _ => return Err(self.error_here("`case`, `default` or '}'")),
            }
        };

        Ok(Instruction::Switch(Switch {
            tested,
            cases,
            default,
            span: Span::new(self.tp(kw), self.tp(kw), self.tp(close)),
        }))
    }

    fn return_stmt(&mut self, kind: ReturnKind) -> Result<Instruction, Error> {
        let kw = self.expect_keyword(kind.keyword())?;

        let value = if kind == ReturnKind::Return && self.at_symbol(";") {
            None
        } else {
            Some(self.expression()?)
        };

        let semi = self.expect_symbol(";")?;

        Ok(Instruction::Return(Return {
            kind,
            value,
            span: Span::new(self.tp(kw), self.tp(kw), self.tp(semi)),
        }))
    }

    fn parenthesized(&mut self) -> Result<Expr, Error> {
        self.expect_symbol("(")?;
        let e = self.expression()?;
        self.expect_symbol(")")?;

        Ok(e)
    }

    fn expression(&mut self) -> Result<Expr, Error> {
        let (start, end) = self.collect_run()?;
        self.parse_level(0, start, end)
    }

    /// Advances over the tokens of one expression and
    /// returns their index range.
    fn collect_run(&mut self) -> Result<(usize, usize), Error> {
        let start = self.pos;
        let mut closers: Vec<&'static str> = Vec::new();

        while let Some(t) = self.toks.get(self.pos) {
            if t.kind == TokenKind::Symbol {
                let s = t.text.as_str();
                if closers.is_empty() && TERMINATORS.contains(&s) {
                    break;
                }

                match s {
                    "(" => closers.push(")"),
                    "[" => closers.push("]"),
                    ")" | "]" | "{" | "}" => match closers.pop() {
                        Some(c) if c == s => {}
                        Some(c) => return Err(Error::syntax(self.src, Some(t), format!("'{c}'"))),
                        None => return Err(Error::syntax(self.src, Some(t), "expression")),
                    },
                    _ => {}
                }
            }

            self.pos += 1;
        }

        if let Some(c) = closers.last() {
            return Err(Error::syntax(self.src, None, format!("'{c}'")));
        }

        Ok((start, self.pos))
    }

    fn parse_level(&mut self, level: usize, start: usize, end: usize) -> Result<Expr, Error> {
        if start >= end {
            return Err(Error::syntax(self.src, self.toks.get(start), "expression"));
        }

        let Some(&(ops, assoc)) = LEVELS.get(level) else {
            return self.leaf(start, end);
        };

        let mut bounds = Vec::new();
        let mut operators = Vec::new();
        let mut depth = 0usize;
        let mut seg = start;

        for i in start..end {
            let t = &self.toks[i];
            if t.kind != TokenKind::Symbol {
                continue;
            }

            match t.text.as_str() {
                "(" | "[" => depth += 1,
                ")" | "]" => depth = depth.saturating_sub(1),
                s if depth == 0 && ops.contains(&s) => {
                    bounds.push((seg, i));
                    operators.push(i);
                    seg = i + 1;
                }
                _ => {}
            }
        }

        if operators.is_empty() {
            return self.parse_level(level + 1, start, end);
        }

        bounds.push((seg, end));

        let mut operands = Vec::with_capacity(bounds.len());
        for (s, e) in bounds {
            operands.push(self.parse_level(level + 1, s, e)?);
        }

        match assoc {
            Assoc::Left => {
                let mut it = operands.into_iter();
                let mut acc = it.next().ok_or_else(|| self.error_at(start, "expression"))?;
                for (op_idx, right) in operators.into_iter().zip(it) {
                    acc = self.binary(acc, op_idx, right)?;
                }

                Ok(acc)
            }
            Assoc::Right => {
                let mut acc = operands
                    .pop()
                    .ok_or_else(|| self.error_at(start, "expression"))?;
                for (op_idx, left) in operators.into_iter().rev().zip(operands.into_iter().rev()) {
                    acc = self.binary(left, op_idx, acc)?;
                }

                Ok(acc)
            }
        }
    }

    fn binary(&self, left: Expr, op_idx: usize, right: Expr) -> Result<Expr, Error> {
        let t = &self.toks[op_idx];
        let op = BinaryOperator::from_symbol(&t.text)
            .ok_or_else(|| Error::syntax(self.src, Some(t), "binary operator"))?;
        let span = Span::new(left.span().first, self.tp(op_idx), right.span().last);

        Ok(Expr::Binary(BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span,
        }))
    }

    fn leaf(&mut self, start: usize, end: usize) -> Result<Expr, Error> {
        let Token {
            kind, text, base, ..
        } = self.toks[start].clone();

        match kind {
            TokenKind::Symbol => match text.as_str() {
                "(" => {
                    let close = self.matching(start, end)?;
                    self.expect_end(close + 1, end)?;

                    let mut inner = self.nested(|p| p.parse_level(0, start + 1, close))?;

                    // the parenthesized node spans its parens
                    let first = self.tp(start);
                    let last = self.tp(close);
                    let span = inner.span_mut();
                    span.first = first;
                    span.last = last;

                    Ok(inner)
                }
                "!" | "~" => {
                    let op = UnaryOperator::from_symbol(&text)
                        .ok_or_else(|| self.error_at(start, "unary operator"))?;
                    if start + 1 >= end {
                        return Err(Error::syntax(self.src, self.toks.get(end), "expression"));
                    }

                    let operand = self.nested(|p| p.leaf(start + 1, end))?;
                    let span = Span::new(self.tp(start), self.tp(start), operand.span().last);

                    Ok(Expr::Unary(UnaryOp {
                        op,
                        operand: Box::new(operand),
                        span,
                    }))
                }
                "[" => self.byte_list(start, end),
                _ => Err(self.error_at(start, "expression")),
            },
            TokenKind::Number => {
                self.expect_end(start + 1, end)?;

                let value = u64::from_str_radix(&text, base.unwrap_or(10))
                    .map_err(|_| self.error_at(start, "an integer literal that fits in 64 bits"))?;

                Ok(Expr::Uint64(Uint64Const {
                    value,
                    span: Span::single(self.tp(start)),
                }))
            }
            TokenKind::String => {
                self.expect_end(start + 1, end)?;

                Ok(Expr::Bytes(BytesConst {
                    value: self.toks[start].text.as_bytes().to_vec(),
                    span: Span::single(self.tp(start)),
                }))
            }
            TokenKind::Identifier => self.reference_chain(start, end),
            TokenKind::Comment => Err(self.error_at(start, "expression")),
        }
    }

    fn byte_list(&mut self, start: usize, end: usize) -> Result<Expr, Error> {
        let close = self.matching(start, end)?;
        self.expect_end(close + 1, end)?;

        let mut value = Vec::new();
        let mut i = start + 1;

        loop {
            let t = &self.toks[i];
            if i >= close || t.kind != TokenKind::Number {
                return Err(self.error_at(i, "byte value"));
            }

            let byte = u64::from_str_radix(&t.text, t.base.unwrap_or(10))
                .ok()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| self.error_at(i, "byte value in 0..=255"))?;

            value.push(byte);
            i += 1;

            if i == close {
                break;
            }

            if !self.toks[i].is_symbol(",") {
                return Err(self.error_at(i, "',' or ']'"));
            }

            i += 1;
        }

        Ok(Expr::Bytes(BytesConst {
            value,
            span: Span::new(self.tp(start), self.tp(start), self.tp(close)),
        }))
    }

    /// Identifier followed by postfix calls, indexing
    /// and member accesses.
    fn reference_chain(&mut self, start: usize, end: usize) -> Result<Expr, Error> {
        let name = self.toks[start].text.clone();
        if is_keyword(&name) && name != "true" && name != "false" {
            return Err(self.error_at(start, "expression"));
        }

        let mut var = Variable::Reference(Reference {
            name,
            span: Span::single(self.tp(start)),
        });

        let mut i = start + 1;
        while i < end {
            let t = &self.toks[i];

            if t.is_symbol("(") {
                let close = self.matching(i, end)?;
                let Variable::Reference(function) = var else {
                    return Err(self.error_at(i, "operator"));
                };

                let args = self.nested(|p| p.arguments(i + 1, close))?;

                // a call ends the chain
                self.expect_end(close + 1, end)?;

                return Ok(Expr::Call(Call {
                    function,
                    args,
                    span: Span::new(self.tp(start), self.tp(i), self.tp(close)),
                }));
            } else if t.is_symbol("[") {
                let close = self.matching(i, end)?;
                let index = self.nested(|p| p.parse_level(0, i + 1, close))?;

                var = Variable::ArrayAccess(ArrayAccess {
                    base: Box::new(var),
                    index: Box::new(index),
                    span: Span::new(self.tp(start), self.tp(i), self.tp(close)),
                });
                i = close + 1;
            } else if t.is_symbol(".") {
                let member = match self.toks.get(i + 1) {
                    Some(m) if i + 1 < end && m.kind == TokenKind::Identifier => m.text.clone(),
                    other => return Err(Error::syntax(self.src, other, "member name")),
                };

                var = Variable::MemberAccess(MemberAccess {
                    owner: Box::new(var),
                    member: Reference {
                        name: member,
                        span: Span::single(self.tp(i + 1)),
                    },
                    span: Span::new(self.tp(start), self.tp(i), self.tp(i + 1)),
                });
                i += 2;
            } else {
                return Err(self.error_at(i, "operator"));
            }
        }

        Ok(Expr::Var(var))
    }

    fn arguments(&mut self, start: usize, end: usize) -> Result<Vec<Expr>, Error> {
        let mut args = Vec::new();
        if start == end {
            return Ok(args);
        }

        let mut depth = 0usize;
        let mut seg = start;

        for i in start..end {
            let t = &self.toks[i];
            if t.kind != TokenKind::Symbol {
                continue;
            }

            match t.text.as_str() {
                "(" | "[" => depth += 1,
                ")" | "]" => depth = depth.saturating_sub(1),
                "," if depth == 0 => {
                    args.push(self.parse_level(0, seg, i)?);
                    seg = i + 1;
                }
                _ => {}
            }
        }

        args.push(self.parse_level(0, seg, end)?);

        Ok(args)
    }

    /// Index of the bracket closing the one at `open`.
    fn matching(&self, open: usize, end: usize) -> Result<usize, Error> {
        let mut depth = 0usize;
        for i in open..end {
            let t = &self.toks[i];
            if t.kind != TokenKind::Symbol {
                continue;
            }

            match t.text.as_str() {
                "(" | "[" => depth += 1,
                ")" | "]" => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                _ => {}
            }
        }

        Err(Error::syntax(self.src, self.toks.get(end), "closing bracket"))
    }

    fn expect_end(&self, at: usize, end: usize) -> Result<(), Error> {
        if at < end {
            return Err(self.error_at(at, "operator"));
        }

        Ok(())
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<usize, Error> {
        match self.peek() {
            Some(t) if t.is_symbol(sym) => {
                self.pos += 1;
                Ok(self.pos - 1)
            }
            _ => Err(self.error_here(format!("'{sym}'"))),
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<usize, Error> {
        if self.at_keyword(kw) {
            self.pos += 1;
            return Ok(self.pos - 1);
        }

        Err(self.error_here(format!("`{kw}`")))
    }

    fn expect_name(&mut self, what: &str) -> Result<(String, usize), Error> {
        match self.peek() {
            Some(t)
                if t.kind == TokenKind::Identifier
                    && !is_keyword(&t.text)
                    && !RESERVED_IDENTIFIERS.contains(&t.text.as_str()) =>
            {
                let name = t.text.clone();
                self.pos += 1;
                Ok((name, self.pos - 1))
            }
            _ => Err(self.error_here(what)),
        }
    }

    fn eat_symbol(&mut self, sym: &str) -> bool {
        if self.at_symbol(sym) {
            self.pos += 1;
            return true;
        }

        false
    }

    fn at_symbol(&self, sym: &str) -> bool {
        self.peek().is_some_and(|t| t.is_symbol(sym))
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.peek().is_some_and(|t| t.is_identifier(kw))
    }

    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos)
    }

    fn tp(&self, idx: usize) -> TokenPos {
        self.toks.get(idx).map(TokenPos::from).unwrap_or_default()
    }

    fn error_here(&self, expected: impl Into<String>) -> Error {
        Error::syntax(self.src, self.peek(), expected)
    }

    fn error_at(&self, idx: usize, expected: impl Into<String>) -> Error {
        Error::syntax(self.src, self.toks.get(idx), expected)
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        if self.depth >= MAX_PARSE_DEPTH {
            return Err(Error::Limit("parse depth exceeded"));
        }

        self.depth += 1;
        let res = f(self);
        self.depth -= 1;

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn expr(src: &str) -> String {
        let full = format!("def f() {{ {src}; }}");
        let toks = tokenize(&full).unwrap();
        let p = parse(&toks, &full).unwrap();

        match &p.functions[0].body.instructions[0] {
            Instruction::Expr(e) => e.to_string(),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter() {
        assert_eq!(expr("1 + 2 * 3"), "(1 + (2 * 3))");
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(expr("a - b - c"), "((a - b) - c)");
    }

    #[test]
    fn assignment_and_power_are_right_associative() {
        assert_eq!(expr("a = b = c"), "(a = (b = c))");
        assert_eq!(expr("2 ** 3 ** 2"), "(2 ** (3 ** 2))");
    }

    #[test]
    fn ternary_folds_to_the_right() {
        assert_eq!(expr("c ? 1 : 2"), "(c ? (1 : 2))");
    }

    #[test]
    fn postfix_chain() {
        assert_eq!(expr("TxnGroup[i + 1].Fee"), "TxnGroup[(i + 1)].Fee");
        assert_eq!(expr("f(a, g(b), [1, 2])"), "f(a, g(b), \"\u{1}\u{2}\")");
    }

    #[test]
    fn parenthesized_span_covers_parens() {
        let src = "def f() { (a + b) * c; }";
        let toks = tokenize(src).unwrap();
        let p = parse(&toks, src).unwrap();
        let Instruction::Expr(Expr::Binary(b)) = &p.functions[0].body.instructions[0] else {
            panic!("expected binary");
        };

        assert_eq!(b.left.span().extract(src), "(a + b)");
        assert_eq!(b.span.extract(src), "(a + b) * c");
    }

    #[test]
    fn string_escapes_stay_in_the_bytes() {
        let src = r#"def f() { "a\n\q\"b"; }"#;
        let toks = tokenize(src).unwrap();
        let p = parse(&toks, src).unwrap();
        let Instruction::Expr(Expr::Bytes(b)) = &p.functions[0].body.instructions[0] else {
            panic!("expected bytes");
        };

        assert_eq!(b.value, br#"a\n\q\"b"#);
    }
}
