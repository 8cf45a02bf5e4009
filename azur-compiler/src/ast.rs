// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Syntax tree produced by the parser.
//!
//! Every node keeps a [`Span`] made of its first, main and
//! last token so diagnostics can quote the exact source
//! text. [`Node`] gives a uniform borrowed view over all
//! node kinds for generic searches (calls, assignments,
//! returns) without matching on every type by hand.

use crate::lexer::Token;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenPos {
    pub offset: usize,
    pub len: usize,
}

impl TokenPos {
    pub fn end(self) -> usize {
        self.offset + self.len
    }
}

impl From<&Token> for TokenPos {
    fn from(t: &Token) -> Self {
        Self {
            offset: t.offset,
            len: t.len,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub first: TokenPos,
    /// Operator or keyword that defines the node.
    pub main: TokenPos,
    pub last: TokenPos,
}

impl Span {
    pub fn new(first: TokenPos, main: TokenPos, last: TokenPos) -> Self {
        Self { first, main, last }
    }

    pub fn single(t: TokenPos) -> Self {
        Self::new(t, t, t)
    }

    /// Source text from the start of the first token
    /// to the end of the last one.
    pub fn extract<'s>(&self, src: &'s str) -> &'s str {
        src.get(self.first.offset..self.last.end()).unwrap_or("")
    }

    pub fn start(&self) -> usize {
        self.first.offset
    }

    pub fn encloses(&self, other: &Span) -> bool {
        self.first.offset <= other.first.offset && other.last.end() <= self.last.end()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Complement,
}

impl UnaryOperator {
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "!" => Some(Self::Not),
            "~" => Some(Self::Complement),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Complement => "~",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Assign,
    Ternary,
    Colon,
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Range,
    RangeInclusive,
}

impl BinaryOperator {
    pub fn from_symbol(s: &str) -> Option<Self> {
        use BinaryOperator::*;

        let op = match s {
            "=" => Assign,
            "?" => Ternary,
            ":" => Colon,
            "||" => Or,
            "&&" => And,
            "|" => BitOr,
            "^" => BitXor,
            "&" => BitAnd,
            "==" => Eq,
            "!=" => Ne,
            "<" => Lt,
            ">" => Gt,
            "<=" => Le,
            ">=" => Ge,
            "<<" => Shl,
            ">>" => Shr,
            "+" => Add,
            "-" => Sub,
            "*" => Mul,
            "/" => Div,
            "%" => Mod,
            "**" => Pow,
            ".." => Range,
            "..." => RangeInclusive,
            _ => return None,
        };

        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOperator::*;

        match self {
            Assign => "=",
            Ternary => "?",
            Colon => ":",
            Or => "||",
            And => "&&",
            BitOr => "|",
            BitXor => "^",
            BitAnd => "&",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            Shl => "<<",
            Shr => ">>",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            Pow => "**",
            Range => "..",
            RangeInclusive => "...",
        }
    }

    pub fn is_comparison(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Eq | Ne | Lt | Gt | Le | Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    /// Top-level constant declarations. The grammar only
    /// accepts `def` at top level today, so this stays empty.
    pub constants: Vec<Expr>,
    pub functions: Vec<Function>,
    pub span: Span,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: CodeBlock,
    pub span: Span,
}

impl Function {
    /// True when any `return` in the body carries a value.
    pub fn returns_value(&self) -> bool {
        Node::Function(self)
            .returns()
            .any(|r| r.kind == ReturnKind::Return && r.value.is_some())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodeBlock {
    pub instructions: Vec<Instruction>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    If(If),
    While(While),
    DoWhile(DoWhile),
    Switch(Switch),
    Return(Return),
    Expr(Expr),
}

impl Instruction {
    pub fn span(&self) -> Span {
        match self {
            Instruction::If(i) => i.span,
            Instruction::While(w) => w.span,
            Instruction::DoWhile(d) => d.span,
            Instruction::Switch(s) => s.span,
            Instruction::Return(r) => r.span,
            Instruction::Expr(e) => e.span(),
        }
    }

    /// Expressions evaluated by this instruction itself,
    /// excluding anything inside its nested blocks.
    pub fn own_expressions(&self) -> Vec<&Expr> {
        match self {
            Instruction::If(i) => vec![&i.condition],
            Instruction::While(w) => vec![&w.condition],
            Instruction::DoWhile(d) => vec![&d.condition],
            Instruction::Switch(s) => std::iter::once(&s.tested)
                .chain(s.cases.iter().flat_map(|c| c.values.iter()))
                .collect(),
            Instruction::Return(r) => r.value.iter().collect(),
            Instruction::Expr(e) => vec![e],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct If {
    pub condition: Expr,
    pub then_block: CodeBlock,
    pub else_block: Option<CodeBlock>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct While {
    pub condition: Expr,
    pub block: CodeBlock,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DoWhile {
    pub block: CodeBlock,
    pub condition: Expr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Switch {
    pub tested: Expr,
    pub cases: Vec<SwitchCase>,
    pub default: Option<CodeBlock>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Expr>,
    pub block: CodeBlock,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnKind {
    Return,
    Throw,
    Exit,
}

impl ReturnKind {
    pub fn keyword(self) -> &'static str {
        match self {
            ReturnKind::Return => "return",
            ReturnKind::Throw => "throw",
            ReturnKind::Exit => "exit",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Return {
    pub kind: ReturnKind,
    pub value: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Uint64(Uint64Const),
    Bytes(BytesConst),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Call(Call),
    Var(Variable),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Uint64(c) => c.span,
            Expr::Bytes(c) => c.span,
            Expr::Unary(u) => u.span,
            Expr::Binary(b) => b.span,
            Expr::Call(c) => c.span,
            Expr::Var(v) => v.span(),
        }
    }

    pub fn span_mut(&mut self) -> &mut Span {
        match self {
            Expr::Uint64(c) => &mut c.span,
            Expr::Bytes(c) => &mut c.span,
            Expr::Unary(u) => &mut u.span,
            Expr::Binary(b) => &mut b.span,
            Expr::Call(c) => &mut c.span,
            Expr::Var(Variable::Reference(r)) => &mut r.span,
            Expr::Var(Variable::ArrayAccess(a)) => &mut a.span,
            Expr::Var(Variable::MemberAccess(m)) => &mut m.span,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Expr::Var(Variable::Reference(r)) => Some(r),
            _ => None,
        }
    }

    pub fn as_binary(&self, op: BinaryOperator) -> Option<&BinaryOp> {
        match self {
            Expr::Binary(b) if b.op == op => Some(b),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uint64Const {
    pub value: u64,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytesConst {
    pub value: Vec<u8>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnaryOp {
    pub op: UnaryOperator,
    pub operand: Box<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryOp {
    pub op: BinaryOperator,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub function: Reference,
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Variable {
    Reference(Reference),
    ArrayAccess(ArrayAccess),
    MemberAccess(MemberAccess),
}

impl Variable {
    pub fn span(&self) -> Span {
        match self {
            Variable::Reference(r) => r.span,
            Variable::ArrayAccess(a) => a.span,
            Variable::MemberAccess(m) => m.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArrayAccess {
    pub base: Box<Variable>,
    pub index: Box<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberAccess {
    pub owner: Box<Variable>,
    pub member: Reference,
    pub span: Span,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Uint64(c) => write!(f, "{}", c.value),
            Expr::Bytes(c) => write!(f, "\"{}\"", String::from_utf8_lossy(&c.value)),
            Expr::Unary(u) => write!(f, "{}{}", u.op.symbol(), u.operand),
            Expr::Binary(b) => write!(f, "{b}"),
            Expr::Call(c) => {
                write!(f, "{}(", c.function.name)?;
                for (i, a) in c.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
            Expr::Var(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.op, self.right)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Reference(r) => f.write_str(&r.name),
            Variable::ArrayAccess(a) => write!(f, "{}[{}]", a.base, a.index),
            Variable::MemberAccess(m) => write!(f, "{}.{}", m.owner, m.member.name),
        }
    }
}

/// Borrowed view over any tree node.
#[derive(Clone, Copy, Debug)]
pub enum Node<'a> {
    Program(&'a Program),
    Function(&'a Function),
    Block(&'a CodeBlock),
    Instruction(&'a Instruction),
    Case(&'a SwitchCase),
    Expr(&'a Expr),
    Variable(&'a Variable),
}

impl<'a> Node<'a> {
    pub fn span(self) -> Span {
        match self {
            Node::Program(p) => p.span,
            Node::Function(f) => f.span,
            Node::Block(b) => b.span,
            Node::Instruction(i) => i.span(),
            Node::Case(c) => c.span,
            Node::Expr(e) => e.span(),
            Node::Variable(v) => v.span(),
        }
    }

    pub fn children(self) -> Vec<Node<'a>> {
        match self {
            Node::Program(p) => p
                .constants
                .iter()
                .map(Node::Expr)
                .chain(p.functions.iter().map(Node::Function))
                .collect(),
            Node::Function(f) => vec![Node::Block(&f.body)],
            Node::Block(b) => b.instructions.iter().map(Node::Instruction).collect(),
            Node::Instruction(i) => match i {
                Instruction::If(x) => {
                    let mut out = vec![Node::Expr(&x.condition), Node::Block(&x.then_block)];
                    out.extend(x.else_block.as_ref().map(Node::Block));
                    out
                }
                Instruction::While(w) => vec![Node::Expr(&w.condition), Node::Block(&w.block)],
                Instruction::DoWhile(d) => vec![Node::Block(&d.block), Node::Expr(&d.condition)],
                Instruction::Switch(s) => std::iter::once(Node::Expr(&s.tested))
                    .chain(s.cases.iter().map(Node::Case))
                    .chain(s.default.as_ref().map(Node::Block))
                    .collect(),
                Instruction::Return(r) => r.value.iter().map(Node::Expr).collect(),
                Instruction::Expr(e) => vec![Node::Expr(e)],
            },
            Node::Case(c) => c
                .values
                .iter()
                .map(Node::Expr)
                .chain(std::iter::once(Node::Block(&c.block)))
                .collect(),
            Node::Expr(e) => match e {
                Expr::Uint64(_) | Expr::Bytes(_) => Vec::new(),
                Expr::Unary(u) => vec![Node::Expr(&u.operand)],
                Expr::Binary(b) => vec![Node::Expr(&b.left), Node::Expr(&b.right)],
                Expr::Call(c) => c.args.iter().map(Node::Expr).collect(),
                Expr::Var(v) => vec![Node::Variable(v)],
            },
            Node::Variable(v) => match v {
                Variable::Reference(_) => Vec::new(),
                Variable::ArrayAccess(a) => vec![Node::Variable(&a.base), Node::Expr(&a.index)],
                Variable::MemberAccess(m) => vec![Node::Variable(&m.owner)],
            },
        }
    }

    /// Pre-order walk starting with `self`.
    pub fn descendants(self) -> Descendants<'a> {
        Descendants { stack: vec![self] }
    }

    pub fn calls(self) -> impl Iterator<Item = &'a Call> {
        self.descendants().filter_map(|n| match n {
            Node::Expr(Expr::Call(c)) => Some(c),
            _ => None,
        })
    }

    pub fn assignments(self) -> impl Iterator<Item = &'a BinaryOp> {
        self.descendants().filter_map(|n| match n {
            Node::Expr(Expr::Binary(b)) if b.op == BinaryOperator::Assign => Some(b),
            _ => None,
        })
    }

    pub fn returns(self) -> impl Iterator<Item = &'a Return> {
        self.descendants().filter_map(|n| match n {
            Node::Instruction(Instruction::Return(r)) => Some(r),
            _ => None,
        })
    }
}

pub struct Descendants<'a> {
    stack: Vec<Node<'a>>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        let node = self.stack.pop()?;
        let mut children = node.children();
        children.reverse();
        self.stack.extend(children);

        Some(node)
    }
}
