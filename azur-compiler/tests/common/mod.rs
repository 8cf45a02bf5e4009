// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

#![allow(dead_code)]

//! Small interpreter for generated programs. It covers
//! the opcodes the generator emits for plain arithmetic,
//! branches and subroutines, which is enough to compare
//! the behaviour of two programs.

use azur_compiler::{CompiledProgram, Operand, TealInstruction};
use std::collections::BTreeMap;

const MAX_STEPS: usize = 100_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Uint(u64),
    Bytes(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Return(u64),
    Failed,
}

/// Stack depth change observed across one subroutine call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    pub name: String,
    pub delta: isize,
}

#[derive(Default)]
pub struct Env {
    pub txn: BTreeMap<&'static str, Value>,
    pub global: BTreeMap<&'static str, Value>,
    pub args: Vec<Vec<u8>>,
}

pub struct Vm<'p> {
    code: &'p [TealInstruction],
    labels: BTreeMap<&'p str, usize>,
    stack: Vec<Value>,
    frames: Vec<(usize, usize, &'p str)>,
    env: Env,
    pub calls: Vec<CallRecord>,
    pub logs: Vec<Vec<u8>>,
}

enum Flow<'p> {
    Next,
    Jump(&'p str),
    Call(&'p str),
    Ret,
    Done(Outcome),
}

impl<'p> Vm<'p> {
    pub fn new(p: &'p CompiledProgram, env: Env) -> Self {
        let labels = p
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(i, ins)| match ins {
                TealInstruction::Label(l) => Some((l.as_str(), i)),
                _ => None,
            })
            .collect();

        Self {
            code: &p.instructions,
            labels,
            stack: Vec::new(),
            frames: Vec::new(),
            env,
            calls: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn run(&mut self) -> Result<Outcome, String> {
        let code = self.code;
        let mut pc = 0;

        for _ in 0..MAX_STEPS {
            let Some(ins) = code.get(pc) else {
                return Err("fell off the end of the program".into());
            };

            let TealInstruction::Opcode { op, operands } = ins else {
                pc += 1;
                continue;
            };

            match self.exec(op.name, operands)? {
                Flow::Next => pc += 1,
                Flow::Jump(l) => pc = self.label(l)?,
                Flow::Call(l) => {
                    self.frames.push((pc + 1, self.stack.len(), l));
                    pc = self.label(l)?;
                }
                Flow::Ret => {
                    let (back, depth, name) = self.frames.pop().ok_or("retsub without callsub")?;
                    self.calls.push(CallRecord {
                        name: name.to_string(),
                        delta: self.stack.len() as isize - depth as isize,
                    });
                    pc = back;
                }
                Flow::Done(outcome) => return Ok(outcome),
            }
        }

        Err("step limit reached".into())
    }

    fn label(&self, l: &str) -> Result<usize, String> {
        self.labels
            .get(l)
            .copied()
            .ok_or_else(|| format!("unknown label {l}"))
    }

    fn pop(&mut self) -> Result<Value, String> {
        self.stack.pop().ok_or_else(|| "stack underflow".to_string())
    }

    fn pop_uint(&mut self) -> Result<u64, String> {
        match self.pop()? {
            Value::Uint(v) => Ok(v),
            Value::Bytes(_) => Err("expected uint64, found bytes".into()),
        }
    }

    fn pop_bytes(&mut self) -> Result<Vec<u8>, String> {
        match self.pop()? {
            Value::Bytes(b) => Ok(b),
            Value::Uint(_) => Err("expected bytes, found uint64".into()),
        }
    }

    fn depth_index(&self, n: u64) -> Result<usize, String> {
        let n = n as usize;
        if n >= self.stack.len() {
            return Err(format!("depth {n} out of range"));
        }

        Ok(self.stack.len() - 1 - n)
    }

    fn exec(&mut self, name: &str, ops: &'p [Operand]) -> Result<Flow<'p>, String> {
        let flow = match name {
            "pushint" => {
                let v = uint_operand(ops, 0)?;
                self.stack.push(Value::Uint(v));
                Flow::Next
            }
            "pushbytes" => {
                let Some(Operand::Bytes(b)) = ops.first() else {
                    return Err("pushbytes needs bytes".into());
                };
                self.stack.push(Value::Bytes(b.clone()));
                Flow::Next
            }
            "pop" => {
                self.pop()?;
                Flow::Next
            }
            "dup" => {
                let v = self.stack.last().cloned().ok_or("stack underflow")?;
                self.stack.push(v);
                Flow::Next
            }
            "swap" => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(b);
                self.stack.push(a);
                Flow::Next
            }
            "dig" => {
                let i = self.depth_index(uint_operand(ops, 0)?)?;
                self.stack.push(self.stack[i].clone());
                Flow::Next
            }
            "cover" => {
                let n = uint_operand(ops, 0)? as usize;
                let v = self.pop()?;
                if n > self.stack.len() {
                    return Err("cover out of range".into());
                }
                let at = self.stack.len() - n;
                self.stack.insert(at, v);
                Flow::Next
            }
            "uncover" => {
                let i = self.depth_index(uint_operand(ops, 0)?)?;
                let v = self.stack.remove(i);
                self.stack.push(v);
                Flow::Next
            }
            "+" | "-" | "*" | "/" | "%" | "<" | ">" | "<=" | ">=" | "&&" | "||" | "|" | "&"
            | "^" | "exp" | "shl" | "shr" => {
                let b = self.pop_uint()?;
                let a = self.pop_uint()?;
                match arith(name, a, b) {
                    Some(v) => self.stack.push(Value::Uint(v)),
                    None => return Ok(Flow::Done(Outcome::Failed)),
                }
                Flow::Next
            }
            "==" | "!=" => {
                let b = self.pop()?;
                let a = self.pop()?;
                let eq = match (&a, &b) {
                    (Value::Uint(x), Value::Uint(y)) => x == y,
                    (Value::Bytes(x), Value::Bytes(y)) => x == y,
                    _ => return Err("comparing uint64 with bytes".into()),
                };
                self.stack.push(Value::Uint(u64::from(eq == (name == "=="))));
                Flow::Next
            }
            "b==" | "b!=" => {
                let b = self.pop_bytes()?;
                let a = self.pop_bytes()?;
                let eq = strip(&a) == strip(&b);
                self.stack.push(Value::Uint(u64::from(eq == (name == "b=="))));
                Flow::Next
            }
            "!" => {
                let a = self.pop_uint()?;
                self.stack.push(Value::Uint(u64::from(a == 0)));
                Flow::Next
            }
            "~" => {
                let a = self.pop_uint()?;
                self.stack.push(Value::Uint(!a));
                Flow::Next
            }
            "itob" => {
                let a = self.pop_uint()?;
                self.stack.push(Value::Bytes(a.to_be_bytes().to_vec()));
                Flow::Next
            }
            "btoi" => {
                let b = self.pop_bytes()?;
                if b.len() > 8 {
                    return Ok(Flow::Done(Outcome::Failed));
                }
                let v = b.iter().fold(0u64, |acc, x| (acc << 8) | u64::from(*x));
                self.stack.push(Value::Uint(v));
                Flow::Next
            }
            "txn" => {
                let v = self.field(true, ops)?;
                self.stack.push(v);
                Flow::Next
            }
            "global" => {
                let v = self.field(false, ops)?;
                self.stack.push(v);
                Flow::Next
            }
            "txna" if matches!(ops.first(), Some(Operand::Field("ApplicationArgs"))) => {
                let i = uint_operand(ops, 1)? as usize;
                self.push_arg(i)?;
                Flow::Next
            }
            "arg" => {
                let i = uint_operand(ops, 0)? as usize;
                self.push_arg(i)?;
                Flow::Next
            }
            "log" => {
                let b = self.pop_bytes()?;
                self.logs.push(b);
                Flow::Next
            }
            "bz" | "bnz" => {
                let c = self.pop_uint()?;
                if (c == 0) == (name == "bz") {
                    Flow::Jump(label_operand(ops)?)
                } else {
                    Flow::Next
                }
            }
            "b" => Flow::Jump(label_operand(ops)?),
            "callsub" => Flow::Call(label_operand(ops)?),
            "retsub" => Flow::Ret,
            "return" => Flow::Done(Outcome::Return(self.pop_uint()?)),
            "err" => Flow::Done(Outcome::Failed),
            other => return Err(format!("opcode `{other}` is not interpreted")),
        };

        Ok(flow)
    }

    fn field(&self, txn: bool, ops: &[Operand]) -> Result<Value, String> {
        let Some(Operand::Field(f)) = ops.first() else {
            return Err("missing field operand".into());
        };

        let table = if txn { &self.env.txn } else { &self.env.global };
        table
            .get(f)
            .cloned()
            .ok_or_else(|| format!("field {f} is not set"))
    }

    fn push_arg(&mut self, i: usize) -> Result<(), String> {
        let a = self.env.args.get(i).cloned().ok_or("argument out of range")?;
        self.stack.push(Value::Bytes(a));
        Ok(())
    }
}

fn uint_operand(ops: &[Operand], i: usize) -> Result<u64, String> {
    match ops.get(i) {
        Some(Operand::Uint(v)) => Ok(*v),
        _ => Err(format!("operand {i} is not an integer")),
    }
}

fn label_operand(ops: &[Operand]) -> Result<&str, String> {
    match ops.first() {
        Some(Operand::Label(l)) => Ok(l),
        _ => Err("missing label operand".into()),
    }
}

fn strip(b: &[u8]) -> &[u8] {
    let zeros = b.iter().take_while(|x| **x == 0).count();
    &b[zeros..]
}

fn arith(op: &str, a: u64, b: u64) -> Option<u64> {
    match op {
        "+" => a.checked_add(b),
        "-" => a.checked_sub(b),
        "*" => a.checked_mul(b),
        "/" => a.checked_div(b),
        "%" => a.checked_rem(b),
        "<" => Some(u64::from(a < b)),
        ">" => Some(u64::from(a > b)),
        "<=" => Some(u64::from(a <= b)),
        ">=" => Some(u64::from(a >= b)),
        "&&" => Some(u64::from(a != 0 && b != 0)),
        "||" => Some(u64::from(a != 0 || b != 0)),
        "|" => Some(a | b),
        "&" => Some(a & b),
        "^" => Some(a ^ b),
        "exp" => u32::try_from(b).ok().and_then(|e| a.checked_pow(e)),
        "shl" => (b < 64).then(|| a << b),
        "shr" => (b < 64).then(|| a >> b),
        _ => None,
    }
}

/// Runs `p` and returns its outcome with
/// the subroutine call records.
pub fn run(p: &CompiledProgram, env: Env) -> (Outcome, Vec<CallRecord>) {
    let mut vm = Vm::new(p, env);
    let outcome = vm.run().unwrap_or_else(|e| panic!("{e}\n{}", p.to_assembly()));

    (outcome, vm.calls)
}
