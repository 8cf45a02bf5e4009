// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

use super::types::Field;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    /// Lookups continue into the enclosing frame.
    Transparent,
    /// Lookups stop here and fall back to the root frame.
    Opaque,
}

#[derive(Debug)]
struct Frame {
    boundary: Boundary,
    vars: BTreeMap<String, Field>,
}

/// Stack of name frames. Frame 0 is the program
/// frame holding built-in constants.
#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame {
                boundary: Boundary::Opaque,
                vars: BTreeMap::new(),
            }],
        }
    }

    pub fn push(&mut self, boundary: Boundary) {
        self.frames.push(Frame {
            boundary,
            vars: BTreeMap::new(),
        });
    }

    pub fn pop(&mut self) {
        // the root frame outlives every function
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Declares `name` in the innermost frame. Returns
    /// false if that frame already has it.
    pub fn declare(&mut self, name: &str, field: Field) -> bool {
        let Some(top) = self.frames.last_mut() else {
            return false;
        };

        if top.vars.contains_key(name) {
            return false;
        }

        top.vars.insert(name.to_string(), field);

        true
    }

    pub fn lookup(&self, name: &str) -> Option<Field> {
        for frame in self.frames.iter().skip(1).rev() {
            if let Some(f) = frame.vars.get(name) {
                return Some(*f);
            }

            if frame.boundary == Boundary::Opaque {
                break;
            }
        }

        self.frames[0].vars.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::types::TypeTable;

    #[test]
    fn opaque_frame_hides_outer_locals_but_not_root() {
        let mut s = ScopeStack::new();
        s.declare("Global", Field::constant(TypeTable::ANY));

        s.push(Boundary::Opaque);
        s.declare("a", Field::var(TypeTable::UINT64));

        s.push(Boundary::Opaque);
        assert!(s.lookup("a").is_none());
        assert!(s.lookup("Global").is_some());
        s.pop();

        s.push(Boundary::Transparent);
        assert!(s.lookup("a").is_some());
        s.declare("b", Field::var(TypeTable::BYTES));
        s.pop();

        assert!(s.lookup("b").is_none());
    }

    #[test]
    fn redeclaring_in_same_frame_is_refused() {
        let mut s = ScopeStack::new();
        s.push(Boundary::Opaque);

        assert!(s.declare("x", Field::var(TypeTable::ANY)));
        assert!(!s.declare("x", Field::var(TypeTable::ANY)));
    }
}
