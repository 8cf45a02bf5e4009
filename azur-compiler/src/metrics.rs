// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Lightweight metrics collected during code generation.
//!
//! [`CompilerMetrics`] tracks evaluation stack pressure and
//! a static cost estimate so tooling can inspect a compiled
//! program without depending on generator internals.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompilerMetrics {
    /// Opcode instructions emitted (labels
    /// and comments are not counted).
    pub ops: u32,
    pub labels: u32,
    /// Slots reserved with a `pushint 0`
    /// before their first assignment.
    pub placeholders: u32,
    pub cur_depth: u32,
    pub peak_depth: u32,
    /// Sum of opcode costs at the target version,
    /// each instruction counted once.
    pub static_cost: u64,
    pub subroutines: u32,
    /// User functions left out as unreachable
    /// from the entry function.
    pub pruned: u32,
}

impl CompilerMetrics {
    pub(crate) fn inc_ops(&mut self, cost: u64) {
        self.ops += 1;
        self.static_cost += cost;
    }

    pub(crate) fn inc_labels(&mut self) {
        self.labels += 1;
    }

    pub(crate) fn inc_placeholders(&mut self) {
        self.placeholders += 1;
    }

    pub(crate) fn set_cur_depth(&mut self, depth: u32) {
        self.cur_depth = depth;
        if depth > self.peak_depth {
            self.peak_depth = depth;
        }
    }

    pub(crate) fn inc_subroutines(&mut self) {
        self.subroutines += 1;
    }

    pub(crate) fn set_pruned(&mut self, value: u32) {
        self.pruned = value
    }
}
