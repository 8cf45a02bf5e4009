// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

use azur_compiler as compiler;

use crate::{CheckArgs, CliError};

pub fn cmd_check(args: CheckArgs, json: bool, max_bytes: usize) -> Result<(), CliError> {
    let src = crate::read_program(&args.path, max_bytes)?;
    let mode = crate::parse_mode(&args.mode)?;

    let analysis = compiler::check_str(&src, mode)?;
    tracing::info!(
        target = "cli.check",
        functions = analysis.functions,
        variables = analysis.variables,
        "checked"
    );

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "mode": mode.to_string(),
                "entry_points": analysis.entry_points,
                "functions": analysis.functions,
                "variables": analysis.variables,
            })
        );
    } else {
        println!(
            "OK: entries={} functions={} variables={}",
            analysis.entry_points.join(","),
            analysis.functions,
            analysis.variables,
        );
    }

    Ok(())
}
