// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

use azur_compiler::{self as compiler, CompileOptions, CompiledProgram, CompilerMetrics};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::{CliError, CompileArgs};

pub fn cmd_compile(args: CompileArgs, json: bool, max_bytes: usize) -> Result<(), CliError> {
    let t_start = Instant::now();
    let src = crate::read_program(&args.path, max_bytes)?;
    let mode = crate::parse_mode(&args.mode)?;

    let opts = CompileOptions::new(mode)
        .teal_version(args.teal_version)
        .preprocess(!args.no_preprocess);
    opts.validate()
        .map_err(|e| CliError::InvalidInput(e.to_string()))?;

    let programs = compiler::compile_all(&src, &opts)?;
    for p in &programs {
        tracing::info!(
            target = "cli.compile",
            entry = %p.entry,
            ops = p.metrics.ops,
            peak_depth = p.metrics.peak_depth,
            static_cost = p.metrics.static_cost,
            "compiled"
        );
    }

    let written = match &args.out {
        Some(out) => write_programs(out, &programs)?,
        None => Vec::new(),
    };

    let elapsed_ms = t_start.elapsed().as_millis();

    if json {
        let items: Vec<_> = programs
            .iter()
            .map(|p| {
                serde_json::json!({
                    "entry": p.entry,
                    "teal": p.to_assembly(),
                    "metrics": metrics_json(&p.metrics),
                })
            })
            .collect();

        let paths: Vec<_> = written.iter().map(|p| p.display().to_string()).collect();

        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "programs": items,
                "written": paths,
                "time_ms": elapsed_ms,
            })
        );

        return Ok(());
    }

    if written.is_empty() {
        let several = programs.len() > 1;
        for (i, p) in programs.iter().enumerate() {
            if several {
                if i > 0 {
                    println!();
                }

                println!("// {}", p.entry);
            }

            print!("{}", p.to_assembly());
        }
    } else {
        for (p, path) in programs.iter().zip(&written) {
            let m = &p.metrics;
            println!(
                "wrote {} ({}): ops={} labels={} peak_depth={} static_cost={}",
                path.display(),
                p.entry,
                m.ops,
                m.labels,
                m.peak_depth,
                m.static_cost,
            );
        }
    }

    Ok(())
}

/// One program goes to `out` itself; several go to
/// `<stem>.<entry>.teal` in the directory of `out`.
fn write_programs(out: &Path, programs: &[CompiledProgram]) -> Result<Vec<PathBuf>, CliError> {
    let paths: Vec<PathBuf> = if programs.len() == 1 {
        vec![out.to_path_buf()]
    } else {
        let stem = out
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                CliError::InvalidInput(format!("output path has no file name: {}", out.display()))
            })?;

        programs
            .iter()
            .map(|p| out.with_file_name(format!("{stem}.{}.teal", p.entry)))
            .collect()
    };

    for (p, path) in programs.iter().zip(&paths) {
        fs::write(path, p.to_assembly()).map_err(|e| CliError::IoPath {
            source: e,
            path: path.clone(),
        })?;

        tracing::debug!(target = "cli.compile", path = %path.display(), "written");
    }

    Ok(paths)
}

fn metrics_json(m: &CompilerMetrics) -> serde_json::Value {
    serde_json::json!({
        "ops": m.ops,
        "labels": m.labels,
        "placeholders": m.placeholders,
        "peak_depth": m.peak_depth,
        "static_cost": m.static_cost,
        "subroutines": m.subroutines,
        "pruned": m.pruned,
    })
}
