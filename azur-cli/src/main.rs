// SPDX-License-Identifier: AGPL-3.0-or-later
// This file is part of azur project.
// Copyright (C) 2025  Andrei Kochergin <zeek@tuta.com>
//
// Additional terms under GNU AGPL v3 section 7:
//   You must preserve this notice and the azur
//   attribution in copies of this file or substantial
//   portions of it. See the NOTICE file for details.

//! Command-line interface for the Azur compiler.
//!
//! `compile` turns an Azur source file into TEAL assembly,
//! one program per selected entry; `check` stops after
//! semantic analysis and prints a short summary.

#![forbid(unsafe_code)]

mod check;
mod compile;

use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use azur_compiler as compiler;

static INIT_LOGGING: std::sync::Once = std::sync::Once::new();

#[derive(Parser, Debug, Clone)]
#[command(
    name = "azurc",
    about = r"# azurc
# Copyright (c) Andrei Kochergin. All rights reserved.

Compiler from the Azur contract
language to TEAL assembly.",
    version
)]
struct Cli {
    /// Global JSON output
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    /// Global log level (trace|debug|info|warn|error)
    #[arg(
        long,
        global = true,
        default_value = "warn",
        value_parser = ["trace","debug","info","warn","error"],
    )]
    log_level: String,
    /// Max input file size in bytes
    #[arg(long, global = true, default_value_t = 1_048_576)]
    max_bytes: usize,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Compile a program and print or write TEAL assembly
    Compile(CompileArgs),
    /// Run the front end and semantic analysis only
    Check(CheckArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct CompileArgs {
    /// Path to .az file
    path: PathBuf,
    /// Entry programs to build, comma separated:
    /// approval, clear, signature
    #[arg(long, default_value = "approval")]
    mode: String,
    /// Target TEAL version (1..=5)
    #[arg(long, env = "AZUR_TEAL_VERSION", default_value_t = compiler::DEFAULT_TEAL_VERSION)]
    teal_version: u8,
    /// Write assembly to this file. With several
    /// entries each goes to `<stem>.<entry>.teal`
    /// next to it.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Skip `#define` substitution
    #[arg(long, default_value_t = false)]
    no_preprocess: bool,
}

#[derive(clap::Args, Debug, Clone)]
struct CheckArgs {
    /// Path to .az file
    path: PathBuf,
    /// Entry programs to check, comma separated
    #[arg(long, default_value = "approval")]
    mode: String,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("compile error: {0}")]
    Compile(#[from] compiler::Error),
    #[error("io error: {source}: {path}")]
    IoPath {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

impl CliError {
    fn code(&self) -> i32 {
        match self {
            CliError::InvalidInput(_) => 2,
            CliError::Compile(_) => 3,
            CliError::IoPath { .. } => 5,
        }
    }
}

fn try_main(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Compile(args) => compile::cmd_compile(args, cli.json, cli.max_bytes),
        Command::Check(args) => check::cmd_check(args, cli.json, cli.max_bytes),
    }
}

/// Option errors are the caller's input,
/// not a failed compilation.
fn parse_mode(s: &str) -> Result<compiler::Mode, CliError> {
    s.parse()
        .map_err(|e: compiler::Error| CliError::InvalidInput(e.to_string()))
}

fn read_program(path: impl AsRef<Path>, max_bytes: usize) -> Result<String, CliError> {
    let path_ref = path.as_ref();
    let meta = fs::metadata(path_ref).map_err(|e| CliError::IoPath {
        source: e,
        path: path_ref.to_path_buf(),
    })?;

    if meta.len() as usize > max_bytes {
        return Err(CliError::InvalidInput(format!(
            "file too large: {} bytes (limit {})",
            meta.len(),
            max_bytes
        )));
    }

    let s = fs::read_to_string(path_ref).map_err(|e| CliError::IoPath {
        source: e,
        path: path_ref.to_path_buf(),
    })?;

    Ok(s)
}

fn init_logging(level: Option<&str>) {
    INIT_LOGGING.call_once(|| {
        if tracing::dispatcher::has_been_set() {
            return;
        }

        let env = match level {
            Some(l) if !l.is_empty() => l.to_string(),
            _ => std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()),
        };

        let filter = tracing_subscriber::EnvFilter::try_new(env.clone()).unwrap_or_else(|e| {
            eprintln!(
                r"
WARN: invalid RUST_LOG/log_level '{env}': {e};
falling back to 'info'"
            );
            tracing_subscriber::EnvFilter::new("info")
        });

        // stdout carries the assembly
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .compact()
            .try_init();
    });
}

fn main() {
    let cli = Cli::parse();
    init_logging(Some(&cli.log_level));

    let code = match try_main(cli.clone()) {
        Ok(()) => 0,
        Err(e) => {
            let code = e.code();
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "ok": false, "error": e.to_string(), "code": code })
                );
            } else {
                eprintln!("error: {e}");
            }

            code
        }
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_errors_are_invalid_input() {
        let err = parse_mode("approval,bogus").unwrap_err();
        assert_eq!(err.code(), 2);
        assert!(err.to_string().contains("unknown mode 'bogus'"), "{err}");

        let err = parse_mode("signature,clear").unwrap_err();
        assert_eq!(err.code(), 2);

        let m = parse_mode("approval, clear").unwrap();
        assert_eq!(m, compiler::Mode::APPROVAL | compiler::Mode::CLEAR_STATE);
    }

    #[test]
    fn read_program_enforces_size_limit() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        fs::write(tmp.path(), "def ApprovalProgram() { return 1; }").unwrap();

        let err = read_program(tmp.path(), 4).unwrap_err();
        assert!(err.to_string().contains("file too large"), "{err}");

        let src = read_program(tmp.path(), 1024).unwrap();
        assert!(src.starts_with("def"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_program("/definitely/not/here.az", 1024).unwrap_err();
        assert_eq!(err.code(), 5);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
