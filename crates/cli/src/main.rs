// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

use clap::{CommandFactory, Parser};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = touchfs::CliForGen::parse();
    if cli.command.is_none() {
        let mut cmd = touchfs::CliForGen::command();
        let _ = cmd.print_help();
        eprintln!();
        return ExitCode::from(2);
    }
    match touchfs::run_cli(cli.clone()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Ensure errors always print, even if tracing isn't configured.
            eprintln!("error: {err:#}");
            // Surface operator hints for common backend failures in human mode.
            if cli.log_format == "human" {
                if let Some(hints) = touchfs::operator_hints_for_error(&err) {
                    eprintln!();
                    eprintln!("hint: {hints}");
                }
            }
            ExitCode::from(1)
        }
    }
}
