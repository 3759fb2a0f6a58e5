//! The `uci` command-line executable (§6).
//!
//! A thin dispatcher: parse [`uci::cli::Cli`], build a [`uci::Context`] from
//! its global flags, and hand off to the matching [`uci::commands`] function.
//! All state and behavior lives in the library; this binary only owns the
//! process boundary (exit codes, stderr).

use std::process::ExitCode;

use clap::{error::ErrorKind as ClapErrorKind, Parser};
use uci::cli::{Cli, Command};
use uci::commands;

/// Exit code for an unknown subcommand (§6).
const EXIT_UNKNOWN_COMMAND: u8 = 255;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) if error.kind() == ClapErrorKind::InvalidSubcommand => {
            let _ = error.print();
            return ExitCode::from(EXIT_UNKNOWN_COMMAND);
        }
        // Other clap errors (missing/invalid args, `--help`, `--version`)
        // print their own message and exit with clap's own code.
        Err(error) => error.exit(),
    };
    let quiet = cli.quiet;
    let mut ctx = commands::build_context(&cli);

    let result = match cli.command.clone() {
        Command::Show { pointer, output_format } => commands::show(&mut ctx, pointer, output_format),
        Command::Export { package, output_format } => commands::export(&mut ctx, package, output_format),
        Command::Import { package } => commands::import(&mut ctx, &cli, package),
        Command::Changes { package } => commands::changes(&mut ctx, package),
        Command::Commit { package } => commands::commit(&mut ctx, package),
        Command::Revert { pointer } => commands::revert(&mut ctx, &pointer),
        Command::Get { pointer } => commands::get(&mut ctx, &pointer),
        Command::Set { pointer } => commands::set(&mut ctx, &pointer),
        Command::Del { pointer } => commands::del(&mut ctx, &pointer),
        Command::Rename { pointer } => commands::rename(&mut ctx, &pointer),
        Command::AddList { pointer } => commands::add_list(&mut ctx, &pointer),
        Command::Add { package, r#type } => commands::add(&mut ctx, &package, &r#type),
        Command::Batch => commands::batch(&mut ctx),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if !quiet {
                eprintln!("uci: {error}");
            }
            ExitCode::FAILURE
        }
    }
}
