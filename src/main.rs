mod action;
mod backend;
mod cli;
mod commands;
mod config;
mod progress;
mod runner;
mod signal;
mod state;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Exit status for an invalid topology or structural error
const EXIT_CONFIG: u8 = 2;
/// Exit status for any other error
const EXIT_FAILURE: u8 = 1;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Command::Provision(args) => commands::provision::run(&ctx, &args),
        Command::Status(args) => commands::status::run(&ctx, &args),
        Command::Teardown(args) => commands::teardown::run(&ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "clusterup", &mut io::stdout());
            Ok(0)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Configuration and structural problems exit 2, everything else 1
fn exit_code(err: &anyhow::Error) -> u8 {
    let config = err.chain().any(|cause| {
        cause.is::<config::ConfigError>()
            || cause
                .downcast_ref::<provision::Error>()
                .is_some_and(provision::Error::is_fatal)
    });
    if config { EXIT_CONFIG } else { EXIT_FAILURE }
}
