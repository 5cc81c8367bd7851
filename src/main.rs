mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod recipe;
mod secrets;
mod signal;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
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
        config: cli.config,
    };

    let code = match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, args)?,
        Command::Plan(args) => commands::plan::run(&ctx, args)?,
        Command::Validate(args) => commands::validate::run(&ctx, args)?,
        Command::Show(args) => commands::show::run(&ctx, args)?,
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "nodeprep", &mut io::stdout());
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
