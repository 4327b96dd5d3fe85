//! canopy-cli: command-line client for the tree HTTP API.
#![deny(clippy::all, clippy::pedantic)]

mod args;
mod client;
mod handlers;
mod print;

use std::process::ExitCode;

use clap::Parser;

use args::{Cli, Commands};
use client::{CliError, Ctx};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if let CliError::Api {
                hint: Some(hint), ..
            } = &err
            {
                eprintln!("  hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = Ctx::new(&cli.base_url)?;
    match cli.command {
        Commands::Tree(cmd) => handlers::handle(&ctx, cmd.action).await,
    }
}
