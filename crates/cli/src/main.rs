// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gantry - distributed end-to-end test runner

mod config;
mod engine;
mod logging;
mod run;
mod worker_entry;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gantry",
    version,
    about = "gantry - run end-to-end tests across a pool of isolated workers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a test run
    Run(run::RunArgs),
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Spawned workers re-enter this binary through the reserved flag and
    // never see the user-facing CLI.
    if gantry_transport::is_child_process(args.iter().map(String::as_str)) {
        let code = worker_entry::run_worker(&args[1..]).await;
        std::process::exit(code);
    }

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run(run_args) => match run::execute(run_args).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("error: {e:#}");
                2
            }
        },
    };
    std::process::exit(code);
}
