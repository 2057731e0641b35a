use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tl_cli::{
    commands::run::{RunCmd, RunUnlimitedCmd},
    TOYLANG_VERSION_MESSAGE,
};
use tl_core_executor::setup_logger;

#[derive(Parser)]
#[command(name = "toylang", version = TOYLANG_VERSION_MESSAGE, about, long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    Run(RunCmd),
    #[command(alias = "rununlimited")]
    RunUnlimited(RunUnlimitedCmd),
}

fn main() -> Result<ExitCode> {
    setup_logger();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(cmd) => cmd.run(),
        Command::RunUnlimited(cmd) => cmd.run(),
    }
}
