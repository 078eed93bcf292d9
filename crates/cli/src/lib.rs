pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::calculate::CalculateArgs;

#[derive(Debug, Parser)]
#[command(
    name = "grantwise",
    about = "Grantwise subsidy consultation CLI",
    long_about = "Estimate Taiwan government subsidies, run an interactive consultation, and inspect configuration.",
    after_help = "Examples:\n  grantwise calculate --project-type research --budget 5000000 --people 20 \\\n    --capital 10000000 --revenue 30000000 --bonus-count 3\n  grantwise chat\n  grantwise config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Calculate a subsidy estimate directly from the given inputs")]
    Calculate(CalculateArgs),
    #[command(about = "Run an interactive consultation over stdin (requires an LLM API key)")]
    Chat,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Calculate(args) => commands::calculate::run(args),
        Command::Chat => commands::chat::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
