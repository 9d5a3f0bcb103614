pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "haggle",
    about = "Terminal trading game where every price is negotiated with an LLM farmer",
    after_help = "Examples:\n  haggle play\n  haggle play --seed 7\n  haggle doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start a game session in the terminal")]
    Play {
        #[arg(long, help = "World generation seed; overrides config and environment")]
        seed: Option<u64>,
        #[arg(long, value_name = "PATH", help = "Path to a haggle.toml config file")]
        config: Option<PathBuf>,
        #[arg(long, help = "Abort a negotiation after this many player turns")]
        max_turns: Option<u32>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, model endpoint reachability, and world generation")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}


pub fn run() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Play { seed, config, max_turns } => {
            let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build()
            {
                Ok(runtime) => runtime,
                Err(error) => {
                    eprintln!("haggle: failed to start async runtime: {error}");
                    return ExitCode::FAILURE;
                }
            };
            let args = commands::play::PlayArgs { seed, config_path: config, max_turns };
            match runtime.block_on(commands::play::run(args)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(error) => {
                    eprintln!("haggle: {error:#}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Config => {
            println!("{}", commands::config::run());
            ExitCode::SUCCESS
        }
        Command::Doctor { json } => {
            println!("{}", commands::doctor::run(json));
            ExitCode::SUCCESS
        }
    }
}
