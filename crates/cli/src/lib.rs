pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "matreq",
    about = "Material request service operator CLI",
    long_about = "Apply migrations, load demo fixtures, and check readiness of the material request service.",
    after_help = "Examples:\n  matreq migrate\n  matreq seed\n  matreq doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo materials and requests (idempotent)")]
    Seed,
    #[command(about = "Validate config, email readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
