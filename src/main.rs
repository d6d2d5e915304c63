mod cli;
mod common;
mod distros;
mod ui;

use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::cli::{ConfigCommands, InstallArgs, SessionArgs, TargetArgs};
use crate::ui::prelude::*;

/// Dependency resolver and installer for DankMaterialShell
#[derive(Parser, Debug)]
#[command(name = "dankinstall", author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format for messages and tables
    #[arg(long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List supported distributions
    Distros,

    /// Show which dependencies are installed on this machine
    Detect {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show how each dependency maps to a package on a distribution
    Mapping {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Install the missing dependencies and configure the session
    Install(InstallArgs),

    /// Write the session configuration without installing anything
    Configure {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Inspect or create the installer configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    ui::init(cli.output, std::io::stdout().is_terminal());
    ui::set_debug_mode(cli.debug);

    let result = match cli.command {
        Commands::Distros => cli::list_distros(),
        Commands::Detect { target } => cli::detect(cli.config.as_deref(), &target),
        Commands::Mapping { target } => cli::mapping(cli.config.as_deref(), &target),
        Commands::Install(args) => cli::install(cli.config.as_deref(), args).await,
        Commands::Configure { session } => cli::configure(cli.config.as_deref(), &session),
        Commands::Config { command } => cli::config(cli.config.as_deref(), command),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            emit(Level::Error, "error", &format!("Error: {:#}", err), None);
            ExitCode::FAILURE
        }
    }
}
