// Experi CLI
// Runs an experiment's commands over every combination of its variables

mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use commands::matrix::MatrixArgs;
use commands::run::RunArgs;
use commands::validate::ValidateArgs;

/// Run a command over a matrix of variables, locally or through PBS/SLURM
#[derive(Parser, Debug)]
#[command(name = "experi", version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// Increase logging (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the experiment (the default)
    Run(RunArgs),

    /// Check that an experiment file loads and expands
    Validate(ValidateArgs),

    /// Print the expanded variables as JSON lines
    Matrix(MatrixArgs),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Run(args)) => commands::run::execute(args).await,
        Some(Commands::Validate(args)) => commands::validate::execute(args),
        Some(Commands::Matrix(args)) => commands::matrix::execute(args),
        None => commands::run::execute(cli.run).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use experiment_service::Scheduler;
    use std::path::PathBuf;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_is_run() {
        let cli = Cli::parse_from(["experi", "--dry-run", "-s", "PBS"]);
        assert!(cli.command.is_none());
        assert!(cli.run.dry_run);
        assert_eq!(cli.run.scheduler, Some(Scheduler::Pbs));
        assert_eq!(cli.run.input.input_file, PathBuf::from("experiment.yml"));
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::parse_from(["experi", "validate", "-f", "sweep.yml", "-vv"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Commands::Validate(args)) => {
                assert_eq!(args.input.input_file, PathBuf::from("sweep.yml"))
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::parse_from(["experi", "run", "--use-dependencies"]);
        assert!(matches!(cli.command, Some(Commands::Run(args)) if args.use_dependencies));
    }

    #[test]
    fn test_unknown_scheduler_rejected() {
        assert!(Cli::try_parse_from(["experi", "-s", "lsf"]).is_err());
    }
}
