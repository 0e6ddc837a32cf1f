// CLI Commands
// Subcommands of the experi binary and the arguments they share

pub mod matrix;
pub mod run;
pub mod validate;

use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use experiment_service::{ParseError, ServiceError};

/// Location of the experiment file
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Experiment file to read; commands run from its directory
    #[arg(
        short = 'f',
        long = "input-file",
        value_name = "FILE",
        default_value = "experiment.yml"
    )]
    pub input_file: PathBuf,
}

impl InputArgs {
    pub fn existing_file(&self) -> Result<&PathBuf> {
        if !self.input_file.is_file() {
            color_eyre::eyre::bail!(
                "Experiment file not found: {}",
                self.input_file.display()
            );
        }
        Ok(&self.input_file)
    }
}

/// Report a parse error with its context and exit
pub fn exit_with_parse_error(error: &ParseError) -> ! {
    output::error(&format!("Parse error: {}", error));
    if !error.context.is_empty() {
        output::dim(&error.context);
    }
    if let Some(suggestion) = &error.suggestion {
        output::info(&format!("  Suggestion: {}", suggestion));
    }
    std::process::exit(1);
}

/// Report a failure to load or build an experiment and exit
pub fn exit_with_load_error(error: &ServiceError) -> ! {
    match error {
        ServiceError::Parse(parse) => exit_with_parse_error(parse),
        other => {
            output::error(&other.to_string());
            std::process::exit(1);
        }
    }
}
