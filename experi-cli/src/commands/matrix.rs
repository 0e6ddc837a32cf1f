use crate::commands::{exit_with_load_error, exit_with_parse_error, InputArgs};

use clap::Args;
use color_eyre::Result;

use experiment_service::{ExperimentParser, VariableMatrix};

/// Print every combination of variables, one JSON object per line
#[derive(Args, Debug)]
pub struct MatrixArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

pub fn execute(args: MatrixArgs) -> Result<()> {
    let input_file = args.input.existing_file()?;

    let experiment = match ExperimentParser::parse_file(input_file) {
        Ok(experiment) => experiment,
        Err(e) => exit_with_parse_error(&e),
    };
    let matrix = match experiment.matrix() {
        Ok(matrix) => matrix,
        Err(e) => exit_with_load_error(&e),
    };

    for line in json_lines(&matrix)? {
        println!("{}", line);
    }
    Ok(())
}

fn json_lines(matrix: &VariableMatrix) -> Result<Vec<String>> {
    matrix
        .iter()
        .map(|binding| serde_json::to_string(binding).map_err(Into::into))
        .collect()
}
