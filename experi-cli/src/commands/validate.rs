use crate::commands::{exit_with_load_error, exit_with_parse_error, InputArgs};
use crate::output;

use clap::Args;
use color_eyre::Result;

use experiment_service::{experiment_directory, ExperimentParser, Scheduler};

/// Check that an experiment file loads and expands
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Scheduler to build the jobs for (default: detected)
    #[arg(short = 's', long, value_name = "SCHEDULER")]
    pub scheduler: Option<Scheduler>,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let input_file = args.input.existing_file()?;

    // Step 1: Parse the experiment file
    output::status("Validating", &format!("{}", input_file.display()));

    let experiment = match ExperimentParser::parse_file(input_file) {
        Ok(experiment) => experiment,
        Err(e) => exit_with_parse_error(&e),
    };

    output::check("Experiment file valid");

    // Step 2: Expand the variables
    let matrix = match experiment.matrix() {
        Ok(matrix) => matrix,
        Err(e) => exit_with_load_error(&e),
    };

    output::check(&format!("Variables: {} combination(s)", matrix.len()));

    // Step 3: Bind every command
    let scheduler = Scheduler::determine(args.scheduler, &experiment);
    let directory = experiment_directory(input_file);
    let jobs = match experiment.build_jobs(scheduler, Some(&directory), false) {
        Ok(jobs) => jobs,
        Err(e) => exit_with_load_error(&e),
    };

    let commands: usize = jobs.iter().map(|job| job.all_commands().len()).sum();
    output::check(&format!(
        "Structure: {} job(s), {} command(s)",
        jobs.len(),
        commands
    ));

    if scheduler != Scheduler::Shell {
        output::info(&format!("Scheduler: {}", scheduler));
    }

    output::success("Experiment is valid");
    Ok(())
}
