use crate::commands::{exit_with_load_error, InputArgs};
use crate::output;

use clap::Args;
use color_eyre::Result;
use tracing::debug;

use experiment_service::{load_jobs, progress_channel, JobRunner, RunConfig, RunEvent, Scheduler};

/// Run every command of an experiment
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Scheduler to run with (shell, pbs or slurm)
    #[arg(short = 's', long, value_name = "SCHEDULER")]
    pub scheduler: Option<Scheduler>,

    /// Skip commands whose `creates` file already exists
    #[arg(long)]
    pub use_dependencies: bool,

    /// Show the commands and submissions without running them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let input_file = args.input.existing_file()?;

    output::status("Loading", &format!("{}", input_file.display()));
    let (scheduler, directory, jobs) =
        match load_jobs(input_file, args.scheduler, args.use_dependencies) {
            Ok(loaded) => loaded,
            Err(e) => exit_with_load_error(&e),
        };

    let total_commands: usize = jobs.iter().map(|job| job.len()).sum();
    output::info(&format!(
        "{} job(s), {} command(s) using the {} scheduler",
        jobs.len(),
        total_commands,
        scheduler
    ));

    let config = RunConfig::new(scheduler)
        .with_directory(directory)
        .with_dry_run(args.dry_run);
    debug!(?config, "run configuration");

    let (tx, mut rx) = progress_channel();
    let runner = JobRunner::new(config).with_progress(tx);

    // Spawn execution in background
    let exec_handle = tokio::spawn(async move { runner.run(&jobs).await });

    // Process events in the foreground
    while let Some(event) = rx.recv().await {
        match &event {
            RunEvent::JobStarted {
                job_index,
                total_jobs,
                commands,
            } => {
                output::header(&format!(
                    "Job {}/{} ({} commands)",
                    job_index + 1,
                    total_jobs,
                    commands
                ));
            }

            RunEvent::CommandStarted { shell, line, .. } => {
                output::command_line(shell, line);
            }

            RunEvent::CommandOutput { line, is_stderr } => {
                if *is_stderr {
                    output::command_error(line);
                } else {
                    output::command_output(line);
                }
            }

            RunEvent::CommandCompleted {
                exit_code,
                duration,
                ..
            } => {
                if *exit_code == Some(0) {
                    output::dim(&format!("        OK ({:.2}s)", duration.as_secs_f64()));
                }
            }

            RunEvent::FileRemoved { path } => {
                output::status("Removing", &format!("{}", path.display()));
            }

            RunEvent::FileWritten { path } => {
                output::status("Writing", &format!("{}", path.display()));
            }

            RunEvent::JobSubmitted {
                file,
                command,
                job_id,
            } => {
                if args.dry_run {
                    println!("{}", command.join(" "));
                } else {
                    output::status(
                        "Submitted",
                        &format!("{} as {}", file.display(), job_id),
                    );
                }
            }

            RunEvent::SubmissionSkipped { executable } => {
                output::warning(&format!(
                    "'{}' was not found, scheduler files are written but not submitted",
                    executable
                ));
            }

            RunEvent::Failed { message } => {
                output::failure(message);
            }
        }
    }

    // Wait for the runner to finish
    let outcome = exec_handle.await??;

    if !outcome.success() {
        std::process::exit(1);
    }

    if scheduler == Scheduler::Shell {
        if !args.dry_run {
            output::success(&format!("Ran {} command(s)", outcome.commands_run));
        }
    } else {
        output::success(&format!(
            "Wrote {} scheduler file(s), {} submitted",
            outcome.files_written.len(),
            outcome.job_ids.len()
        ));
    }

    Ok(())
}
