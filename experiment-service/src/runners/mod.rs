// Job Runners
// Runs jobs in a local shell or writes and submits PBS/SLURM batch files

pub mod events;
pub mod shell;

pub use events::{progress_channel, ProgressReceiver, ProgressSender, RunEvent};
pub use shell::{OutputCallback, ShellOutput, ShellRunner};

use crate::error::ServiceResult;
use crate::jobs::Job;
use crate::scheduler::{create_scheduler_file, Scheduler, SchedulerError, SchedulerOptions};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Id recorded for submissions made in a dry run
pub const DRY_RUN_ID: &str = "dry_run";

/// How a set of jobs should be run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub scheduler: Scheduler,
    /// Where scheduler files are written and commands run
    pub directory: PathBuf,
    pub dry_run: bool,
    /// Prefix of generated scheduler files
    pub basename: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scheduler: Scheduler::Shell,
            directory: PathBuf::from("."),
            dry_run: false,
            basename: "experi".to_string(),
        }
    }
}

impl RunConfig {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            ..Self::default()
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = basename.into();
        self
    }
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Command lines executed in the shell
    pub commands_run: usize,
    pub files_written: Vec<PathBuf>,
    /// Ids returned by the submit command, in submission order
    pub job_ids: Vec<String>,
    /// The failure that stopped the run, if any
    pub failure: Option<String>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs jobs according to a `RunConfig`
pub struct JobRunner {
    config: RunConfig,
    runner: ShellRunner,
    progress: Option<ProgressSender>,
}

impl JobRunner {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            runner: ShellRunner::new(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every job, stopping at the first failing command or submission
    pub async fn run(&self, jobs: &[Job]) -> ServiceResult<RunOutcome> {
        match self.config.scheduler {
            Scheduler::Shell => self.run_shell_jobs(jobs).await,
            scheduler => self.run_scheduler_jobs(scheduler, jobs).await,
        }
    }

    async fn run_shell_jobs(&self, jobs: &[Job]) -> ServiceResult<RunOutcome> {
        let mut outcome = RunOutcome::default();

        for (job_index, job) in jobs.iter().enumerate() {
            let shell = job.shell();
            if which::which(shell).is_err() {
                return Err(SchedulerError::ShellNotFound(shell.to_string()).into());
            }

            let options = job
                .scheduler_options()
                .map(SchedulerOptions::from_mapping)
                .unwrap_or_default();
            debug!("{}", options.create_header(Scheduler::Shell));

            let directory = job.directory().unwrap_or(&self.config.directory);
            self.emit(RunEvent::JobStarted {
                job_index,
                total_jobs: jobs.len(),
                commands: job.len(),
            });

            for command in job {
                for line in command.cmd() {
                    info!(shell, line = %line, "running command");
                    self.emit(RunEvent::CommandStarted {
                        job_index,
                        shell: shell.to_string(),
                        line: line.clone(),
                    });
                    if self.config.dry_run {
                        continue;
                    }

                    let start = Instant::now();
                    let output = self
                        .runner
                        .run_script(shell, &line, directory, self.output_callback())
                        .await;
                    outcome.commands_run += 1;
                    self.emit(RunEvent::CommandCompleted {
                        line: line.clone(),
                        exit_code: output.exit_code,
                        duration: start.elapsed(),
                    });

                    if !output.success() {
                        let message = command_failure(&line, &output);
                        error!("{}", message);
                        self.fail(&mut outcome, message);
                        return Ok(outcome);
                    }
                }
            }
        }

        Ok(outcome)
    }

    async fn run_scheduler_jobs(
        &self,
        scheduler: Scheduler,
        jobs: &[Job],
    ) -> ServiceResult<RunOutcome> {
        let mut outcome = RunOutcome::default();
        let directory = self.config.directory.as_path();
        let extension = scheduler.extension();

        let submit_executable = scheduler.submit_executable().unwrap_or_default();
        let can_submit = which::which(submit_executable).is_ok();
        if !can_submit {
            warn!(
                executable = submit_executable,
                "submit executable not found, only writing scheduler files"
            );
            self.emit(RunEvent::SubmissionSkipped {
                executable: submit_executable.to_string(),
            });
        }

        for path in old_scheduler_files(directory, &self.config.basename, extension)? {
            info!(path = %path.display(), "removing old scheduler file");
            fs::remove_file(&path).map_err(SchedulerError::from)?;
            self.emit(RunEvent::FileRemoved { path });
        }

        for (job_index, job) in jobs.iter().enumerate() {
            self.emit(RunEvent::JobStarted {
                job_index,
                total_jobs: jobs.len(),
                commands: job.len(),
            });

            let content = create_scheduler_file(scheduler, job)?;
            let options = job
                .scheduler_options()
                .map(SchedulerOptions::from_mapping)
                .unwrap_or_default();
            if !options.log_dir.is_empty() {
                let log_dir = directory.join(&options.log_dir);
                if !log_dir.exists() {
                    fs::create_dir_all(&log_dir).map_err(SchedulerError::from)?;
                }
            }

            let filename = format!("{}_{:02}.{}", self.config.basename, job_index, extension);
            let path = directory.join(&filename);
            fs::write(&path, content).map_err(SchedulerError::from)?;
            info!(path = %path.display(), "wrote scheduler file");
            outcome.files_written.push(path.clone());
            self.emit(RunEvent::FileWritten { path: path.clone() });

            if !(can_submit || self.config.dry_run) {
                continue;
            }

            let mut args = scheduler.dependency_args(&outcome.job_ids);
            args.push(filename.clone());
            let mut command = vec![submit_executable.to_string()];
            command.extend(args.iter().cloned());

            let job_id = if self.config.dry_run {
                DRY_RUN_ID.to_string()
            } else {
                let output = self
                    .runner
                    .run_program(submit_executable, &args, directory, None)
                    .await;
                if !output.success() {
                    let message = SchedulerError::SubmitFailed {
                        file: filename,
                        message: failure_detail(&output),
                    }
                    .to_string();
                    error!("{}", message);
                    self.fail(&mut outcome, message);
                    return Ok(outcome);
                }
                output.stdout.trim().to_string()
            };

            info!(command = %command.join(" "), job_id = %job_id, "submitted job");
            outcome.job_ids.push(job_id.clone());
            self.emit(RunEvent::JobSubmitted {
                file: path,
                command,
                job_id,
            });
        }

        Ok(outcome)
    }

    fn emit(&self, event: RunEvent) {
        if let Some(progress) = &self.progress {
            let _ = progress.send(event);
        }
    }

    fn fail(&self, outcome: &mut RunOutcome, message: String) {
        self.emit(RunEvent::Failed {
            message: message.clone(),
        });
        outcome.failure = Some(message);
    }

    fn output_callback(&self) -> Option<OutputCallback> {
        let progress = self.progress.clone()?;
        Some(Box::new(move |line: &str, is_stderr: bool| {
            let _ = progress.send(RunEvent::CommandOutput {
                line: line.to_string(),
                is_stderr,
            });
        }))
    }
}

/// Files named `<basename>*.<extension>` left by an earlier run
fn old_scheduler_files(
    directory: &Path,
    basename: &str,
    extension: &str,
) -> Result<Vec<PathBuf>, SchedulerError> {
    if !directory.is_dir() {
        return Ok(Vec::new());
    }

    let suffix = format!(".{}", extension);
    let mut files = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(basename) && name.ends_with(&suffix) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn failure_detail(output: &ShellOutput) -> String {
    let stderr = output.stderr.trim();
    match output.exit_code {
        Some(code) if stderr.is_empty() => format!("exit code {}", code),
        Some(code) => format!("exit code {}: {}", code, stderr),
        None => stderr.to_string(),
    }
}

fn command_failure(line: &str, output: &ShellOutput) -> String {
    format!("command '{}' failed ({})", line, failure_detail(output))
}
