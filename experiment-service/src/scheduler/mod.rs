// Scheduler Module
// Scheduler selection and batch file generation for PBS and SLURM

pub mod file;
pub mod options;

pub use file::create_scheduler_file;
pub use options::SchedulerOptions;

use crate::parser::Experiment;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler '{0}' was not recognised, possible values are [shell, pbs, slurm]")]
    Unknown(String),

    #[error("the {0} scheduler does not use batch files")]
    NoBatchFile(Scheduler),

    #[error("the shell '{0}' was not found")]
    ShellNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("submitting {file} failed: {message}")]
    SubmitFailed { file: String, message: String },
}

/// Where the jobs of an experiment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheduler {
    /// Run each command locally, in order
    #[default]
    Shell,
    Pbs,
    Slurm,
}

impl Scheduler {
    pub const ALL: [Scheduler; 3] = [Scheduler::Shell, Scheduler::Pbs, Scheduler::Slurm];

    pub fn name(&self) -> &'static str {
        match self {
            Scheduler::Shell => "shell",
            Scheduler::Pbs => "pbs",
            Scheduler::Slurm => "slurm",
        }
    }

    /// File extension of generated batch files
    pub fn extension(&self) -> &'static str {
        self.name()
    }

    /// Command used to queue a batch file
    pub fn submit_executable(&self) -> Option<&'static str> {
        match self {
            Scheduler::Shell => None,
            Scheduler::Pbs => Some("qsub"),
            Scheduler::Slurm => Some("sbatch"),
        }
    }

    /// Arguments making a submission wait on earlier jobs
    pub fn dependency_args(&self, previous: &[String]) -> Vec<String> {
        if previous.is_empty() {
            return Vec::new();
        }
        let afterok = format!("afterok:{}", previous.join(":"));
        match self {
            Scheduler::Shell => Vec::new(),
            Scheduler::Pbs => vec!["-W".to_string(), format!("depend={}", afterok)],
            Scheduler::Slurm => vec!["--dependency".to_string(), afterok],
        }
    }

    /// Pick the scheduler: explicit choice, then the experiment file, then
    /// whichever submit command is installed, then the shell.
    pub fn determine(explicit: Option<Scheduler>, experiment: &Experiment) -> Scheduler {
        if let Some(scheduler) = explicit {
            return scheduler;
        }

        if let Some(scheduler) = experiment.declared_scheduler() {
            debug!(%scheduler, "scheduler selected by experiment file");
            return scheduler;
        }

        Self::discover().unwrap_or_default()
    }

    /// The first batch scheduler whose submit command is on `PATH`
    pub fn discover() -> Option<Scheduler> {
        [Scheduler::Pbs, Scheduler::Slurm].into_iter().find(|scheduler| {
            scheduler
                .submit_executable()
                .map(|exe| which::which(exe).is_ok())
                .unwrap_or(false)
        })
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Scheduler {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|scheduler| scheduler.name() == lower)
            .ok_or_else(|| SchedulerError::Unknown(s.to_string()))
    }
}
