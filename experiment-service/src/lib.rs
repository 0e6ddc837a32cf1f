// Experiment Service Library
// Core service for expanding, building and running parameter-sweep experiments

pub mod error;
pub mod jobs;
pub mod parser;
pub mod runners;
pub mod scheduler;
pub mod variables;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

// Re-export variable types
pub use variables::{
    Binding, Combinator, ExpandError, MatrixExpander, Scalar, VariableMatrix, VariableSpec,
};

// Re-export job types
pub use jobs::{Command, CommandError, CommandTemplate, Job, JobError, Template, TemplateError};

// Re-export parser types
pub use parser::{
    experiment_directory, load_jobs, Experiment, ExperimentParser, ParseError, ParseErrorKind,
    ParseResult,
};

// Re-export scheduler types
pub use scheduler::{create_scheduler_file, Scheduler, SchedulerError, SchedulerOptions};

// Re-export runner types
pub use runners::{
    progress_channel, JobRunner, ProgressReceiver, ProgressSender, RunConfig, RunEvent,
    RunOutcome, ShellRunner,
};
