// Parser module for experiment files
// Reads YAML or JSON experiments and reports mistakes with source context

pub mod error;
pub mod experiment;

pub use error::{ParseError, ParseErrorKind, ParseResult};
pub use experiment::{
    experiment_directory, load_jobs, CommandInput, CommandLines, Experiment, ExperimentParser,
    JobEntry,
};
