// Jobs Module
// Command templates, bound commands and the jobs that group them

pub mod command;
pub mod job;
pub mod template;

pub use command::{uniqueify, Command, CommandError, CommandTemplate, RESERVED_NAMES};
pub use job::{Commands, Job, JobError};
pub use template::{Template, TemplateError};
