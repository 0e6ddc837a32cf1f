// Service Errors
// Crate-level error aggregating every failure an experiment run can hit

use crate::jobs::{CommandError, JobError};
use crate::parser::ParseError;
use crate::scheduler::SchedulerError;
use crate::variables::ExpandError;

use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("invalid variables: {0}")]
    Expand(#[from] ExpandError),

    #[error("invalid command: {0}")]
    Command(#[from] CommandError),

    #[error("invalid job: {0}")]
    Job(#[from] JobError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("the variables expand to no combinations, so there is nothing to run")]
    EmptyMatrix,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
