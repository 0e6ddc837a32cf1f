// Scheduler Files
// Renders a job as a PBS or SLURM array job script

use crate::jobs::Job;
use crate::scheduler::options::SchedulerOptions;
use crate::scheduler::{Scheduler, SchedulerError};

use tracing::debug;

/// Array index line; a single command runs without an array
fn array_line(scheduler: Scheduler, num_commands: usize) -> String {
    let (directive, fallback) = match scheduler {
        Scheduler::Slurm => ("#SBATCH", "SLURM_ARRAY_TASK_ID"),
        _ => ("#PBS", "PBS_ARRAY_INDEX"),
    };

    if num_commands > 1 {
        format!("{} -J 0-{}\n", directive, num_commands - 1)
    } else {
        format!("{}=0\n", fallback)
    }
}

/// Render the complete batch script for a job
pub fn create_scheduler_file(scheduler: Scheduler, job: &Job) -> Result<String, SchedulerError> {
    let (workdir, array_index) = match scheduler {
        Scheduler::Pbs => ("$PBS_O_WORKDIR", "$PBS_ARRAY_INDEX"),
        Scheduler::Slurm => ("$SLURM_SUBMIT_DIR", "$SLURM_ARRAY_TASK_ID"),
        Scheduler::Shell => return Err(SchedulerError::NoBatchFile(scheduler)),
    };

    let options = job
        .scheduler_options()
        .map(SchedulerOptions::from_mapping)
        .unwrap_or_default();

    let mut content = options.create_header(scheduler);
    content.push_str(&array_line(scheduler, job.len()));
    content.push_str(&format!(
        "\ncd \"{workdir}\"\n{setup}\n\nCOMMAND={commands}\n\n\
         echo \"${{COMMAND[{index}]}}\"\n{shell} -c \"${{COMMAND[{index}]}}\"\n",
        workdir = workdir,
        setup = options.setup,
        commands = job.as_bash_array(),
        index = array_index,
        shell = job.shell(),
    ));

    debug!(%scheduler, "generated scheduler file:\n{}", content);
    Ok(content)
}
