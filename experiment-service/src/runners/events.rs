// Run Events
// Progress reporting for local execution and batch submission

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for run progress events
pub type ProgressSender = mpsc::UnboundedSender<RunEvent>;

/// Receiver for run progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<RunEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while jobs run or are submitted
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A job is about to run
    JobStarted {
        job_index: usize,
        total_jobs: usize,
        commands: usize,
    },

    /// A command line is starting (or would start, in a dry run)
    CommandStarted {
        job_index: usize,
        shell: String,
        line: String,
    },

    /// One line of command output
    CommandOutput { line: String, is_stderr: bool },

    /// A command line has finished
    CommandCompleted {
        line: String,
        exit_code: Option<i32>,
        duration: Duration,
    },

    /// An old batch file was deleted
    FileRemoved { path: PathBuf },

    /// A batch file was written
    FileWritten { path: PathBuf },

    /// A batch file was queued (or would be, in a dry run)
    JobSubmitted {
        file: PathBuf,
        command: Vec<String>,
        job_id: String,
    },

    /// The submit executable is not installed, so files are only written
    SubmissionSkipped { executable: String },

    /// A failure that stops the remaining jobs
    Failed { message: String },
}
