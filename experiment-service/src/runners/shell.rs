// Shell Runner
// Runs command lines through a shell, streaming their output

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Output collected from a finished process
#[derive(Debug, Clone, Default)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None when the process could not start or was killed by a signal)
    pub exit_code: Option<i32>,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn failed_to_start(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            exit_code: None,
        }
    }
}

/// Callback for handling output lines in real-time; the flag marks stderr
pub type OutputCallback = Box<dyn Fn(&str, bool) + Send + Sync>;

/// Runs processes for the job runner
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `<shell> -c <script>` in `working_dir`
    pub async fn run_script(
        &self,
        shell: &str,
        script: &str,
        working_dir: &Path,
        on_output: Option<OutputCallback>,
    ) -> ShellOutput {
        let args = ["-c".to_string(), script.to_string()];
        self.run_program(shell, &args, working_dir, on_output).await
    }

    /// Run a program with arguments in `working_dir`
    pub async fn run_program(
        &self,
        program: &str,
        args: &[String],
        working_dir: &Path,
        on_output: Option<OutputCallback>,
    ) -> ShellOutput {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.current_dir(working_dir);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ShellOutput::failed_to_start(format!(
                    "Failed to spawn process '{}': {}",
                    program, e
                ))
            }
        };

        let on_output = on_output.map(Arc::new);
        let stdout_handle = child
            .stdout
            .take()
            .map(|stdout| collect_lines(stdout, on_output.clone(), false));
        let stderr_handle = child
            .stderr
            .take()
            .map(|stderr| collect_lines(stderr, on_output, true));

        let wait_result = child.wait().await;

        ShellOutput {
            stdout: join_output(stdout_handle).await,
            stderr: join_output(stderr_handle).await,
            exit_code: wait_result.ok().and_then(|status| status.code()),
        }
    }
}

fn collect_lines<R>(
    reader: R,
    on_output: Option<Arc<OutputCallback>>,
    is_stderr: bool,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut output = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(callback) = &on_output {
                callback(&line, is_stderr);
            }
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&line);
        }
        output
    })
}

async fn join_output(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_script_captures_output() {
        let dir = TempDir::new().unwrap();
        let output = ShellRunner::new()
            .run_script("sh", "echo hello; echo oops >&2", dir.path(), None)
            .await;

        assert!(output.success());
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr, "oops");
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = TempDir::new().unwrap();
        ShellRunner::new()
            .run_script("sh", "touch marker", dir.path(), None)
            .await;
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_exit_code() {
        let dir = TempDir::new().unwrap();
        let output = ShellRunner::new()
            .run_script("sh", "exit 3", dir.path(), None)
            .await;
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_streaming_callback() {
        let dir = TempDir::new().unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let callback: OutputCallback = Box::new(move |line, is_stderr| {
            sink.lock().unwrap().push((line.to_string(), is_stderr));
        });

        ShellRunner::new()
            .run_script("sh", "echo a; echo b", dir.path(), Some(callback))
            .await;

        let lines = lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![("a".to_string(), false), ("b".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = TempDir::new().unwrap();
        let output = ShellRunner::new()
            .run_program("experi-no-such-program", &[], dir.path(), None)
            .await;
        assert_eq!(output.exit_code, None);
        assert!(output.stderr.contains("Failed to spawn"));
    }
}
