// Jobs
// An ordered group of commands sharing scheduler options and a working directory

use crate::jobs::command::Command;

use serde_yaml::Mapping;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised while constructing a job
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("skipping commands on existing outputs requires a job directory")]
    MissingDirectory,
}

/// A group of commands run together
#[derive(Debug, Clone)]
pub struct Job {
    commands: Vec<Command>,
    scheduler_options: Option<Mapping>,
    directory: Option<PathBuf>,
    use_dependencies: bool,
    shell: String,
}

impl Job {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            commands,
            scheduler_options: None,
            directory: None,
            use_dependencies: false,
            shell: "bash".to_string(),
        }
    }

    /// Create a job, checking that dependency skipping has a directory to look in
    pub fn with_options(
        commands: Vec<Command>,
        scheduler_options: Option<Mapping>,
        directory: Option<PathBuf>,
        use_dependencies: bool,
    ) -> Result<Self, JobError> {
        if use_dependencies && directory.is_none() {
            return Err(JobError::MissingDirectory);
        }

        Ok(Self {
            scheduler_options,
            directory,
            use_dependencies,
            ..Self::new(commands)
        })
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn scheduler_options(&self) -> Option<&Mapping> {
        self.scheduler_options.as_ref()
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn use_dependencies(&self) -> bool {
        self.use_dependencies
    }

    /// Every stored command, ignoring dependency skipping
    pub fn all_commands(&self) -> &[Command] {
        &self.commands
    }

    /// Commands still to run
    ///
    /// With dependency skipping enabled, a command whose `creates` file
    /// already exists in the job directory is left out. The filesystem is
    /// checked on every call.
    pub fn iter(&self) -> Commands<'_> {
        Commands {
            inner: self.commands.iter(),
            skip_in: self.directory.as_deref().filter(|_| self.use_dependencies),
        }
    }

    /// Number of commands `iter` would yield right now
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Render the commands as a quoted bash array literal
    pub fn as_bash_array(&self) -> String {
        let mut array = String::from("( \\\n");
        for command in self {
            array.push('"');
            array.push_str(&escape_double_quoted(&command.to_string()));
            array.push_str("\" \\\n");
        }
        array.push(')');
        array
    }
}

/// Iterator over the commands of a job that still need to run
pub struct Commands<'a> {
    inner: std::slice::Iter<'a, Command>,
    skip_in: Option<&'a Path>,
}

impl<'a> Iterator for Commands<'a> {
    type Item = &'a Command;

    fn next(&mut self) -> Option<Self::Item> {
        let directory = self.skip_in;
        self.inner.by_ref().find(|command| match directory {
            Some(directory) => !output_exists(directory, command),
            None => true,
        })
    }
}

fn output_exists(directory: &Path, command: &Command) -> bool {
    let creates = command.creates();
    if creates.is_empty() {
        return false;
    }

    let exists = directory.join(&creates).exists();
    if exists {
        debug!(creates = %creates, "skipping command with existing output");
    }
    exists
}

impl<'a> IntoIterator for &'a Job {
    type Item = &'a Command;
    type IntoIter = Commands<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn escape_double_quoted(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::command::CommandTemplate;
    use crate::variables::{Binding, Scalar};
    use std::fs;
    use tempfile::TempDir;

    fn commands(template: CommandTemplate, values: &[&str]) -> Vec<Command> {
        values
            .iter()
            .map(|value| {
                let binding: Binding = [("x".to_string(), Scalar::from(*value))]
                    .into_iter()
                    .collect();
                template.bind(&binding).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_iteration_keeps_order() {
        let job = Job::new(commands("echo {x}".into(), &["a", "b", "c"]));
        let rendered: Vec<_> = job.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["echo a", "echo b", "echo c"]);
        assert_eq!(job.len(), 3);
        assert_eq!(job.shell(), "bash");
    }

    #[test]
    fn test_dependencies_require_directory() {
        let err = Job::with_options(Vec::new(), None, None, true).unwrap_err();
        assert_eq!(err, JobError::MissingDirectory);
        assert!(Job::with_options(Vec::new(), None, None, false).is_ok());
    }

    #[test]
    fn test_skips_commands_with_existing_output() {
        let dir = TempDir::new().unwrap();
        let template = CommandTemplate::from("touch {creates}").with_creates("{x}.out");
        let job = Job::with_options(
            commands(template, &["a", "b"]),
            None,
            Some(dir.path().to_path_buf()),
            true,
        )
        .unwrap();

        assert_eq!(job.len(), 2);

        fs::write(dir.path().join("a.out"), "").unwrap();
        let rendered: Vec<_> = job.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["touch b.out"]);
        assert_eq!(job.len(), 1);
        assert_eq!(job.all_commands().len(), 2);

        fs::remove_file(dir.path().join("a.out")).unwrap();
        assert_eq!(job.len(), 2);
    }

    #[test]
    fn test_existing_output_ignored_without_flag() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.out"), "").unwrap();
        let template = CommandTemplate::from("touch {creates}").with_creates("{x}.out");
        let job = Job::with_options(
            commands(template, &["a"]),
            None,
            Some(dir.path().to_path_buf()),
            false,
        )
        .unwrap();
        assert_eq!(job.len(), 1);
    }

    #[test]
    fn test_empty_creates_never_skipped() {
        let dir = TempDir::new().unwrap();
        let job = Job::with_options(
            commands("echo {x}".into(), &["a"]),
            None,
            Some(dir.path().to_path_buf()),
            true,
        )
        .unwrap();
        assert!(!job.is_empty());
    }

    #[test]
    fn test_as_bash_array() {
        let job = Job::new(commands("echo {x}".into(), &["a", "b"]));
        assert_eq!(job.as_bash_array(), "( \\\n\"echo a\" \\\n\"echo b\" \\\n)");
    }

    #[test]
    fn test_as_bash_array_joins_lines_and_escapes() {
        let template = CommandTemplate::from(vec!["cd {x}", "echo \"done\""]);
        let job = Job::new(commands(template, &["dir"]));
        assert_eq!(
            job.as_bash_array(),
            "( \\\n\"cd dir && echo \\\"done\\\"\" \\\n)"
        );
    }

    #[test]
    fn test_scheduler_options_pass_through() {
        let mut options = Mapping::new();
        options.insert("walltime".into(), "2:00".into());
        let job = Job::with_options(Vec::new(), Some(options.clone()), None, false)
            .unwrap()
            .with_shell("zsh");
        assert_eq!(job.scheduler_options(), Some(&options));
        assert_eq!(job.shell(), "zsh");
    }
}
