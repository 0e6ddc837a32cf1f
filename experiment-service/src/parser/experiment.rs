// Experiment Parser
// Loads experiment files and turns them into jobs

use crate::error::{ServiceError, ServiceResult};
use crate::jobs::{CommandTemplate, Job};
use crate::parser::error::{suggest_key, ParseError, ParseErrorKind, ParseResult};
use crate::scheduler::options::option_text;
use crate::scheduler::Scheduler;
use crate::variables::{MatrixExpander, VariableMatrix, VariableSpec};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Command lines: one string or several run one after another
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandLines {
    Single(String),
    Multiple(Vec<String>),
}

impl From<CommandLines> for Vec<String> {
    fn from(lines: CommandLines) -> Self {
        match lines {
            CommandLines::Single(line) => vec![line],
            CommandLines::Multiple(lines) => lines,
        }
    }
}

/// The `command` value of a job
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandInput {
    Lines(CommandLines),
    Detailed {
        #[serde(alias = "cmd")]
        command: CommandLines,
        #[serde(default)]
        creates: Option<Value>,
        #[serde(default)]
        requires: Option<Value>,
    },
}

impl CommandInput {
    pub fn into_template(self) -> CommandTemplate {
        match self {
            CommandInput::Lines(lines) => CommandTemplate::new(lines.into()),
            CommandInput::Detailed {
                command,
                creates,
                requires,
            } => CommandTemplate::new(command.into())
                .with_creates(creates.as_ref().map(option_text).unwrap_or_default())
                .with_requires(requires.as_ref().map(option_text).unwrap_or_default()),
        }
    }
}

/// Top-level `command`: a list means one job per element
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TopLevelCommand {
    PerJob(Vec<CommandInput>),
    Single(CommandInput),
}

/// One entry of `jobs`
#[derive(Debug, Clone, Deserialize)]
pub struct JobEntry {
    pub command: CommandInput,
}

/// File layout as written by users
#[derive(Debug, Deserialize)]
struct ExperimentFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    variables: Option<Value>,
    #[serde(default)]
    command: Option<TopLevelCommand>,
    #[serde(default)]
    jobs: Option<Vec<JobEntry>>,
    #[serde(default)]
    scheduler: Option<Mapping>,
    #[serde(default)]
    shell: Option<Mapping>,
    #[serde(default)]
    pbs: Option<Mapping>,
    #[serde(default)]
    slurm: Option<Mapping>,
}

/// A loaded experiment
#[derive(Debug, Clone)]
pub struct Experiment {
    pub name: Option<String>,
    pub variables: VariableSpec,
    /// One command template per job, in file order
    pub jobs: Vec<CommandTemplate>,
    /// Options shared by every scheduler
    pub scheduler: Mapping,
    pub shell: Option<Mapping>,
    pub pbs: Option<Mapping>,
    pub slurm: Option<Mapping>,
}

impl Experiment {
    /// Options written under the scheduler's own key
    pub fn section(&self, scheduler: Scheduler) -> Option<&Mapping> {
        match scheduler {
            Scheduler::Shell => self.shell.as_ref(),
            Scheduler::Pbs => self.pbs.as_ref(),
            Scheduler::Slurm => self.slurm.as_ref(),
        }
    }

    /// The scheduler named by a non-empty section, checking pbs, slurm, shell
    pub fn declared_scheduler(&self) -> Option<Scheduler> {
        [Scheduler::Pbs, Scheduler::Slurm, Scheduler::Shell]
            .into_iter()
            .find(|scheduler| {
                self.section(*scheduler)
                    .map(|section| !section.is_empty())
                    .unwrap_or(false)
            })
    }

    pub fn matrix(&self) -> ServiceResult<VariableMatrix> {
        let matrix = MatrixExpander::expand(&self.variables)?;
        if matrix.is_empty() {
            return Err(ServiceError::EmptyMatrix);
        }
        Ok(matrix)
    }

    /// Shared options overlaid with the scheduler's section, named after the experiment
    pub fn scheduler_options(&self, scheduler: Scheduler) -> Mapping {
        let mut options = self.scheduler.clone();
        if let Some(section) = self.section(scheduler) {
            for (key, value) in section {
                options.insert(key.clone(), value.clone());
            }
        }
        if let Some(name) = &self.name {
            let key = Value::from("name");
            if !options.contains_key(&key) {
                options.insert(key, Value::from(name.as_str()));
            }
        }
        options
    }

    /// Expand the variables once and bind every job's command to the matrix
    pub fn build_jobs(
        &self,
        scheduler: Scheduler,
        directory: Option<&Path>,
        use_dependencies: bool,
    ) -> ServiceResult<Vec<Job>> {
        let matrix = self.matrix()?;
        let options = self.scheduler_options(scheduler);
        debug!(
            bindings = matrix.len(),
            jobs = self.jobs.len(),
            "building jobs"
        );

        self.jobs
            .iter()
            .map(|template| -> ServiceResult<Job> {
                let commands = template.bind_all(&matrix)?;
                let job = Job::with_options(
                    commands,
                    Some(options.clone()),
                    directory.map(Path::to_path_buf),
                    use_dependencies,
                )?;
                Ok(job)
            })
            .collect()
    }
}

/// Reads experiment files
pub struct ExperimentParser;

impl ExperimentParser {
    /// Parse YAML experiment content
    pub fn parse(content: &str) -> ParseResult<Experiment> {
        let value: Value =
            serde_yaml::from_str(content).map_err(|e| ParseError::from_yaml_error(&e, content))?;
        Self::from_value(value, content)
    }

    /// Parse JSON experiment content
    pub fn parse_json(content: &str) -> ParseResult<Experiment> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| ParseError::from_json_error(&e, content))?;
        Self::from_value(value, content)
    }

    /// Read an experiment file; `.json` files are read as JSON
    pub fn parse_file(path: impl AsRef<Path>) -> ParseResult<Experiment> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ParseError::unlocated(
                format!("failed to read {}: {}", path.display(), e),
                ParseErrorKind::IoError,
            )
        })?;
        info!(file = %path.display(), "loading experiment");

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse(&content)
        }
    }

    fn from_value(value: Value, source: &str) -> ParseResult<Experiment> {
        let Value::Mapping(top) = &value else {
            return Err(ParseError::unlocated(
                "an experiment file must be a mapping of keys",
                ParseErrorKind::InvalidSchema,
            ));
        };
        let suggestion = misspelt_keys(top);

        let file: ExperimentFile = serde_yaml::from_value(value.clone()).map_err(|e| {
            ParseError::unlocated(e.to_string(), ParseErrorKind::InvalidSchema)
        })?;

        let variables = file.variables.ok_or_else(|| {
            let err = ParseError::unlocated(
                "the key 'variables' was not found in the input file",
                ParseErrorKind::MissingField,
            );
            match suggestion.iter().find(|(_, correct)| *correct == "variables") {
                Some((found, correct)) => {
                    err.with_suggestion(format!("found '{}', did you mean '{}'?", found, correct))
                }
                None => err,
            }
        })?;
        if !variables.is_mapping() {
            return Err(ParseError::unlocated(
                "'variables' must be a mapping of variable names to values",
                ParseErrorKind::InvalidVariables,
            )
            .at_key(source, "variables"));
        }
        let variables = VariableSpec::from_yaml(&variables).map_err(|e| {
            ParseError::unlocated(e.to_string(), ParseErrorKind::InvalidVariables)
                .at_key(source, "variables")
        })?;

        let jobs: Vec<CommandTemplate> = match (file.jobs, file.command) {
            (Some(jobs), _) => jobs
                .into_iter()
                .map(|entry| entry.command.into_template())
                .collect(),
            (None, Some(TopLevelCommand::PerJob(commands))) => commands
                .into_iter()
                .map(CommandInput::into_template)
                .collect(),
            (None, Some(TopLevelCommand::Single(command))) => vec![command.into_template()],
            (None, None) => {
                let err = ParseError::unlocated(
                    "the experiment has no 'command' or 'jobs' to run",
                    ParseErrorKind::MissingField,
                );
                return Err(
                    match suggestion.iter().find(|(_, correct)| *correct != "variables") {
                        Some((found, correct)) => err.with_suggestion(format!(
                            "found '{}', did you mean '{}'?",
                            found, correct
                        )),
                        None => err,
                    },
                );
            }
        };

        Ok(Experiment {
            name: file.name,
            variables,
            jobs,
            scheduler: file.scheduler.unwrap_or_default(),
            shell: file.shell,
            pbs: file.pbs,
            slurm: file.slurm,
        })
    }
}

/// Top-level keys that look like misspellings of known keys
fn misspelt_keys(top: &Mapping) -> Vec<(String, &'static str)> {
    top.keys()
        .filter_map(Value::as_str)
        .filter_map(|key| suggest_key(key).map(|correct| (key.to_string(), correct)))
        .filter(|(_, correct)| !top.contains_key(*correct))
        .collect()
}

/// Load an experiment file and build its jobs, running from the file's directory
pub fn load_jobs(
    path: &Path,
    scheduler: Option<Scheduler>,
    use_dependencies: bool,
) -> ServiceResult<(Scheduler, PathBuf, Vec<Job>)> {
    let experiment = ExperimentParser::parse_file(path)?;
    let scheduler = Scheduler::determine(scheduler, &experiment);
    let directory = experiment_directory(path);
    let jobs = experiment.build_jobs(scheduler, Some(&directory), use_dependencies)?;
    Ok((scheduler, directory, jobs))
}

/// Directory an experiment runs in
pub fn experiment_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobError;
    use std::fs;
    use tempfile::TempDir;

    fn rendered(job: &Job) -> Vec<String> {
        job.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_single_command() {
        let experiment = ExperimentParser::parse(
            r#"
name: sweep
variables:
  a: [1, 2]
command: echo {a}
"#,
        )
        .unwrap();

        let jobs = experiment.build_jobs(Scheduler::Shell, None, false).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(rendered(&jobs[0]), vec!["echo 1", "echo 2"]);
    }

    #[test]
    fn test_command_list_is_one_job_each() {
        let experiment = ExperimentParser::parse(
            r#"
variables:
  a: [1, 2]
command:
  - echo {a}
  - echo done
"#,
        )
        .unwrap();

        let jobs = experiment.build_jobs(Scheduler::Shell, None, false).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(rendered(&jobs[0]), vec!["echo 1", "echo 2"]);
        // identical renderings collapse into one command
        assert_eq!(rendered(&jobs[1]), vec!["echo done"]);
    }

    #[test]
    fn test_jobs_section() {
        let experiment = ExperimentParser::parse(
            r#"
variables:
  n: [1, 2]
jobs:
  - command:
      cmd: [mkdir -p out, "run {n} > {creates}"]
      creates: out/{n}.txt
  - command: collect out
"#,
        )
        .unwrap();

        let jobs = experiment.build_jobs(Scheduler::Shell, None, false).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(
            rendered(&jobs[0]),
            vec![
                "mkdir -p out && run 1 > out/1.txt",
                "mkdir -p out && run 2 > out/2.txt"
            ]
        );
        assert_eq!(jobs[0].all_commands()[0].creates(), "out/1.txt");
        assert_eq!(rendered(&jobs[1]), vec!["collect out"]);
    }

    #[test]
    fn test_detailed_command_key() {
        let experiment = ExperimentParser::parse(
            "variables: {x: 1}\ncommand: {command: 'echo {x}', requires: 5}",
        )
        .unwrap();
        assert_eq!(experiment.jobs[0].requires, "5");
        assert_eq!(experiment.jobs[0].cmd, vec!["echo {x}"]);
    }

    #[test]
    fn test_missing_variables() {
        let err = ExperimentParser::parse("command: echo").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingField);
        assert!(err.message.contains("'variables' was not found"));

        let err = ExperimentParser::parse("variable: {a: 1}\ncommand: echo").unwrap_err();
        assert_eq!(
            err.suggestion.as_deref(),
            Some("found 'variable', did you mean 'variables'?")
        );
    }

    #[test]
    fn test_missing_command() {
        let err = ExperimentParser::parse("variables: {a: 1}").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingField);

        let err = ExperimentParser::parse("variables: {a: 1}\ncomand: echo").unwrap_err();
        assert!(err.suggestion.unwrap().contains("'command'"));
    }

    #[test]
    fn test_invalid_variables_located() {
        let source = "name: x\nvariables:\n  a: {product: [1, 2]}\ncommand: echo {a}";
        let err = ExperimentParser::parse(source).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidVariables);
        assert_eq!(err.line, 2);
        assert!(err.message.contains("product"));

        let err = ExperimentParser::parse("variables: [1, 2]\ncommand: echo").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidVariables);
    }

    #[test]
    fn test_yaml_syntax_error() {
        let err = ExperimentParser::parse("variables:\n  a: [1, 2\ncommand: echo").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::YamlSyntax);
    }

    #[test]
    fn test_scheduler_options_overlay() {
        let experiment = ExperimentParser::parse(
            r#"
name: sweep
variables: {a: 1}
command: echo
scheduler:
  walltime: "1:00"
  ncpus: 2
pbs:
  ncpus: 4
"#,
        )
        .unwrap();

        let options = experiment.scheduler_options(Scheduler::Pbs);
        assert_eq!(options.get("ncpus"), Some(&Value::from(4)));
        assert_eq!(options.get("walltime"), Some(&Value::from("1:00")));
        assert_eq!(options.get("name"), Some(&Value::from("sweep")));

        let options = experiment.scheduler_options(Scheduler::Slurm);
        assert_eq!(options.get("ncpus"), Some(&Value::from(2)));
    }

    #[test]
    fn test_explicit_name_kept() {
        let experiment = ExperimentParser::parse(
            "name: sweep\nvariables: {a: 1}\ncommand: echo\nscheduler: {name: custom}",
        )
        .unwrap();
        let options = experiment.scheduler_options(Scheduler::Pbs);
        assert_eq!(options.get("name"), Some(&Value::from("custom")));
    }

    #[test]
    fn test_missing_binding_fails_build() {
        let experiment =
            ExperimentParser::parse("variables: {a: 1}\ncommand: echo {b}").unwrap();
        assert!(matches!(
            experiment.build_jobs(Scheduler::Shell, None, false),
            Err(ServiceError::Command(_))
        ));
    }

    #[test]
    fn test_empty_matrix() {
        let experiment =
            ExperimentParser::parse("variables: {a: []}\ncommand: echo {a}").unwrap();
        assert!(matches!(experiment.matrix(), Err(ServiceError::EmptyMatrix)));
    }

    #[test]
    fn test_dependencies_need_directory() {
        let experiment = ExperimentParser::parse("variables: {a: 1}\ncommand: echo").unwrap();
        assert!(matches!(
            experiment.build_jobs(Scheduler::Shell, None, true),
            Err(ServiceError::Job(JobError::MissingDirectory))
        ));
    }

    #[test]
    fn test_parse_file_json_and_yaml() {
        let dir = TempDir::new().unwrap();

        let json = dir.path().join("experiment.json");
        fs::write(
            &json,
            r#"{"variables": {"a": [1, 2]}, "command": "echo {a}"}"#,
        )
        .unwrap();
        let experiment = ExperimentParser::parse_file(&json).unwrap();
        assert_eq!(experiment.matrix().unwrap().len(), 2);

        let yaml = dir.path().join("experiment.yml");
        fs::write(&yaml, "variables: {a: [1, 2, 3]}\ncommand: echo {a}").unwrap();
        let (scheduler, directory, jobs) =
            load_jobs(&yaml, Some(Scheduler::Shell), true).unwrap();
        assert_eq!(scheduler, Scheduler::Shell);
        assert_eq!(directory, dir.path());
        assert_eq!(jobs[0].len(), 3);
    }

    #[test]
    fn test_parse_file_missing() {
        let err = ExperimentParser::parse_file("/nonexistent/experiment.yml").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::IoError);
    }

    #[test]
    fn test_experiment_directory() {
        assert_eq!(
            experiment_directory(Path::new("experiment.yml")),
            PathBuf::from(".")
        );
        assert_eq!(
            experiment_directory(Path::new("runs/a/experiment.yml")),
            PathBuf::from("runs/a")
        );
    }
}
