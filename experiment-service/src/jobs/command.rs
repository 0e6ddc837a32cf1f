// Commands
// A templated instruction bound to one row of the variable matrix

use crate::jobs::template::{Template, TemplateError};
use crate::variables::Binding;

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Placeholder names that always resolve to the rendered auxiliary fields
pub const RESERVED_NAMES: [&str; 2] = ["creates", "requires"];

/// Errors raised while binding a command template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("the following variables are not defined: {}", .names.join(", "))]
    MissingVariables { names: Vec<String> },

    #[error("'{name}' is a reserved name and cannot be used as a variable")]
    ReservedVariable { name: String },

    #[error("invalid template: {0}")]
    Template(#[from] TemplateError),

    #[error("a command needs at least one line")]
    EmptyCommand,
}

/// The unbound text of a command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandTemplate {
    pub cmd: Vec<String>,
    pub creates: String,
    pub requires: String,
}

impl CommandTemplate {
    pub fn new(cmd: Vec<String>) -> Self {
        Self {
            cmd,
            ..Default::default()
        }
    }

    pub fn with_creates(mut self, creates: impl Into<String>) -> Self {
        self.creates = creates.into();
        self
    }

    pub fn with_requires(mut self, requires: impl Into<String>) -> Self {
        self.requires = requires.into();
        self
    }

    /// Bind the template to one binding
    pub fn bind(&self, variables: &Binding) -> Result<Command, CommandError> {
        Command::new(self.clone(), variables.clone())
    }

    /// Bind the template to every row of a matrix, dropping rendered duplicates
    pub fn bind_all<'a, I>(&self, matrix: I) -> Result<Vec<Command>, CommandError>
    where
        I: IntoIterator<Item = &'a Binding>,
    {
        let commands = matrix
            .into_iter()
            .map(|binding| self.bind(binding))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(uniqueify(commands))
    }
}

impl From<&str> for CommandTemplate {
    fn from(cmd: &str) -> Self {
        Self::new(vec![cmd.to_string()])
    }
}

impl From<String> for CommandTemplate {
    fn from(cmd: String) -> Self {
        Self::new(vec![cmd])
    }
}

impl From<Vec<String>> for CommandTemplate {
    fn from(cmd: Vec<String>) -> Self {
        Self::new(cmd)
    }
}

impl From<Vec<&str>> for CommandTemplate {
    fn from(cmd: Vec<&str>) -> Self {
        Self::new(cmd.into_iter().map(String::from).collect())
    }
}

/// A command template bound to a single binding
///
/// Construction checks that every placeholder is covered by the binding, so
/// the rendered accessors never fail.
#[derive(Debug, Clone)]
pub struct Command {
    lines: Vec<Template>,
    creates: Template,
    requires: Template,
    variables: Binding,
}

impl Command {
    pub fn new(
        template: impl Into<CommandTemplate>,
        variables: Binding,
    ) -> Result<Self, CommandError> {
        let template = template.into();
        if template.cmd.is_empty() {
            return Err(CommandError::EmptyCommand);
        }

        if let Some(name) = RESERVED_NAMES
            .iter()
            .find(|name| variables.contains_key(**name))
        {
            return Err(CommandError::ReservedVariable {
                name: name.to_string(),
            });
        }

        let lines = template
            .cmd
            .iter()
            .map(|line| Template::parse(line))
            .collect::<Result<Vec<_>, _>>()?;
        let creates = Template::parse(&template.creates)?;
        let requires = Template::parse(&template.requires)?;

        let mut referenced: BTreeSet<&str> = lines
            .iter()
            .flat_map(Template::variables)
            .filter(|name| !RESERVED_NAMES.contains(name))
            .collect();
        // auxiliary templates see only the binding
        referenced.extend(creates.variables());
        referenced.extend(requires.variables());

        let missing: Vec<String> = referenced
            .into_iter()
            .filter(|name| !variables.contains_key(*name))
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            return Err(CommandError::MissingVariables { names: missing });
        }

        Ok(Self {
            lines,
            creates,
            requires,
            variables,
        })
    }

    pub fn variables(&self) -> &Binding {
        &self.variables
    }

    /// Placeholder names used by the command lines, excluding reserved names
    pub fn get_variables(&self) -> BTreeSet<String> {
        self.lines
            .iter()
            .flat_map(Template::variables)
            .filter(|name| !RESERVED_NAMES.contains(name))
            .map(String::from)
            .collect()
    }

    pub fn creates(&self) -> String {
        self.creates.render(|name| self.lookup(name))
    }

    pub fn requires(&self) -> String {
        self.requires.render(|name| self.lookup(name))
    }

    /// The rendered command lines
    pub fn cmd(&self) -> Vec<String> {
        let creates = self.creates();
        let requires = self.requires();
        self.lines
            .iter()
            .map(|line| {
                line.render(|name| match name {
                    "creates" => Some(creates.clone()),
                    "requires" => Some(requires.clone()),
                    _ => self.lookup(name),
                })
            })
            .collect()
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.variables.get(name).map(ToString::to_string)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cmd().join(" && "))
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.cmd() == other.cmd()
    }
}

impl Eq for Command {}

impl Hash for Command {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cmd().hash(state);
    }
}

/// Remove duplicates, keeping the first occurrence of each item
pub fn uniqueify<T>(items: impl IntoIterator<Item = T>) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::Scalar;

    fn binding(pairs: &[(&str, &str)]) -> Binding {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Scalar::from(*v)))
            .collect()
    }

    #[test]
    fn test_command_simple() {
        let command = Command::new("test", Binding::new()).unwrap();
        assert_eq!(command.cmd(), vec!["test"]);
        assert_eq!(command.to_string(), "test");
    }

    #[test]
    fn test_command_substitution() {
        let command = Command::new("test {var1}", binding(&[("var1", "1.0")])).unwrap();
        assert_eq!(command.cmd(), vec!["test 1.0"]);
    }

    #[test]
    fn test_numeric_values_render() {
        let variables: Binding = [
            ("n".to_string(), Scalar::Int(4)),
            ("t".to_string(), Scalar::Float(0.5)),
            ("flag".to_string(), Scalar::Bool(false)),
        ]
        .into_iter()
        .collect();
        let command = Command::new("run -n {n} -t {t} --flag {flag}", variables).unwrap();
        assert_eq!(command.to_string(), "run -n 4 -t 0.5 --flag False");
    }

    #[test]
    fn test_creates_substitution() {
        let template = CommandTemplate::from("test {var1} {creates}").with_creates("test.out");
        let command = template.bind(&binding(&[("var1", "1.0")])).unwrap();
        assert_eq!(command.cmd(), vec!["test 1.0 test.out"]);
    }

    #[test]
    fn test_requires_substitution() {
        let template = CommandTemplate::from("test {var1} {requires}").with_requires("test.in");
        let command = template.bind(&binding(&[("var1", "1.0")])).unwrap();
        assert_eq!(command.cmd(), vec!["test 1.0 test.in"]);
    }

    #[test]
    fn test_creates_references_binding() {
        let template =
            CommandTemplate::from("test {var1} {creates}").with_creates("out-{var1}.txt");
        let command = template.bind(&binding(&[("var1", "1.0")])).unwrap();
        assert_eq!(command.creates(), "out-1.0.txt");
        assert_eq!(command.cmd(), vec!["test 1.0 out-1.0.txt"]);
    }

    #[test]
    fn test_unset_creates_is_empty() {
        let command = Command::new("touch {creates}", Binding::new()).unwrap();
        assert_eq!(command.creates(), "");
        assert_eq!(command.cmd(), vec!["touch "]);
    }

    #[test]
    fn test_missing_variables() {
        assert_eq!(
            Command::new("{test}", Binding::new()).unwrap_err(),
            CommandError::MissingVariables {
                names: vec!["test".to_string()]
            }
        );
        assert_eq!(
            Command::new("{test2} {test1} {test2}", binding(&[("test1", "")])).unwrap_err(),
            CommandError::MissingVariables {
                names: vec!["test2".to_string()]
            }
        );
    }

    #[test]
    fn test_missing_variable_in_creates() {
        let template = CommandTemplate::from("echo").with_creates("{missing}.out");
        assert!(matches!(
            template.bind(&Binding::new()).unwrap_err(),
            CommandError::MissingVariables { .. }
        ));
    }

    #[test]
    fn test_creates_cannot_reference_itself() {
        let template = CommandTemplate::from("echo").with_creates("{creates}.out");
        assert!(template.bind(&Binding::new()).is_err());
    }

    #[test]
    fn test_reserved_variable_rejected() {
        assert_eq!(
            Command::new("echo", binding(&[("creates", "x")])).unwrap_err(),
            CommandError::ReservedVariable {
                name: "creates".to_string()
            }
        );
    }

    #[test]
    fn test_empty_and_malformed() {
        assert_eq!(
            Command::new(Vec::<String>::new(), Binding::new()).unwrap_err(),
            CommandError::EmptyCommand
        );
        assert!(matches!(
            Command::new("echo {x", binding(&[("x", "1")])).unwrap_err(),
            CommandError::Template(_)
        ));
    }

    #[test]
    fn test_cmd_list() {
        let command = Command::new(vec!["test"; 5], Binding::new()).unwrap();
        assert_eq!(command.cmd(), vec!["test"; 5]);
        assert_eq!(command.to_string(), vec!["test"; 5].join(" && "));
    }

    #[test]
    fn test_get_variables() {
        let command = Command::new(
            vec!["{a}{b}", "{a} {creates}"],
            binding(&[("a", "1"), ("b", "2"), ("c", "3")]),
        )
        .unwrap();
        let expected: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(command.get_variables(), expected);
        assert!(Command::new("test", Binding::new())
            .unwrap()
            .get_variables()
            .is_empty());
    }

    #[test]
    fn test_equality_uses_rendered_text() {
        let a = Command::new("echo {x}", binding(&[("x", "1"), ("y", "2")])).unwrap();
        let b = Command::new("echo 1", Binding::new()).unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_uniqueify_commands() {
        let commands: Vec<_> = (0..5)
            .map(|_| Command::new("test", Binding::new()).unwrap())
            .collect();
        assert_eq!(uniqueify(commands).len(), 1);
    }

    #[test]
    fn test_uniqueify_keeps_first_order() {
        assert_eq!(uniqueify(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }

    #[test]
    fn test_bind_all_deduplicates() {
        let matrix = vec![
            binding(&[("x", "1"), ("y", "a")]),
            binding(&[("x", "1"), ("y", "b")]),
            binding(&[("x", "2"), ("y", "a")]),
        ];
        let commands = CommandTemplate::from("echo {x}").bind_all(&matrix).unwrap();
        let rendered: Vec<_> = commands.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["echo 1", "echo 2"]);
    }
}
