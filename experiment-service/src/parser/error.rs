// Experiment file errors
// Location, source context and suggestions for mistakes in experiment files

use std::fmt;

/// Detailed parse error with location and context
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Line number (1-indexed, 0 when unknown)
    pub line: usize,
    /// Column number (1-indexed, 0 when unknown)
    pub column: usize,
    /// Surrounding source lines
    pub context: String,
    /// Optional suggestion for fixing the error
    pub suggestion: Option<String>,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// YAML syntax error
    YamlSyntax,
    /// JSON syntax error
    JsonSyntax,
    /// Wrong types for known keys
    InvalidSchema,
    /// A required key is absent
    MissingField,
    /// The variables tree is malformed
    InvalidVariables,
    /// File could not be read
    IoError,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            context: String::new(),
            suggestion: None,
            kind: ParseErrorKind::InvalidSchema,
        }
    }

    /// An error with no position in the source
    pub fn unlocated(message: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self::new(message, 0, 0).with_kind(kind)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_kind(mut self, kind: ParseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    fn with_suggestion_opt(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }

    /// Point the error at the line of a top-level key, when the key is present
    pub fn at_key(mut self, source: &str, key: &str) -> Self {
        if let Some(line) = top_level_key_line(source, key) {
            self.line = line;
            self.column = 1;
            self = self.with_source_context(source, 2);
        }
        self
    }

    /// Attach the lines around the error
    pub fn with_source_context(mut self, source: &str, context_lines: usize) -> Self {
        if self.line == 0 {
            return self;
        }

        let lines: Vec<&str> = source.lines().collect();
        let start = self.line.saturating_sub(context_lines + 1);
        let end = (self.line + context_lines).min(lines.len());

        let mut context = String::new();
        for (i, line) in lines.iter().enumerate().take(end).skip(start) {
            let line_num = i + 1;
            let prefix = if line_num == self.line { ">" } else { " " };
            context.push_str(&format!("{} {:4} | {}\n", prefix, line_num, line));

            if line_num == self.line && self.column > 0 {
                let indicator = " ".repeat(self.column - 1) + "^";
                context.push_str(&format!("       | {}\n", indicator));
            }
        }

        self.context = context;
        self
    }

    pub fn from_yaml_error(err: &serde_yaml::Error, source: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((0, 0));

        let suggestion = suggest_fix(&err.to_string(), source, line);

        ParseError::new(format_serde_message(&err.to_string()), line, column)
            .with_kind(ParseErrorKind::YamlSyntax)
            .with_source_context(source, 2)
            .with_suggestion_opt(suggestion)
    }

    pub fn from_json_error(err: &serde_json::Error, source: &str) -> Self {
        let suggestion = suggest_fix(&err.to_string(), source, err.line());

        ParseError::new(format_serde_message(&err.to_string()), err.line(), err.column())
            .with_kind(ParseErrorKind::JsonSyntax)
            .with_source_context(source, 2)
            .with_suggestion_opt(suggestion)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;
        if self.line > 0 {
            writeln!(f, "  --> line {}:{}", self.line, self.column)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            write!(f, "{}", self.context)?;
        }

        if let Some(suggestion) = &self.suggestion {
            writeln!(f)?;
            writeln!(f, "help: {}", suggestion)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Rewrite serde messages into something more readable
fn format_serde_message(msg: &str) -> String {
    if msg.contains("invalid type") {
        if let (Some(expected), Some(found)) = (
            extract_between(msg, "expected ", " at"),
            extract_between(msg, "invalid type: ", ", expected"),
        ) {
            return format!("expected {}, but found {}", expected, found);
        }
    }

    if let Some(field) = extract_between(msg, "missing field `", "`") {
        return format!("missing required field '{}'", field);
    }

    msg.to_string()
}

fn extract_between(msg: &str, prefix: &str, suffix: &str) -> Option<String> {
    let start = msg.find(prefix)? + prefix.len();
    let end = msg[start..].find(suffix)? + start;
    Some(msg[start..end].to_string())
}

/// 1-indexed line on which an unindented `key:` appears
fn top_level_key_line(source: &str, key: &str) -> Option<usize> {
    source
        .lines()
        .position(|line| {
            line.strip_prefix(key)
                .map(|rest| rest.trim_start().starts_with(':'))
                .unwrap_or(false)
                || line.trim_start().starts_with(&format!("\"{}\"", key))
        })
        .map(|index| index + 1)
}

/// Common misspellings of top-level keys
const KEY_TYPOS: [(&str, &str); 6] = [
    ("variable", "variables"),
    ("vars", "variables"),
    ("commands", "command"),
    ("comand", "command"),
    ("cmds", "command"),
    ("job", "jobs"),
];

/// Suggest the intended key for a misspelt top-level key
pub fn suggest_key(found: &str) -> Option<&'static str> {
    let lower = found.to_lowercase();
    KEY_TYPOS
        .iter()
        .find(|(typo, _)| *typo == lower)
        .map(|(_, correct)| *correct)
}

fn suggest_fix(msg: &str, source: &str, line: usize) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    let error_line = lines.get(line.saturating_sub(1)).copied().unwrap_or("");

    if error_line.starts_with('\t') || msg.contains("tab") {
        return Some(
            "YAML does not allow tabs for indentation. Replace tabs with spaces.".to_string(),
        );
    }

    if msg.contains("did not find expected key") || msg.contains("mapping values are not allowed")
    {
        if error_line.contains('{') && !error_line.trim_start().starts_with('{') {
            return Some(
                "values starting with '{' are read as mappings; quote commands that contain braces"
                    .to_string(),
            );
        }
        return Some("check the indentation of this line and the one above it".to_string());
    }

    let key = error_line.trim_start().split(':').next().unwrap_or("").trim();
    suggest_key(key).map(|correct| format!("did you mean '{}'?", correct))
}

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;
