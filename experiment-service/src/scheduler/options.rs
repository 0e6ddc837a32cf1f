// Scheduler Options
// Normalises scheduler option aliases and renders batch file headers

use crate::scheduler::Scheduler;
use crate::variables::Scalar;

use serde_yaml::{Mapping, Value};

/// Scheduler options with aliases resolved
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    pub name: String,
    /// Resource requests in insertion order, starting with `select` and `ncpus`
    pub resources: Vec<(String, String)>,
    /// Time limits, starting with `walltime`
    pub time: Vec<(String, String)>,
    pub project: String,
    pub log_dir: String,
    pub email: String,
    pub setup: String,
    /// Unrecognised options, kept in source order
    pub leftovers: Vec<(String, String)>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            name: "Experi_Job".to_string(),
            resources: vec![
                ("select".to_string(), "1".to_string()),
                ("ncpus".to_string(), "1".to_string()),
            ],
            time: vec![("walltime".to_string(), "1:00".to_string())],
            project: String::new(),
            log_dir: String::new(),
            email: String::new(),
            setup: String::new(),
            leftovers: Vec::new(),
        }
    }
}

impl SchedulerOptions {
    pub fn from_mapping(mapping: &Mapping) -> Self {
        let mut options = Self::default();

        for (key, value) in mapping {
            let key = option_text(key);
            match key.as_str() {
                "name" => options.name = option_text(value),
                "select" | "nodes" => set(&mut options.resources, "select", option_text(value)),
                "ncpus" | "cpus" => set(&mut options.resources, "ncpus", option_text(value)),
                "mem" | "memory" => set(&mut options.resources, "mem", option_text(value)),
                "gpus" | "ngpus" => set(&mut options.resources, "ngpus", option_text(value)),
                "walltime" | "cputime" => set(&mut options.time, &key, option_text(value)),
                "project" | "account" => options.project = option_text(value),
                "log" | "logs" | "output" => options.log_dir = option_text(value),
                "email" | "mail" => options.email = joined(value, ","),
                "setup" => options.setup = joined(value, "\n"),
                _ => set(&mut options.leftovers, &key, option_text(value)),
            }
        }

        options
    }

    fn resource(&self, key: &str) -> Option<&str> {
        lookup(&self.resources, key)
    }

    /// Header lines for a batch file, starting with the shebang
    pub fn create_header(&self, scheduler: Scheduler) -> String {
        let mut header = String::from("#!/bin/bash\n");
        match scheduler {
            Scheduler::Shell => self.shell_header(&mut header),
            Scheduler::Pbs => self.pbs_header(&mut header),
            Scheduler::Slurm => self.slurm_header(&mut header),
        }
        header
    }

    fn shell_header(&self, header: &mut String) {
        push_line(header, format!("#SHELL Name: {}", self.name));
        push_line(header, format!("#SHELL Resources: {}", pairs(&self.resources)));
        push_line(header, format!("#SHELL Time Resources: {}", pairs(&self.time)));
        push_line(header, format!("#SHELL Project: {}", self.project));
        push_line(header, format!("#SHELL Log: {}", self.log_dir));
        if !self.email.is_empty() {
            push_line(header, format!("#SHELL Email: {}", self.email));
        }
        for (key, value) in &self.leftovers {
            push_line(header, format!("#SHELL {}: {}", key, value));
        }
    }

    fn pbs_header(&self, header: &mut String) {
        push_line(header, format!("#PBS -N {}", self.name));
        push_line(header, format!("#PBS -l {}", pairs(&self.resources)));
        if !self.project.is_empty() {
            push_line(header, format!("#PBS -P {}", self.project));
        }
        push_line(header, format!("#PBS -l {}", pairs(&self.time)));
        if !self.log_dir.is_empty() {
            push_line(header, format!("#PBS -o {}", self.log_dir));
            // stdout and stderr in one file
            push_line(header, "#PBS -j oe".to_string());
        }
        if !self.email.is_empty() {
            push_line(header, format!("#PBS -M {}", self.email));
            push_line(header, "#PBS -m ae".to_string());
        }
        push_leftovers(header, "#PBS", &self.leftovers);
    }

    fn slurm_header(&self, header: &mut String) {
        push_line(header, format!("#SBATCH --job-name {}", self.name));
        push_line(
            header,
            format!("#SBATCH --cpus-per-task {}", self.resource("ncpus").unwrap_or("1")),
        );
        if let Some(mem) = self.resource("mem").filter(|m| !m.is_empty()) {
            push_line(header, format!("#SBATCH --mem-per-task {}", mem));
        }
        if let Some(gpus) = self.resource("ngpus").filter(|g| !g.is_empty()) {
            push_line(header, format!("#SBATCH --gres=gpu:{}", gpus));
        }
        if !self.project.is_empty() {
            push_line(header, format!("#SBATCH --account {}", self.project));
        }
        push_line(
            header,
            format!(
                "#SBATCH --time {}",
                lookup(&self.time, "walltime").unwrap_or("1:00")
            ),
        );
        if !self.log_dir.is_empty() {
            push_line(header, format!("#SBATCH --output {}/slurm-%A_%a.out", self.log_dir));
        }
        if !self.email.is_empty() {
            push_line(header, format!("#SBATCH --mail-user {}", self.email));
            push_line(header, "#SBATCH --mail-type END,FAIL".to_string());
        }
        push_leftovers(header, "#SBATCH", &self.leftovers);
    }
}

fn push_line(header: &mut String, line: String) {
    header.push_str(&line);
    header.push('\n');
}

fn push_leftovers(header: &mut String, prefix: &str, leftovers: &[(String, String)]) {
    for (key, value) in leftovers {
        let dashes = if key.chars().count() > 1 { "--" } else { "-" };
        push_line(header, format!("{} {}{} {}", prefix, dashes, key, value));
    }
}

fn pairs(items: &[(String, String)]) -> String {
    items
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(":")
}

fn lookup<'a>(items: &'a [(String, String)], key: &str) -> Option<&'a str> {
    items
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Replace an existing entry in place or append a new one
fn set(items: &mut Vec<(String, String)>, key: &str, value: String) {
    match items.iter_mut().find(|(k, _)| k == key) {
        Some((_, existing)) => *existing = value,
        None => items.push((key.to_string(), value)),
    }
}

/// Text of an option value as it should appear in a header
pub(crate) fn option_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Tagged(tagged) => option_text(&tagged.value),
        other => match Scalar::from_yaml(other) {
            Some(scalar) => scalar.to_string(),
            None => serde_json::to_string(other).unwrap_or_default(),
        },
    }
}

fn joined(value: &Value, separator: &str) -> String {
    match value {
        Value::Sequence(items) => items
            .iter()
            .map(option_text)
            .collect::<Vec<_>>()
            .join(separator),
        other => option_text(other),
    }
}
