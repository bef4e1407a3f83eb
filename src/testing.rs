//! Test fakes shared by the registry, server and chat unit tests.

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::AdapterError;
use crate::executor::{CommandInfo, CommandRunner, ExecuteResult, ExecutionMode, FlagInfo};
use crate::tree::{FlagKind, HandlerStyle};

/// One recorded `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub path: Vec<String>,
    pub flags: Map<String, Value>,
    pub args: Vec<String>,
}

/// Runner that records calls and answers with canned output.
pub(crate) struct RecordingRunner {
    commands: Vec<CommandInfo>,
    pub calls: Mutex<Vec<Call>>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RecordingRunner {
    pub fn new(commands: Vec<CommandInfo>) -> Self {
        Self {
            commands,
            calls: Mutex::new(Vec::new()),
            stdout: "{\"ok\":true}".to_string(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failing(mut self, stderr: &str) -> Self {
        self.exit_code = 1;
        self.stderr = stderr.to_string();
        self.stdout = String::new();
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn commands(&self) -> &[CommandInfo] {
        &self.commands
    }

    fn execute(
        &self,
        path: &[String],
        flags: &Map<String, Value>,
        args: &[String],
    ) -> Result<ExecuteResult, AdapterError> {
        if !self.commands.iter().any(|c| c.path == path) {
            return Err(AdapterError::command_not_found(path));
        }
        self.calls.lock().push(Call {
            path: path.to_vec(),
            flags: flags.clone(),
            args: args.to_vec(),
        });
        Ok(ExecuteResult {
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            exit_code: self.exit_code,
            error: None,
            mode: ExecutionMode::InProcess,
            truncated: false,
        })
    }

    fn help_text(&self, path: &[String]) -> String {
        format!("builtin help for '{}'", path.join(" "))
    }
}

pub(crate) fn command(path: &[&str], flags: Vec<FlagInfo>) -> CommandInfo {
    CommandInfo {
        path: path.iter().map(|s| s.to_string()).collect(),
        description: format!("{} command", path.join(" ")),
        usage: format!("demo {} [OPTIONS]", path.join(" ")),
        long_help: String::new(),
        example: String::new(),
        flags,
        style: HandlerStyle::ReturnsResult,
        output_flag: None,
    }
}

pub(crate) fn flag(name: &str, kind: FlagKind, help: &str, required: bool) -> FlagInfo {
    FlagInfo {
        name: name.to_string(),
        shorthand: None,
        description: help.to_string(),
        kind,
        required,
        choices: Vec::new(),
    }
}

/// A small fleet-shaped command set.
pub(crate) fn sample_commands() -> Vec<CommandInfo> {
    vec![
        command(&["list"], vec![]),
        command(&["list", "clusters"], vec![flag("all", FlagKind::Boolean, "Show all", false)]),
        command(&["list", "roles"], vec![]),
        command(&["describe"], vec![]),
        command(
            &["describe", "cluster"],
            vec![flag("id", FlagKind::String, "Cluster id", false)],
        ),
        command(&["create"], vec![]),
        command(
            &["create", "cluster"],
            vec![
                flag("name", FlagKind::String, "Cluster name (required)", true),
                flag("replicas", FlagKind::Integer, "Replica count", false),
                flag(
                    "channel",
                    FlagKind::String,
                    "Update channel. One of: stable, fast, candidate",
                    false,
                ),
            ],
        ),
        command(
            &["create", "role"],
            vec![flag("name", FlagKind::String, "Role name", true)],
        ),
        command(&["whoami"], vec![]),
    ]
}
