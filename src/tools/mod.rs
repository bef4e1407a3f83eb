/*!
Tool registry: turns discovered commands into callable tools.

Taxonomy
  - action   : first path segment (`create`, `list`, `whoami`, ...)
  - resource : second path segment (`cluster`, `roles`, ...)

An action with any two-segment command under it is hierarchical: its tool
takes a required `resource` selector. An action with only its own
one-segment command is standalone. Tool names are `<prefix>_<action>`, and
`<prefix>_help` is reserved for structured help.

Definitions are recomputed on every listing; discovery itself happened once
in the executor.
*/

mod help;
pub mod schema;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::AdapterError;
use crate::executor::{CommandInfo, CommandRunner, ExecuteResult};

pub const HELP_ACTION: &str = "help";

/// Paths listed in the help tool's schema.
const HELP_PATH_LIMIT: usize = 30;

/* -------------------------------------------------------------------------- */
/* Definitions                                                                */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Standalone,
    Hierarchical(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn is_hierarchical(&self) -> bool {
        self.input_schema["properties"]["resource"].is_object()
    }

    /// Values of the `resource` enum (empty for standalone tools).
    pub fn resource_enum(&self) -> Vec<String> {
        self.input_schema["properties"]["resource"]["enum"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Protocol-neutral tool result: an error flag plus text segments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub is_error: bool,
    pub content: Vec<String>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            is_error: false,
            content: vec![text.into()],
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: vec![text.into()],
        }
    }

    /// stderr first (if any), then stdout; never zero segments.
    pub fn from_execution(result: &ExecuteResult) -> Self {
        let mut content = Vec::new();
        if !result.stderr.is_empty() {
            content.push(result.stderr.clone());
        } else if let Some(err) = &result.error {
            content.push(err.clone());
        }
        if !result.stdout.is_empty() {
            content.push(result.stdout.clone());
        }
        if content.is_empty() {
            content.push(String::new());
        }
        Self {
            is_error: !result.success(),
            content,
        }
    }

    /// Content-block JSON as sent to chat models and printed by the CLI.
    pub fn to_json(&self) -> Value {
        let blocks: Vec<Value> = self
            .content
            .iter()
            .map(|t| json!({ "type": "text", "text": t }))
            .collect();
        json!({ "isError": self.is_error, "content": blocks })
    }

    pub fn joined_text(&self) -> String {
        self.content.join("\n")
    }
}

/* -------------------------------------------------------------------------- */
/* Notice State                                                               */
/* -------------------------------------------------------------------------- */

/// Remembers whether the one-time startup warning was already emitted.
#[derive(Debug, Default)]
pub struct NoticeState {
    warned: AtomicBool,
}

impl NoticeState {
    /// Emit `message` as a warning unless a notice was already emitted.
    /// Returns whether this call emitted it.
    pub fn warn_once(&self, message: &str) -> bool {
        if self.warned.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::warn!("{message}");
        true
    }

    pub fn has_warned(&self) -> bool {
        self.warned.load(Ordering::SeqCst)
    }
}

/* -------------------------------------------------------------------------- */
/* Registry                                                                   */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub prefix: String,
    /// Restrict tools to these actions (in this order).
    pub actions: Option<Vec<String>>,
    /// Actions always treated as standalone, matched case-insensitively.
    /// Unlisted actions are classified by their subcommands.
    pub standalone: Option<Vec<String>>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            prefix: "cli".to_string(),
            actions: None,
            standalone: None,
        }
    }
}

pub struct ToolRegistry {
    runner: Arc<dyn CommandRunner>,
    options: RegistryOptions,
    notices: NoticeState,
}

impl ToolRegistry {
    pub fn new(runner: Arc<dyn CommandRunner>, options: RegistryOptions) -> Self {
        Self {
            runner,
            options,
            notices: NoticeState::default(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.options.prefix
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn notices(&self) -> &NoticeState {
        &self.notices
    }

    pub fn tool_name(&self, action: &str) -> String {
        if self.options.prefix.is_empty() {
            action.to_string()
        } else {
            format!("{}_{action}", self.options.prefix)
        }
    }

    fn commands(&self) -> &[CommandInfo] {
        self.runner.commands()
    }

    /// Candidate actions in discovery order (or whitelist order).
    pub fn actions(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for info in self.commands() {
            let action = info.action();
            if !action.is_empty() && !seen.iter().any(|a| a == action) {
                seen.push(action.to_string());
            }
        }
        match &self.options.actions {
            Some(whitelist) => whitelist
                .iter()
                .filter(|a| seen.iter().any(|s| s == *a))
                .cloned()
                .collect(),
            None => seen,
        }
    }

    /// Distinct second segments under `action`, sorted.
    pub fn available_resources(&self, action: &str) -> Vec<String> {
        self.commands()
            .iter()
            .filter(|c| c.action() == action)
            .filter_map(|c| c.resource().map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn action_kind(&self, action: &str) -> Option<ActionKind> {
        if !self.actions().iter().any(|a| a == action) {
            return None;
        }
        if self.forced_standalone(action) {
            return Some(ActionKind::Standalone);
        }
        let resources = self.available_resources(action);
        Some(if resources.is_empty() {
            ActionKind::Standalone
        } else {
            ActionKind::Hierarchical(resources)
        })
    }

    fn forced_standalone(&self, action: &str) -> bool {
        self.options
            .standalone
            .iter()
            .flatten()
            .any(|a| a.eq_ignore_ascii_case(action))
    }

    pub fn is_standalone(&self, action: &str) -> bool {
        self.action_kind(action) == Some(ActionKind::Standalone)
    }

    fn command(&self, path: &[&str]) -> Option<&CommandInfo> {
        self.commands()
            .iter()
            .find(|c| c.path.len() == path.len() && c.path.iter().zip(path).all(|(a, b)| a == b))
    }

    /// Every tool plus the reserved help tool.
    pub fn hierarchical_tools(&self) -> Vec<ToolDefinition> {
        self.emit_startup_notice();
        let mut tools: Vec<ToolDefinition> = self
            .actions()
            .iter()
            .filter_map(|action| self.tool_definition(action))
            .collect();
        tools.push(self.help_tool());
        tools
    }

    fn tool_definition(&self, action: &str) -> Option<ToolDefinition> {
        let kind = self.action_kind(action)?;
        let own = self.command(&[action]);
        let summary = own
            .map(|c| c.description.trim().trim_end_matches('.').to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| format!("Run '{action}' commands"));
        let help_tool = self.tool_name(HELP_ACTION);

        let (description, input_schema) = match kind {
            ActionKind::Hierarchical(resources) => {
                let flags = self
                    .commands()
                    .iter()
                    .filter(|c| c.action() == action && c.resource().is_some())
                    .flat_map(|c| c.flags.iter());
                (
                    format!(
                        "{summary}. Requires 'resource' (one of: {}). Pass command options in \
                         'flags' keyed by flag name without '--'. Use {help_tool} with \
                         command '{action} <resource>' for the flags of a specific resource.",
                        resources.join(", ")
                    ),
                    schema::hierarchical_schema(action, &resources, flags),
                )
            }
            ActionKind::Standalone => {
                let flags = own.map(|c| c.flags.as_slice()).unwrap_or_default();
                let detail = own
                    .map(|c| c.long_help.trim())
                    .filter(|l| !l.is_empty())
                    .map(|l| format!(" {l}"))
                    .unwrap_or_default();
                (
                    format!(
                        "{summary}.{detail} Takes no resource. Pass command options in 'flags'."
                    ),
                    schema::standalone_schema(flags),
                )
            }
        };
        Some(ToolDefinition {
            name: self.tool_name(action),
            description,
            input_schema,
        })
    }

    fn help_tool(&self) -> ToolDefinition {
        let actions = self.actions();
        let paths: Vec<String> = self
            .commands()
            .iter()
            .filter(|c| actions.iter().any(|a| a == c.action()))
            .map(CommandInfo::joined_path)
            .take(HELP_PATH_LIMIT)
            .collect();
        ToolDefinition {
            name: self.tool_name(HELP_ACTION),
            description: format!(
                "Structured help for the {} tools: available actions, resources, flags and \
                 example arguments. Pass 'command' (e.g. 'create cluster') and/or 'resource'.",
                self.options.prefix
            ),
            input_schema: schema::help_schema(&paths),
        }
    }

    fn emit_startup_notice(&self) {
        if self.notices.has_warned() {
            return;
        }
        if let Some(whitelist) = &self.options.actions {
            let present = self.actions();
            let missing: Vec<&str> = whitelist
                .iter()
                .filter(|a| !present.iter().any(|p| p == *a))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                self.notices.warn_once(&format!(
                    "configured actions not found in the command tree: {}",
                    missing.join(", ")
                ));
                return;
            }
        }
        if self.runner.runs_terminating_in_process() {
            self.notices.warn_once(
                "in-process policy is active and some commands may terminate the process; \
                 a failing call to one of them ends this server",
            );
        }
    }

    /// Route a tool call to the executor (or to structured help).
    pub fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, AdapterError> {
        let action = self.action_from_tool_name(name)?;
        if action == HELP_ACTION {
            return Ok(self.structured_help(&arguments));
        }
        let kind = self
            .action_kind(action)
            .ok_or_else(|| AdapterError::CommandNotFound(action.to_string()))?;

        let path = match kind {
            ActionKind::Standalone => vec![action.to_string()],
            ActionKind::Hierarchical(resources) => {
                let resource = arguments
                    .get("resource")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| AdapterError::MissingRequiredParameter {
                        tool: name.to_string(),
                        parameter: "resource".to_string(),
                        hint: format!("available resources: {}", resources.join(", ")),
                    })?;
                if !resources.iter().any(|r| r == resource) {
                    return Err(AdapterError::InvalidArguments(format!(
                        "unknown resource '{resource}' for {name}; available resources: {}",
                        resources.join(", ")
                    )));
                }
                vec![action.to_string(), resource.to_string()]
            }
        };

        let flags = collect_flags(&arguments)?;
        let args = collect_args(&arguments);
        tracing::debug!(tool = name, ?path, "calling tool");
        let result = self.runner.execute(&path, &flags, &args)?;
        Ok(ToolOutput::from_execution(&result))
    }

    fn action_from_tool_name<'n>(&self, name: &'n str) -> Result<&'n str, AdapterError> {
        let prefix = &self.options.prefix;
        let action = if prefix.is_empty() {
            Some(name)
        } else {
            name.strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
        };
        action
            .filter(|a| !a.is_empty())
            .ok_or_else(|| AdapterError::UnknownTool {
                name: name.to_string(),
                prefix: prefix.clone(),
            })
    }
}

/// Flags from `arguments.flags`, plus stray top-level keys models sometimes
/// flatten; the explicit object wins on conflicts.
fn collect_flags(arguments: &Map<String, Value>) -> Result<Map<String, Value>, AdapterError> {
    let mut flags: Map<String, Value> = arguments
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "resource" | "flags" | "args"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    match arguments.get("flags") {
        None | Some(Value::Null) => {}
        Some(Value::Object(explicit)) => {
            flags.extend(explicit.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        // Some models send the object JSON-encoded.
        Some(Value::String(raw)) if raw.trim().is_empty() => {}
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(explicit)) => flags.extend(explicit),
            _ => {
                return Err(AdapterError::InvalidArguments(
                    "'flags' must be an object".to_string(),
                ));
            }
        },
        Some(_) => {
            return Err(AdapterError::InvalidArguments(
                "'flags' must be an object".to_string(),
            ));
        }
    }
    Ok(flags)
}

fn collect_args(arguments: &Map<String, Value>) -> Vec<String> {
    match arguments.get("args") {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
