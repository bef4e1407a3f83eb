//! Structured help served by the reserved `<prefix>_help` tool.
//!
//! Query resolution, most specific first:
//! action + resource, action, resource (which actions support it), overview
//! (empty query). Anything else falls back to the wrapped program's own help.

use std::fmt::Write as _;

use serde_json::{Map, Value, json};

use super::{ActionKind, ToolOutput, ToolRegistry};
use crate::executor::{CommandInfo, FlagInfo};
use crate::tools::schema;
use crate::tree::FlagKind;

impl ToolRegistry {
    pub(crate) fn structured_help(&self, arguments: &Map<String, Value>) -> ToolOutput {
        let command = arguments
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let resource = arguments
            .get("resource")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty());
        let tokens = shell_words::split(command)
            .unwrap_or_else(|_| command.split_whitespace().map(str::to_string).collect());
        let tokens: Vec<String> = tokens
            .into_iter()
            .filter(|t| t != &self.tool_name(super::HELP_ACTION))
            .collect();

        if tokens.is_empty() && resource.is_none() {
            return ToolOutput::text(self.overview_help());
        }

        if let Some(first) = tokens.first()
            && let Some(kind) = self.action_kind(first)
        {
            let wanted = tokens.get(1).map(String::as_str).or(resource);
            return ToolOutput::text(match (&kind, wanted) {
                (ActionKind::Hierarchical(resources), Some(r)) if resources.iter().any(|x| x == r) => {
                    self.command_help(first, Some(r))
                }
                (ActionKind::Hierarchical(_), Some(r)) => format!(
                    "Unknown resource '{r}' for action '{first}'.\n\n{}",
                    self.action_help(first, &kind)
                ),
                (ActionKind::Standalone, _) => self.command_help(first, None),
                (ActionKind::Hierarchical(_), None) => self.action_help(first, &kind),
            });
        }

        let candidate = tokens.first().map(String::as_str).or(resource);
        if let Some(candidate) = candidate
            && let Some(text) = self.resource_help(candidate)
        {
            return ToolOutput::text(text);
        }

        ToolOutput::text(self.runner.help_text(&tokens))
    }

    fn overview_help(&self) -> String {
        let mut out = format!("Available {} tools:\n", self.prefix());
        for action in self.actions() {
            let name = self.tool_name(&action);
            match self.action_kind(&action) {
                Some(ActionKind::Hierarchical(resources)) => {
                    let _ = writeln!(out, "  {name}: resources: {}", resources.join(", "));
                }
                _ => {
                    let _ = writeln!(out, "  {name}: standalone (no resource)");
                }
            }
        }
        let _ = write!(
            out,
            "\nCall {} with {{\"command\": \"<action> [resource]\"}} for details.",
            self.tool_name(super::HELP_ACTION)
        );
        out
    }

    fn action_help(&self, action: &str, kind: &ActionKind) -> String {
        let name = self.tool_name(action);
        let mut out = format!("Action: {action}\nTool: {name}\n");
        match kind {
            ActionKind::Hierarchical(resources) => {
                let _ = writeln!(out, "Type: hierarchical");
                let _ = writeln!(out, "Resources: {}", resources.join(", "));
                let _ = writeln!(
                    out,
                    "\nUsage: call {name} with {{\"resource\": \"<resource>\", \"flags\": {{...}}}}"
                );
                let _ = write!(
                    out,
                    "Details for one resource: {} with {{\"command\": \"{action} <resource>\"}}",
                    self.tool_name(super::HELP_ACTION)
                );
            }
            ActionKind::Standalone => {
                let _ = writeln!(out, "Type: standalone (no resource parameter)");
                let _ = write!(out, "\nUsage: call {name} with {{\"flags\": {{...}}}}");
            }
        }
        out
    }

    fn command_help(&self, action: &str, resource: Option<&str>) -> String {
        let info = self.commands().iter().find(|c| {
            c.action() == action && c.resource() == resource && c.path.len() <= 2
        });
        let Some(info) = info else {
            let mut path = vec![action.to_string()];
            path.extend(resource.map(str::to_string));
            return self.runner.help_text(&path);
        };

        let name = self.tool_name(action);
        let mut out = format!("Command: {}\nTool: {name}\n", info.joined_path());
        if !info.description.is_empty() {
            let _ = writeln!(out, "Description: {}", info.description);
        }
        if !info.usage.is_empty() {
            let _ = writeln!(out, "Usage: {}", info.usage);
        }

        let (required, optional): (Vec<&FlagInfo>, Vec<&FlagInfo>) =
            info.flags.iter().partition(|f| f.required);
        write_flags(&mut out, "Required flags", &required);
        write_flags(&mut out, "Optional flags", &optional);

        let example = example_arguments(info, resource);
        let _ = writeln!(
            out,
            "\nExample arguments for {name}:\n{}",
            serde_json::to_string_pretty(&example).unwrap_or_else(|_| example.to_string())
        );
        if !info.example.is_empty() {
            let _ = writeln!(out, "\nCLI examples:\n{}", info.example);
        }
        out
    }

    fn resource_help(&self, resource: &str) -> Option<String> {
        let supporting: Vec<String> = self
            .actions()
            .into_iter()
            .filter(|a| self.available_resources(a).iter().any(|r| r == resource))
            .collect();
        if supporting.is_empty() {
            return None;
        }
        let mut out = format!("Resource: {resource}\nSupported actions:\n");
        for action in &supporting {
            let _ = writeln!(
                out,
                "  {action}: {} with {{\"resource\": \"{resource}\"}}",
                self.tool_name(action)
            );
        }
        Some(out)
    }
}

fn write_flags(out: &mut String, title: &str, flags: &[&FlagInfo]) {
    if flags.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title}:");
    for flag in flags {
        let schema = schema::flag_schema(flag);
        let mut line = format!("  --{} ({})", flag.name, flag.kind.schema_type());
        if let Some(c) = flag.shorthand {
            let _ = write!(line, " [-{c}]");
        }
        let values = schema
            .get("enum")
            .or_else(|| schema.get("items").and_then(|i| i.get("enum")))
            .and_then(Value::as_array);
        if let Some(values) = values {
            let joined: Vec<&str> = values.iter().filter_map(Value::as_str).collect();
            let _ = write!(line, " values: {}", joined.join("|"));
        }
        if !flag.description.is_empty() {
            let _ = write!(line, ": {}", flag.description);
        }
        let _ = writeln!(out, "{line}");
    }
}

fn placeholder(flag: &FlagInfo) -> Value {
    let first_choice = flag.choices.first().cloned();
    match flag.kind {
        FlagKind::Boolean => json!(true),
        FlagKind::Integer => json!(1),
        FlagKind::Float => json!(1.0),
        FlagKind::String => json!(first_choice.unwrap_or_else(|| format!("<{}>", flag.name))),
        FlagKind::StringArray => {
            json!([first_choice.unwrap_or_else(|| format!("<{}>", flag.name))])
        }
    }
}

fn example_arguments(info: &CommandInfo, resource: Option<&str>) -> Value {
    let flags: Map<String, Value> = info
        .flags
        .iter()
        .filter(|f| f.required)
        .map(|f| (f.name.clone(), placeholder(f)))
        .collect();
    let mut args = Map::new();
    if let Some(r) = resource {
        args.insert("resource".into(), json!(r));
    }
    args.insert("flags".into(), Value::Object(flags));
    Value::Object(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRunner, sample_commands};
    use crate::tools::RegistryOptions;
    use std::sync::Arc;

    fn registry() -> ToolRegistry {
        ToolRegistry::new(
            Arc::new(RecordingRunner::new(sample_commands())),
            RegistryOptions {
                prefix: "fleet".into(),
                ..Default::default()
            },
        )
    }

    fn help(reg: &ToolRegistry, v: Value) -> String {
        let out = reg
            .call_tool("fleet_help", v.as_object().cloned().unwrap())
            .unwrap();
        assert!(!out.is_error);
        out.joined_text()
    }

    #[test]
    fn overview_lists_every_action() {
        let text = help(&registry(), json!({}));
        assert!(text.contains("fleet_create: resources: cluster, role"));
        assert!(text.contains("fleet_whoami: standalone"));
    }

    #[test]
    fn action_level() {
        let text = help(&registry(), json!({"command": "create"}));
        assert!(text.contains("Type: hierarchical"));
        assert!(text.contains("cluster, role"));
    }

    #[test]
    fn action_resource_level_lists_flags_and_example() {
        let text = help(&registry(), json!({"command": "create cluster"}));
        assert!(text.contains("Required flags"));
        assert!(text.contains("--name (string)"));
        assert!(text.contains("Optional flags"));
        assert!(text.contains("--replicas (integer)"));
        assert!(text.contains("\"resource\": \"cluster\""));
        assert!(text.contains("\"name\": \"<name>\""));

        let same = help(&registry(), json!({"command": "create", "resource": "cluster"}));
        assert_eq!(text, same);
    }

    #[test]
    fn resource_level() {
        let text = help(&registry(), json!({"resource": "clusters"}));
        assert!(text.contains("Resource: clusters"));
        assert!(text.contains("list: fleet_list"));
    }

    #[test]
    fn standalone_level() {
        let text = help(&registry(), json!({"command": "whoami"}));
        assert!(text.contains("Command: whoami"));
    }

    #[test]
    fn falls_back_to_builtin_help() {
        let text = help(&registry(), json!({"command": "frobnicate now"}));
        assert_eq!(text, "builtin help for 'frobnicate now'");
    }
}
