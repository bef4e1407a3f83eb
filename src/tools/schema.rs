/*!
JSON-schema synthesis for tool definitions.

Every tool takes the same argument shape:

  {
    "resource": "<one of the action's resources>",   // hierarchical only
    "flags":    { "<flag name>": <value>, ... },
    "args":     ["positional", ...]
  }

Per-flag schemas come from `FlagKind`. Enumerated values are taken from the
flag's declared choices, or guessed from its help text. Guessed values are
advisory: the wrapped command remains the authority on what it accepts.
*/

use serde_json::{Map, Value, json};

use crate::executor::FlagInfo;
use crate::tree::FlagKind;

/// Phrases that usually introduce a list of accepted values.
const ENUM_MARKERS: &[&str] = &[
    "one of",
    "options are",
    "options:",
    "valid values",
    "allowed values",
    "possible values",
    "supported values",
    "must be",
];

/// Words that qualify a value list rather than belong to it.
const QUALIFIERS: &[&str] = &["required", "optional", "default", "etc"];

pub fn flag_schema(flag: &FlagInfo) -> Value {
    let mut schema = flag.kind.schema();
    let values = if flag.choices.is_empty() {
        extract_enum(&flag.description)
    } else {
        flag.choices.clone()
    };
    if let Value::Object(obj) = &mut schema {
        if !flag.description.is_empty() {
            obj.insert("description".into(), Value::String(flag.description.clone()));
        }
        if !values.is_empty() {
            match flag.kind {
                FlagKind::StringArray => {
                    if let Some(Value::Object(items)) = obj.get_mut("items") {
                        items.insert("enum".into(), json!(values));
                    }
                }
                FlagKind::String => {
                    obj.insert("enum".into(), json!(values));
                }
                _ => {}
            }
        }
    }
    schema
}

/// `flags` property: an open object whose `properties` are always present.
pub fn flags_property<'a>(flags: impl IntoIterator<Item = &'a FlagInfo>) -> Value {
    let mut properties = Map::new();
    for flag in flags {
        if !properties.contains_key(&flag.name) {
            properties.insert(flag.name.clone(), flag_schema(flag));
        }
    }
    json!({
        "type": "object",
        "description": "Command flags keyed by long flag name without the leading '--'",
        "properties": properties,
        "additionalProperties": true,
    })
}

pub fn args_property() -> Value {
    json!({
        "type": "array",
        "description": "Optional positional arguments",
        "items": { "type": "string" },
    })
}

pub fn hierarchical_schema<'a>(
    action: &str,
    resources: &[String],
    flags: impl IntoIterator<Item = &'a FlagInfo>,
) -> Value {
    json!({
        "type": "object",
        "properties": {
            "resource": {
                "type": "string",
                "description": format!("Resource to {action}"),
                "enum": resources,
            },
            "flags": flags_property(flags),
            "args": args_property(),
        },
        "required": ["resource"],
    })
}

pub fn standalone_schema<'a>(flags: impl IntoIterator<Item = &'a FlagInfo>) -> Value {
    json!({
        "type": "object",
        "properties": {
            "flags": flags_property(flags),
            "args": args_property(),
        },
    })
}

/// Schema of the reserved help tool; `paths` are listed as examples.
pub fn help_schema(paths: &[String]) -> Value {
    let mut command = String::from("Command to get help for, e.g. 'create cluster'");
    if !paths.is_empty() {
        command.push_str(". Available: ");
        command.push_str(&paths.join(", "));
    }
    json!({
        "type": "object",
        "properties": {
            "command": { "type": "string", "description": command },
            "resource": {
                "type": "string",
                "description": "Resource name to list the actions that support it",
            },
        },
    })
}

/* -------------------------------------------------------------------------- */
/* Enum Heuristic                                                             */
/* -------------------------------------------------------------------------- */

/// Best-effort extraction of enumerated values from help prose.
///
/// Looks for a marker phrase ("one of", "options:", ...) followed by a
/// comma/pipe/"or" separated list, or for a pipe-joined token such as
/// `(json|yaml)`. Returns an empty list when nothing value-like is found.
pub fn extract_enum(help: &str) -> Vec<String> {
    let lower = help.to_ascii_lowercase();
    for marker in ENUM_MARKERS {
        let Some(pos) = lower.find(*marker) else {
            continue;
        };
        let tail = help[pos + marker.len()..].trim_start_matches([':', ' ', '\t']);
        let tail = ["are ", "is "]
            .iter()
            .find_map(|w| tail.strip_prefix(*w))
            .unwrap_or(tail)
            .trim_start_matches([':', ' ']);
        let values = split_values(sentence(tail));
        if values.len() >= 2 {
            return values;
        }
    }

    for word in help.split_whitespace() {
        let token = word.trim_matches(|c: char| !(c.is_alphanumeric() || c == '|'));
        if token.contains('|') {
            let values = split_values(token);
            if values.len() >= 2 {
                return values;
            }
        }
    }
    Vec::new()
}

/// Text up to the end of the current sentence.
fn sentence(text: &str) -> &str {
    let end = [". ", ";", "\n"]
        .iter()
        .filter_map(|stop| text.find(*stop))
        .min()
        .unwrap_or(text.len());
    text[..end].trim_end_matches('.')
}

fn split_values(segment: &str) -> Vec<String> {
    let cleaned = strip_parenthetical(segment);
    let mut values: Vec<String> = Vec::new();
    for piece in cleaned.split([',', '|']).flat_map(|p| p.split(" or ")) {
        let piece = piece.trim();
        let piece = piece.strip_prefix("and ").unwrap_or(piece);
        let value = piece
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c.is_whitespace());
        if value.is_empty() || QUALIFIERS.iter().any(|q| value.eq_ignore_ascii_case(q)) {
            continue;
        }
        // Prose rather than a value list.
        if value.contains(char::is_whitespace) || value.chars().count() > 40 {
            return Vec::new();
        }
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }
    values
}

fn strip_parenthetical(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}
