/*!
Flag declarations for command-tree nodes.

`FlagKind` is the closed set of value types a flag can declare. It carries
both halves of the contract a flag has with the outside world:

  - the JSON-schema fragment advertised to tool callers (`schema`)
  - the argv serialization used when a JSON value is replayed into the
    command line (`to_argv`)

Keeping both on one type means the schema and the argument vector cannot
disagree about what a flag accepts.
*/

use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FlagKind {
    Boolean,
    Integer,
    Float,
    String,
    StringArray,
}

impl FlagKind {
    /// JSON-schema primitive for this kind.
    pub fn schema_type(&self) -> &'static str {
        match self {
            FlagKind::Boolean => "boolean",
            FlagKind::Integer => "integer",
            FlagKind::Float => "number",
            FlagKind::String => "string",
            FlagKind::StringArray => "array",
        }
    }

    /// Base schema fragment (without description or enum).
    pub fn schema(&self) -> Value {
        match self {
            FlagKind::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
            other => json!({ "type": other.schema_type() }),
        }
    }

    /// Serialize a JSON value for flag `name` into argv tokens.
    ///
    /// Booleans become a bare `--name` when truthy and nothing otherwise.
    /// Values are attached as `--name=value` so a value starting with `-`
    /// is never read as another flag. String arrays repeat the flag once per
    /// element. Scalars use their natural string form; anything else is
    /// JSON-encoded.
    pub fn to_argv(&self, name: &str, value: &Value) -> Vec<String> {
        let with_value = |v: &Value| format!("--{name}={}", scalar_string(self, v));
        match (self, value) {
            (_, Value::Null) => Vec::new(),
            (FlagKind::Boolean, v) => {
                if truthy(v) {
                    vec![format!("--{name}")]
                } else {
                    Vec::new()
                }
            }
            (FlagKind::StringArray, Value::Array(items)) => items
                .iter()
                .filter(|v| !v.is_null())
                .map(with_value)
                .collect(),
            (_, v) => vec![with_value(v)],
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "y" | "on"
        ),
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn scalar_string(kind: &FlagKind, value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // Integer flags reject "3.0"; models often send whole floats.
        Value::Number(n) if *kind == FlagKind::Integer && n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// A flag declared on a command node.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagSpec {
    pub(crate) name: String,
    pub(crate) shorthand: Option<char>,
    pub(crate) help: String,
    pub(crate) kind: FlagKind,
    pub(crate) required: bool,
    pub(crate) choices: Vec<String>,
    pub(crate) default: Option<String>,
}

impl FlagSpec {
    pub fn new(name: impl Into<String>, kind: FlagKind) -> Self {
        Self {
            name: name.into(),
            shorthand: None,
            help: String::new(),
            kind,
            required: false,
            choices: Vec::new(),
            default: None,
        }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FlagKind::Boolean)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FlagKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FlagKind::Float)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FlagKind::String)
    }

    pub fn string_array(name: impl Into<String>) -> Self {
        Self::new(name, FlagKind::StringArray)
    }

    pub fn short(mut self, c: char) -> Self {
        self.shorthand = Some(c);
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict a string flag to a fixed set of values.
    pub fn choices<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FlagKind {
        self.kind
    }

    /// Build the clap argument. Persistent flags become global args; they are
    /// never marked required at the clap level so ancestors stay runnable.
    pub(crate) fn to_arg(&self, persistent: bool) -> Arg {
        let mut arg = Arg::new(self.name.clone())
            .long(self.name.clone())
            .help(self.help.clone())
            .global(persistent);
        if let Some(c) = self.shorthand {
            arg = arg.short(c);
        }
        arg = match self.kind {
            FlagKind::Boolean => arg.action(ArgAction::SetTrue),
            FlagKind::Integer => arg
                .action(ArgAction::Set)
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(i64)),
            FlagKind::Float => arg
                .action(ArgAction::Set)
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(f64)),
            FlagKind::String if !self.choices.is_empty() => arg
                .action(ArgAction::Set)
                .value_parser(PossibleValuesParser::new(self.choices.clone())),
            FlagKind::String => arg.action(ArgAction::Set),
            FlagKind::StringArray => arg.action(ArgAction::Append),
        };
        if self.required && !persistent {
            arg = arg.required(true);
        }
        if let Some(default) = &self.default {
            arg = arg.default_value(default.clone());
        }
        arg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_is_bare_flag_or_absent() {
        let k = FlagKind::Boolean;
        assert_eq!(k.to_argv("force", &json!(true)), vec!["--force"]);
        assert!(k.to_argv("force", &json!(false)).is_empty());
        assert_eq!(k.to_argv("force", &json!("yes")), vec!["--force"]);
        assert!(k.to_argv("force", &Value::Null).is_empty());
    }

    #[test]
    fn arrays_repeat_the_flag() {
        let argv = FlagKind::StringArray.to_argv("tag", &json!(["a", "b"]));
        assert_eq!(argv, vec!["--tag=a", "--tag=b"]);
    }

    #[test]
    fn scalars_and_structured_values() {
        assert_eq!(FlagKind::Integer.to_argv("replicas", &json!(3)), vec!["--replicas=3"]);
        assert_eq!(FlagKind::Integer.to_argv("replicas", &json!(3.0)), vec!["--replicas=3"]);
        assert_eq!(FlagKind::Float.to_argv("ratio", &json!(0.5)), vec!["--ratio=0.5"]);
        assert_eq!(
            FlagKind::String.to_argv("labels", &json!({"a": 1})),
            vec![r#"--labels={"a":1}"#]
        );
    }

    #[test]
    fn leading_dash_values_stay_attached() {
        assert_eq!(FlagKind::Integer.to_argv("delta", &json!(-2)), vec!["--delta=-2"]);
        assert_eq!(
            FlagKind::String.to_argv("note", &json!("-starts-with-dash")),
            vec!["--note=-starts-with-dash"]
        );
        assert_eq!(FlagKind::StringArray.to_argv("tag", &json!(["-x"])), vec!["--tag=-x"]);
    }

    #[test]
    fn clap_accepts_dashed_values() {
        let cmd = clap::Command::new("scale")
            .arg(FlagSpec::integer("delta").to_arg(false))
            .arg(FlagSpec::float("ratio").to_arg(false))
            .arg(FlagSpec::string("note").to_arg(false));
        let mut argv = vec!["scale".to_string()];
        argv.extend(FlagKind::Integer.to_argv("delta", &json!(-2)));
        argv.extend(FlagKind::String.to_argv("note", &json!("-starts-with-dash")));
        argv.push("--ratio".to_string());
        argv.push("-0.25".to_string());
        let m = cmd.try_get_matches_from(argv).unwrap();
        assert_eq!(m.get_one::<i64>("delta"), Some(&-2));
        assert_eq!(m.get_one::<f64>("ratio"), Some(&-0.25));
        assert_eq!(m.get_one::<String>("note").map(String::as_str), Some("-starts-with-dash"));
    }

    #[test]
    fn schema_mapping() {
        assert_eq!(FlagKind::Float.schema(), json!({"type": "number"}));
        assert_eq!(
            FlagKind::StringArray.schema(),
            json!({"type": "array", "items": {"type": "string"}})
        );
    }
}
