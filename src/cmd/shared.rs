/*!
Helpers shared by `tools`, `call` and `resources`.

  - `Endpoint`: the bundled adapter in this process, or an MCP server spawned
    from `--target`. Both answer the same four requests.
  - Argument building from a tool's input schema plus primitive coercion.
  - Parameter files (JSON or YAML, chosen by extension).
  - Small readers over serialized protocol results.
*/

use anyhow::{Context, Result, anyhow, bail};
use rmcp::model::{CallToolRequestParam, CallToolResult, ReadResourceRequestParam, Resource, Tool};
use rmcp::service::RunningService;
use rmcp::RoleClient;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use cmdtree_mcp::{AdapterConfig, ProtocolServer, build_server, fleet};

use super::target::{self, TargetSpec};

/* ---- Endpoint ---- */

pub enum Endpoint {
    Local(ProtocolServer),
    Spawned {
        spec: TargetSpec,
        service: RunningService<RoleClient, ()>,
    },
}

impl Endpoint {
    /// The bundled adapter unless `target` names a server to spawn.
    pub async fn open(config: &AdapterConfig, target: Option<&str>) -> Result<Self> {
        match target.map(str::trim).filter(|t| !t.is_empty()) {
            None => Ok(Endpoint::Local(local_server(config))),
            Some(raw) => {
                let spec = target::parse_target(raw)
                    .with_context(|| format!("failed to parse target: '{raw}'"))?;
                let service = target::connect(&spec).await?;
                Ok(Endpoint::Spawned { spec, service })
            }
        }
    }

    /// What to print as the target in output headers.
    pub fn label(&self) -> String {
        match self {
            Endpoint::Local(_) => format!("local: {}", fleet::PROGRAM),
            Endpoint::Spawned { spec, .. } => spec.to_string(),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        match self {
            Endpoint::Local(server) => Ok(server.tools().to_vec()),
            Endpoint::Spawned { service, .. } => Ok(service
                .list_tools(Default::default())
                .await
                .context("failed to list tools")?
                .tools),
        }
    }

    pub async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<CallToolResult> {
        match self {
            Endpoint::Local(server) => Ok(server.handle_call(name.to_string(), arguments).await),
            Endpoint::Spawned { service, .. } => service
                .call_tool(CallToolRequestParam {
                    name: name.to_string().into(),
                    arguments: Some(arguments),
                })
                .await
                .with_context(|| format!("tool invocation failed: {name}")),
        }
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        match self {
            Endpoint::Local(server) => Ok(server.resources().to_vec()),
            Endpoint::Spawned { service, .. } => Ok(service
                .list_resources(Default::default())
                .await
                .context("failed to list resources")?
                .resources),
        }
    }

    /// Contents of `uri` as serialized protocol values.
    pub async fn read_resource(&self, uri: &str) -> Result<Vec<Value>> {
        let result = match self {
            Endpoint::Local(server) => server.handle_read(uri.to_string()).await,
            Endpoint::Spawned { service, .. } => service
                .read_resource(ReadResourceRequestParam { uri: uri.to_string() })
                .await
                .with_context(|| format!("failed to read {uri}"))?,
        };
        let value = serde_json::to_value(&result)?;
        Ok(value["contents"].as_array().cloned().unwrap_or_default())
    }

    /// Shut a spawned target down.
    pub async fn close(self) {
        if let Endpoint::Spawned { service, .. } = self {
            let _ = service.cancel().await;
        }
    }
}

pub fn local_server(config: &AdapterConfig) -> ProtocolServer {
    build_server(fleet::tree(), config)
}

pub fn find_tool<'a>(tools: &'a [Tool], name: &str) -> Option<&'a Tool> {
    tools
        .iter()
        .find(|t| t.name == name)
        .or_else(|| tools.iter().find(|t| t.name.eq_ignore_ascii_case(name)))
}

/* ---- Argument building ---- */

/// Build a call's argument object from `KEY=VALUE` strings.
///
/// - Keys naming a top-level property are coerced by that property's type.
/// - Keys naming a property of the nested `flags` object (bare, or written
///   `flags.KEY`) go into `flags`, coerced the same way.
/// - Anything else passes through as a string.
/// - `base` (from a parameter file) is overridden key by key.
/// - Every top-level `required` property must end up present.
pub fn build_arguments(
    schema: &Map<String, Value>,
    base: Map<String, Value>,
    provided: &BTreeMap<String, String>,
) -> Result<Map<String, Value>> {
    let props = schema.get("properties").and_then(Value::as_object);
    let flag_props = props
        .and_then(|p| p.get("flags"))
        .and_then(|f| f.get("properties"))
        .and_then(Value::as_object);

    let mut args = base;
    for (key, raw) in provided {
        let nested = key.strip_prefix("flags.");
        if let Some(prop) = props.and_then(|p| p.get(key)).filter(|_| nested.is_none()) {
            args.insert(key.clone(), coerce_value(raw, type_of(prop)));
        } else if let Some((name, prop)) = nested
            .or(Some(key.as_str()))
            .and_then(|k| flag_props.and_then(|f| f.get_key_value(k)))
        {
            let flags = args
                .entry("flags")
                .or_insert_with(|| Value::Object(Map::new()));
            let Some(flags) = flags.as_object_mut() else {
                bail!("'flags' must be an object");
            };
            flags.insert(name.clone(), coerce_value(raw, type_of(prop)));
        } else {
            args.insert(key.clone(), Value::String(raw.clone()));
        }
    }

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    for name in required {
        if !args.contains_key(name) {
            bail!("missing required parameter: {name}");
        }
    }
    Ok(args)
}

fn type_of(prop: &Value) -> &str {
    prop.get("type").and_then(Value::as_str).unwrap_or("string")
}

/// Coerce a raw string by a JSON-schema primitive type; values that do not
/// parse stay strings.
pub fn coerce_value(raw: &str, type_hint: &str) -> Value {
    let fallback = || Value::String(raw.to_string());
    match type_hint {
        "integer" => raw.parse::<i64>().map(Value::from).unwrap_or_else(|_| fallback()),
        "number" => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(fallback),
        "boolean" => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Value::Bool(true),
            "false" | "0" | "no" | "n" => Value::Bool(false),
            _ => fallback(),
        },
        "array" => Value::Array(
            raw.split(',')
                .map(|s| Value::String(s.trim().to_string()))
                .collect(),
        ),
        "object" => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(fallback),
        _ => fallback(),
    }
}

/// Split repeated `KEY=VALUE` options.
pub fn parse_params(params: &[String]) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for kv in params {
        let Some((k, v)) = kv.split_once('=') else {
            bail!("invalid --param (expected KEY=VALUE): {kv}");
        };
        let key = k.trim();
        if key.is_empty() {
            bail!("invalid --param (empty key): {kv}");
        }
        out.insert(key.to_string(), v.trim().to_string());
    }
    Ok(out)
}

/// Load a parameter file. The root must be an object; values keep their
/// JSON types.
pub fn load_param_file(path: &Path) -> Result<Map<String, Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read param file: {}", path.display()))?;
    let yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    let value: Value = if yaml {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(&raw).context("failed to parse YAML param file")?;
        serde_json::to_value(doc).context("failed to convert YAML to JSON")?
    } else {
        serde_json::from_str(&raw).context("failed to parse JSON param file")?
    };
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("param file root must be an object")),
    }
}

/* ---- Result readers ---- */

/// Text blocks of a call result and its error flag.
pub fn call_outcome(result: &CallToolResult) -> (Vec<String>, bool) {
    let value = serde_json::to_value(result).unwrap_or(Value::Null);
    let texts = value["content"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|c| c["text"].as_str().map(str::to_string))
        .collect();
    (texts, value["isError"].as_bool().unwrap_or(false))
}

/// One row per parameter of a tool schema; nested `flags` properties are
/// listed as `flags.<name>`.
pub fn schema_rows(schema: &Map<String, Value>) -> Vec<ParamRow> {
    fn collect(prefix: &str, schema: &Map<String, Value>, rows: &mut Vec<ParamRow>) {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .collect();
        let Some(props) = schema.get("properties").and_then(Value::as_object) else {
            return;
        };
        for (name, prop) in props {
            let full = format!("{prefix}{name}");
            let nested = prop.as_object().filter(|p| p.contains_key("properties"));
            if let Some(nested) = nested {
                collect(&format!("{full}."), nested, rows);
                continue;
            }
            let mut kind = type_of(prop).to_string();
            if let Some(values) = prop.get("enum").and_then(Value::as_array) {
                let names: Vec<&str> = values.iter().filter_map(Value::as_str).collect();
                kind = format!("{kind} [{}]", names.join("|"));
            }
            rows.push(ParamRow {
                name: full,
                kind,
                required: required.contains(&name.as_str()),
                description: prop
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }
    let mut rows = Vec::new();
    collect("", schema, &mut rows);
    rows
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamRow {
    pub name: String,
    pub kind: String,
    pub required: bool,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Map<String, Value> {
        json!({
            "type": "object",
            "required": ["resource"],
            "properties": {
                "resource": {"type": "string", "enum": ["cluster", "role"]},
                "flags": {
                    "type": "object",
                    "properties": {
                        "replicas": {"type": "integer", "description": "count"},
                        "dry-run": {"type": "boolean"},
                        "zone": {"type": "array", "items": {"type": "string"}}
                    }
                }
            }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn coercion() {
        assert_eq!(coerce_value("42", "integer"), json!(42));
        assert_eq!(coerce_value("x42", "integer"), json!("x42"));
        assert_eq!(coerce_value("No", "boolean"), json!(false));
        assert_eq!(coerce_value("a,b, c", "array"), json!(["a", "b", "c"]));
        assert_eq!(coerce_value(r#"{"k":1}"#, "object"), json!({"k": 1}));
        assert_eq!(coerce_value("0.5", "number"), json!(0.5));
    }

    #[test]
    fn bare_and_dotted_keys_land_in_flags() {
        let provided = parse_params(&[
            "resource=cluster".into(),
            "replicas=5".into(),
            "flags.dry-run=yes".into(),
            "zone=a,b".into(),
            "extra=1".into(),
        ])
        .unwrap();
        let args = build_arguments(&schema(), Map::new(), &provided).unwrap();
        assert_eq!(
            Value::Object(args),
            json!({
                "resource": "cluster",
                "flags": {"replicas": 5, "dry-run": true, "zone": ["a", "b"]},
                "extra": "1"
            })
        );
    }

    #[test]
    fn cli_params_override_file_values() {
        let base = json!({"resource": "role", "flags": {"replicas": 1}})
            .as_object()
            .cloned()
            .unwrap();
        let provided = parse_params(&["replicas=2".into()]).unwrap();
        let args = build_arguments(&schema(), base, &provided).unwrap();
        assert_eq!(args["resource"], "role");
        assert_eq!(args["flags"], json!({"replicas": 2}));
    }

    #[test]
    fn missing_required_parameter() {
        let err = build_arguments(&schema(), Map::new(), &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("missing required parameter: resource"));
        assert!(parse_params(&["novalue".into()]).is_err());
        assert!(parse_params(&["=x".into()]).is_err());
    }

    #[test]
    fn param_files_by_extension() {
        use std::io::Write;
        let mut f = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(f, "resource: cluster\nflags:\n  replicas: 3").unwrap();
        let map = load_param_file(f.path()).unwrap();
        assert_eq!(map["flags"]["replicas"], 3);

        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(f, "[1, 2]").unwrap();
        assert!(load_param_file(f.path()).is_err());
    }

    #[test]
    fn rows_flatten_nested_flags() {
        let rows = schema_rows(&schema());
        let mut names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        names.sort();
        assert_eq!(names, ["flags.dry-run", "flags.replicas", "flags.zone", "resource"]);
        let resource = rows.iter().find(|r| r.name == "resource").unwrap();
        assert!(resource.required);
        assert_eq!(resource.kind, "string [cluster|role]");
    }
}
