/*!
Adapter configuration.

Precedence, lowest first: built-in defaults for the wrapped program, a JSON
or YAML file (format chosen by extension), then command-line flags and
environment variables applied by the front-end. File values are merged
key-by-key, so a file only needs the keys it changes.

Example (YAML):

```yaml
prefix: fleet
policy: auto
actions: [list, describe, create]
standalone: [whoami]
enable_resources: true
dangerous: [delete, create/cluster]
chat:
  model: gpt-4o-mini
  max_iterations: 6
```
*/

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatSettings, DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL};
use crate::error::AdapterError;
use crate::executor::{DEFAULT_CAPTURE_LIMIT, ExecutionPolicy, ExecutorOptions};
use crate::server::ServerIdentity;
use crate::tools::RegistryOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    /// Tool name prefix (`<prefix>_<action>`).
    pub prefix: String,
    /// Resource URI scheme.
    pub scheme: String,
    pub server_name: String,
    pub instructions: Option<String>,
    /// Actions to expose; every action when unset.
    pub actions: Option<Vec<String>>,
    /// Actions exposed without a `resource` parameter regardless of subcommands.
    pub standalone: Option<Vec<String>>,
    /// Register resources and advertise the resources capability.
    pub enable_resources: bool,
    pub policy: ExecutionPolicy,
    /// Program spawned for sub-process runs.
    pub program: Option<PathBuf>,
    /// Appended as `--output=<format>` when a command has an output flag.
    pub output_format: Option<String>,
    pub capture_limit: usize,
    /// `action` or `action/resource` entries the chat assistant must confirm.
    pub dangerous: Vec<String>,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    pub model: String,
    pub api_url: Option<String>,
    pub max_iterations: usize,
    pub system_message_file: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_url: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_message_file: None,
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::for_program("cli")
    }
}

impl AdapterConfig {
    /// Defaults for a wrapped program called `name`.
    pub fn for_program(name: &str) -> Self {
        Self {
            prefix: name.to_string(),
            scheme: name.to_string(),
            server_name: format!("{name}-mcp"),
            instructions: None,
            actions: None,
            standalone: None,
            enable_resources: true,
            policy: ExecutionPolicy::Auto,
            program: None,
            output_format: Some("json".to_string()),
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            dangerous: Vec::new(),
            chat: ChatConfig::default(),
        }
    }

    /// Merge the file at `path` over `base`.
    pub fn load_over(base: Self, path: &Path) -> Result<Self, AdapterError> {
        let config_err = |message: String| AdapterError::Config {
            path: path.to_path_buf(),
            message,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
        let overlay = parse_document(path, &raw).map_err(config_err)?;
        if !overlay.is_object() {
            return Err(config_err("root must be a mapping".to_string()));
        }

        let mut merged = serde_json::to_value(&base).map_err(|e| config_err(e.to_string()))?;
        merge(&mut merged, overlay);
        let config: Self = serde_json::from_value(merged).map_err(|e| config_err(e.to_string()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            policy: self.policy,
            program: self.program.clone(),
            output_format: self.output_format.clone().filter(|f| !f.is_empty()),
            capture_limit: self.capture_limit,
        }
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            prefix: self.prefix.clone(),
            actions: self.actions.clone(),
            standalone: self.standalone.clone(),
        }
    }

    pub fn server_identity(&self) -> ServerIdentity {
        ServerIdentity {
            name: self.server_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: self.instructions.clone(),
        }
    }

    /// Chat settings; reads the system message file when one is configured.
    pub fn chat_settings(&self) -> Result<ChatSettings, AdapterError> {
        let system_message = match &self.chat.system_message_file {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| AdapterError::Config {
                path: path.clone(),
                message: format!("cannot read system message: {e}"),
            })?),
            None => None,
        };
        Ok(ChatSettings {
            model: self.chat.model.clone(),
            max_iterations: self.chat.max_iterations.max(1),
            system_message,
            dangerous: self.dangerous.clone(),
        })
    }
}

fn parse_document(path: &Path, raw: &str) -> Result<Value, String> {
    let yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    if yaml {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).map_err(|e| format!("invalid YAML: {e}"))?;
        serde_json::to_value(doc).map_err(|e| format!("unsupported YAML value: {e}"))
    } else {
        serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
    }
}

/// Objects merge key by key; anything else replaces.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn yaml_overrides_only_given_keys() {
        let f = file(
            ".yaml",
            "policy: sub-process\nactions: [list, create]\nchat:\n  max_iterations: 4\n",
        );
        let base = AdapterConfig::for_program("fleet");
        let cfg = AdapterConfig::load_over(base, f.path()).unwrap();
        assert_eq!(cfg.policy, ExecutionPolicy::SubProcess);
        assert_eq!(cfg.actions, Some(vec!["list".to_string(), "create".to_string()]));
        assert_eq!(cfg.chat.max_iterations, 4);
        assert_eq!(cfg.chat.model, DEFAULT_MODEL);
        assert_eq!(cfg.prefix, "fleet");
    }

    #[test]
    fn json_by_default() {
        let f = file(".json", r#"{"prefix": "ops", "output_format": null}"#);
        let cfg = AdapterConfig::load_over(AdapterConfig::default(), f.path()).unwrap();
        assert_eq!(cfg.prefix, "ops");
        assert_eq!(cfg.executor_options().output_format, None);
        assert_eq!(cfg.registry_options().prefix, "ops");
    }

    #[test]
    fn resources_and_standalone_overrides() {
        let cfg = AdapterConfig::for_program("fleet");
        assert!(cfg.enable_resources);
        assert_eq!(cfg.registry_options().standalone, None);

        let f = file(".yaml", "enable_resources: false\nstandalone: [list]\n");
        let cfg = AdapterConfig::load_over(cfg, f.path()).unwrap();
        assert!(!cfg.enable_resources);
        assert_eq!(cfg.registry_options().standalone, Some(vec!["list".to_string()]));
        assert_eq!(cfg.prefix, "fleet");
    }

    #[test]
    fn bad_files_name_the_path() {
        let f = file(".json", r#"{"prefix": "ops", "nonsense": 1}"#);
        let err = AdapterConfig::load_over(AdapterConfig::default(), f.path()).unwrap_err();
        assert!(matches!(err, AdapterError::Config { .. }));
        assert!(err.to_string().contains("nonsense"));

        let f = file(".yml", "- just\n- a list\n");
        assert!(AdapterConfig::load_over(AdapterConfig::default(), f.path()).is_err());

        let missing = Path::new("/definitely/missing/config.json");
        let err = AdapterConfig::load_over(AdapterConfig::default(), missing).unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn chat_settings_read_system_message_file() {
        let prompt = file(".txt", "be terse");
        let mut cfg = AdapterConfig::for_program("fleet");
        cfg.dangerous = vec!["delete".into()];
        cfg.chat.system_message_file = Some(prompt.path().to_path_buf());
        cfg.chat.max_iterations = 0;
        let settings = cfg.chat_settings().unwrap();
        assert_eq!(settings.system_message.as_deref(), Some("be terse"));
        assert_eq!(settings.max_iterations, 1);
        assert_eq!(settings.dangerous, vec!["delete"]);
    }
}
