/*!
Resource registry: read-only, URI-addressable views over list/describe
commands.

Resource types are every distinct second path segment plus every
single-segment leaf command. Each type gets two definitions:

  <scheme>://<type>          -> list <plural(type)>
  <scheme>://<type>/{id}     -> describe <singular(type)> --id/--name/--<singular> <id>

A single-segment leaf type runs the leaf itself.
*/

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AdapterError;
use crate::executor::{CommandInfo, CommandRunner};

pub const JSON_MIME: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

pub struct ResourceRegistry {
    runner: Arc<dyn CommandRunner>,
    scheme: String,
    actions: Option<Vec<String>>,
}

impl ResourceRegistry {
    pub fn new(runner: Arc<dyn CommandRunner>, scheme: impl Into<String>) -> Self {
        Self {
            runner,
            scheme: scheme.into(),
            actions: None,
        }
    }

    /// Only derive resources from these actions.
    pub fn with_actions(mut self, actions: Option<Vec<String>>) -> Self {
        self.actions = actions;
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    fn allowed(&self, info: &CommandInfo) -> bool {
        match &self.actions {
            Some(list) => list.iter().any(|a| a == info.action()),
            None => true,
        }
    }

    fn is_leaf(&self, action: &str) -> bool {
        !self
            .runner
            .commands()
            .iter()
            .any(|c| c.action() == action && c.path.len() > 1)
    }

    /// Distinct resource types, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        let mut types = BTreeSet::new();
        for info in self.runner.commands().iter().filter(|c| self.allowed(c)) {
            match info.path.len() {
                1 if self.is_leaf(info.action()) => {
                    types.insert(info.action().to_string());
                }
                n if n >= 2 => {
                    types.insert(info.path[1].clone());
                }
                _ => {}
            }
        }
        types.into_iter().collect()
    }

    pub fn resources(&self) -> Vec<ResourceDefinition> {
        let mut out = Vec::new();
        for kind in self.resource_types() {
            out.push(ResourceDefinition {
                uri: format!("{}://{kind}", self.scheme),
                name: kind.clone(),
                description: format!("All {} ({} output)", pluralize(&kind), JSON_MIME),
                mime_type: JSON_MIME.to_string(),
            });
            out.push(ResourceDefinition {
                uri: format!("{}://{kind}/{{id}}", self.scheme),
                name: format!("{} by id", singular(&kind)),
                description: format!("A single {} by id or name", singular(&kind)),
                mime_type: JSON_MIME.to_string(),
            });
        }
        out
    }

    pub fn read_resource(&self, uri: &str) -> Result<ResourceContent, AdapterError> {
        let (kind, id) = self.parse_uri(uri)?;
        let (path, flags, args) = self.plan(&kind, id.as_deref());
        tracing::debug!(uri, ?path, "reading resource");

        let result = self
            .runner
            .execute(&path, &flags, &args)?
            .check(&path)
            .map_err(|e| match e {
                AdapterError::ExecutionFailure { stderr, .. } => AdapterError::ResourceRead {
                    uri: uri.to_string(),
                    message: stderr,
                },
                other => other,
            })?;
        let text = if result.stdout.trim().is_empty() {
            "{}".to_string()
        } else {
            result.stdout
        };
        Ok(ResourceContent {
            uri: uri.to_string(),
            mime_type: JSON_MIME.to_string(),
            text,
        })
    }

    /// `scheme://type[/id]` into `(type, id)`.
    fn parse_uri(&self, uri: &str) -> Result<(String, Option<String>), AdapterError> {
        let invalid = |reason: &str| AdapterError::InvalidResourceUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| invalid("expected scheme://type[/id]"))?;
        if scheme != self.scheme {
            return Err(invalid(&format!("scheme must be '{}'", self.scheme)));
        }
        let rest = rest.trim_end_matches('/');
        let (kind, id) = match rest.split_once('/') {
            Some((kind, id)) => (kind, Some(id)),
            None => (rest, None),
        };
        if kind.is_empty() {
            return Err(invalid("missing resource type"));
        }
        let id = id.filter(|i| !i.is_empty() && *i != "{id}");
        Ok((kind.to_string(), id.map(str::to_string)))
    }

    fn plan(
        &self,
        kind: &str,
        id: Option<&str>,
    ) -> (Vec<String>, Map<String, Value>, Vec<String>) {
        let commands = self.runner.commands();
        let exists = |path: &[&str]| {
            commands
                .iter()
                .any(|c| c.path.iter().map(String::as_str).eq(path.iter().copied()))
        };

        if exists(&[kind]) && self.is_leaf(kind) {
            let args = id.map(|i| vec![i.to_string()]).unwrap_or_default();
            return (vec![kind.to_string()], Map::new(), args);
        }

        match id {
            Some(id) => {
                let single = singular(kind);
                let target = if exists(&["describe", single.as_str()])
                    || !exists(&["describe", kind])
                {
                    single.clone()
                } else {
                    kind.to_string()
                };
                let mut flags = Map::new();
                for name in ["id", "name", single.as_str()] {
                    flags.insert(name.to_string(), Value::String(id.to_string()));
                }
                (vec!["describe".to_string(), target], flags, Vec::new())
            }
            None => {
                let plural = pluralize(kind);
                let target =
                    if exists(&["list", plural.as_str()]) || !exists(&["list", kind]) {
                        plural
                    } else {
                        kind.to_string()
                    };
                (vec!["list".to_string(), target], Map::new(), Vec::new())
            }
        }
    }
}

/// English plural of a resource noun (`cluster` -> `clusters`, `policy` ->
/// `policies`); already-plural words are returned unchanged.
pub fn pluralize(word: &str) -> String {
    if word.ends_with('s') && !word.ends_with("ss") {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix('y')
        && !stem.ends_with(['a', 'e', 'i', 'o', 'u'])
        && !stem.is_empty()
    {
        return format!("{stem}ies");
    }
    if word.ends_with("ss") || word.ends_with('x') || word.ends_with("ch") || word.ends_with("sh") {
        return format!("{word}es");
    }
    format!("{word}s")
}

pub fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "xes", "ches", "shes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.ends_with('s') && !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRunner, command, flag, sample_commands};
    use crate::tree::FlagKind;

    fn registry_with(runner: Arc<RecordingRunner>) -> ResourceRegistry {
        ResourceRegistry::new(runner, "fleet")
    }

    #[test]
    fn plural_and_singular() {
        assert_eq!(pluralize("cluster"), "clusters");
        assert_eq!(pluralize("clusters"), "clusters");
        assert_eq!(pluralize("policy"), "policies");
        assert_eq!(pluralize("gateway"), "gateways");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(singular("clusters"), "cluster");
        assert_eq!(singular("policies"), "policy");
        assert_eq!(singular("addresses"), "address");
        assert_eq!(singular("cluster"), "cluster");
    }

    #[test]
    fn types_and_definitions() {
        let reg = registry_with(Arc::new(RecordingRunner::new(sample_commands())));
        assert_eq!(
            reg.resource_types(),
            vec!["cluster", "clusters", "role", "roles", "whoami"]
        );
        let defs = reg.resources();
        assert_eq!(defs.len(), 10);
        assert!(defs.iter().any(|d| d.uri == "fleet://clusters"));
        assert!(defs.iter().any(|d| d.uri == "fleet://clusters/{id}"));
        assert!(defs.iter().all(|d| d.mime_type == JSON_MIME));
    }

    #[test]
    fn collection_read_lists_plural() {
        let runner = Arc::new(RecordingRunner::new(sample_commands()));
        let reg = registry_with(runner.clone());
        let content = reg.read_resource("fleet://cluster").unwrap();
        assert_eq!(content.mime_type, JSON_MIME);
        assert_eq!(runner.calls()[0].path, vec!["list", "clusters"]);
    }

    #[test]
    fn item_read_describes_singular_with_id_flags() {
        let runner = Arc::new(RecordingRunner::new(sample_commands()));
        let reg = registry_with(runner.clone());
        reg.read_resource("fleet://clusters/abc").unwrap();
        let call = &runner.calls()[0];
        assert_eq!(call.path, vec!["describe", "cluster"]);
        assert_eq!(call.flags["id"], "abc");
        assert_eq!(call.flags["name"], "abc");
        assert_eq!(call.flags["cluster"], "abc");
    }

    #[test]
    fn leaf_types_run_the_leaf() {
        let runner = Arc::new(RecordingRunner::new(sample_commands()));
        let reg = registry_with(runner.clone());
        reg.read_resource("fleet://whoami").unwrap();
        assert_eq!(runner.calls()[0].path, vec!["whoami"]);
    }

    #[test]
    fn empty_output_becomes_empty_object() {
        let mut runner = RecordingRunner::new(vec![
            command(&["list", "things"], vec![]),
            command(&["describe", "thing"], vec![flag("id", FlagKind::String, "", false)]),
        ]);
        runner.stdout = "  \n".into();
        let reg = registry_with(Arc::new(runner));
        assert_eq!(reg.read_resource("fleet://things").unwrap().text, "{}");
    }

    #[test]
    fn failures_and_bad_uris() {
        let runner = Arc::new(RecordingRunner::new(sample_commands()).failing("no such cluster"));
        let reg = registry_with(runner);
        match reg.read_resource("fleet://clusters/zzz") {
            Err(AdapterError::ResourceRead { message, .. }) => {
                assert_eq!(message, "no such cluster")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            reg.read_resource("other://clusters"),
            Err(AdapterError::InvalidResourceUri { .. })
        ));
        assert!(matches!(
            reg.read_resource("clusters"),
            Err(AdapterError::InvalidResourceUri { .. })
        ));
    }
}
