//! `--target` parsing: a local MCP server command line.
//!
//! The child is spawned with rmcp's child-process transport and its stderr
//! discarded. http(s) and ws(s) URLs are rejected while parsing.

use anyhow::{Context, Result, bail};
use rmcp::service::RunningService;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use std::fmt;
use tokio::process::Command;
use url::Url;

/// Server started as a child process speaking MCP on stdio.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "local: {}", self.program)
        } else {
            write!(f, "local: {} {}", self.program, self.args.join(" "))
        }
    }
}

/// Split `raw` with shell rules into a local command. http/ws URLs are an
/// error.
pub fn parse_target(raw: &str) -> Result<TargetSpec> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("target is empty");
    }

    if let Ok(url) = Url::parse(trimmed)
        && matches!(url.scheme(), "http" | "https" | "ws" | "wss")
    {
        bail!("remote targets are not supported ({url}); pass a local server command");
    }

    let mut parts = shell_words::split(trimmed)
        .with_context(|| format!("cannot split target command line: {trimmed}"))?
        .into_iter();
    let program = parts.next().filter(|p| !p.is_empty());
    let Some(program) = program else {
        bail!("target has no program name");
    };
    Ok(TargetSpec {
        program,
        args: parts.collect(),
    })
}

/// Spawn and initialize a local target.
pub async fn connect(spec: &TargetSpec) -> Result<RunningService<RoleClient, ()>> {
    let transport = TokioChildProcess::new(Command::new(&spec.program).configure(|c| {
        c.args(&spec.args);
        c.stderr(std::process::Stdio::null());
    }))
    .with_context(|| format!("failed to spawn {spec}"))?;
    let service = ()
        .serve(transport)
        .await
        .with_context(|| format!("failed to initialize MCP session with {spec}"))?;
    tracing::debug!(peer = ?service.peer_info(), "connected to {spec}");
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rejected() {
        for raw in ["https://example.com/mcp", "wss://mcp.example/ws", "http://localhost:1/mcp"] {
            let err = parse_target(raw).unwrap_err().to_string();
            assert!(err.contains("not supported"), "{err}");
        }
    }

    #[test]
    fn commands_are_shell_split() {
        let spec = parse_target(r#"fleetctl mcp serve --config "/tmp/my dir/c.yaml""#).unwrap();
        assert_eq!(spec.program, "fleetctl");
        assert_eq!(spec.args, ["mcp", "serve", "--config", "/tmp/my dir/c.yaml"]);
        assert_eq!(spec.to_string(), "local: fleetctl mcp serve --config /tmp/my dir/c.yaml");
    }

    #[test]
    fn other_schemes_fall_back_to_commands() {
        let spec = parse_target("ftp://example.com/x").unwrap();
        assert_eq!(spec.program, "ftp://example.com/x");
        assert!(spec.args.is_empty());
    }

    #[test]
    fn empty_and_unbalanced_targets_are_rejected() {
        assert!(parse_target("   ").unwrap_err().to_string().contains("empty"));
        assert!(parse_target("server \"unterminated").is_err());
    }

    #[tokio::test]
    async fn missing_program_fails_to_connect() {
        let spec = parse_target("/definitely/missing/mcp-server serve").unwrap();
        let err = connect(&spec).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to spawn"));
    }
}
