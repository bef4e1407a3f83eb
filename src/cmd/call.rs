/*!
`fleetctl mcp call <TOOL> [--param KEY=VALUE]... [--param-file FILE] [--json] [--raw]`

Arguments come from the tool's input schema: `--param` values are coerced by
declared type, flag names may be given bare (`--param replicas=3`) or dotted
(`--param flags.replicas=3`), and `--param` overrides the parameter file.

JSON output:
  {"status":"ok"|"error","tool","target","elapsed_ms","arguments","content":[..text..]}
  with `"result"` (the raw protocol result) added under --raw.

A result flagged as an error exits non-zero.
*/

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use serde_json::{Map, json};
use std::path::PathBuf;
use std::time::Instant;

use cmdtree_mcp::AdapterConfig;

use crate::cmd::format::{Role, StyleOptions, box_header, color, emoji, table};
use crate::cmd::shared::{
    Endpoint, build_arguments, call_outcome, find_tool, load_param_file, parse_params,
};

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Tool to invoke, e.g. fleet_list
    #[arg(value_name = "TOOL")]
    pub tool: String,

    /// Parameter (KEY=VALUE), repeatable
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Load parameters from a JSON or YAML file
    #[arg(long = "param-file", value_name = "PATH")]
    pub param_file: Option<PathBuf>,

    /// MCP server command to spawn instead of the bundled adapter
    #[arg(short = 't', long, env = "MCP_TARGET")]
    pub target: Option<String>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,

    /// Include the raw protocol result
    #[arg(long)]
    pub raw: bool,
}

pub async fn execute_call(args: CallArgs, config: &AdapterConfig) -> Result<()> {
    let tool_name = args.tool.trim();
    if tool_name.is_empty() {
        bail!("tool name cannot be empty");
    }
    let provided = parse_params(&args.params)?;
    let base = match &args.param_file {
        Some(path) => load_param_file(path)?,
        None => Map::new(),
    };

    let started = Instant::now();
    let endpoint = Endpoint::open(config, args.target.as_deref()).await?;
    let label = endpoint.label();
    let outcome = async {
        let tools = endpoint.list_tools().await?;
        let tool = find_tool(&tools, tool_name)
            .ok_or_else(|| anyhow!("tool '{tool_name}' not found"))?;
        let arguments = build_arguments(&tool.input_schema, base, &provided)
            .context("failed to build arguments")?;
        let result = endpoint.call_tool(&tool.name, arguments.clone()).await?;
        Ok::<_, anyhow::Error>((tool.name.to_string(), arguments, result))
    }
    .await;
    endpoint.close().await;
    let (resolved, arguments, result) = outcome?;
    let elapsed_ms = started.elapsed().as_millis();
    let (texts, is_error) = call_outcome(&result);

    if args.json {
        let mut out = json!({
            "status": if is_error { "error" } else { "ok" },
            "tool": resolved,
            "target": label,
            "elapsed_ms": elapsed_ms,
            "arguments": arguments,
            "content": texts,
        });
        if args.raw {
            out["result"] = serde_json::to_value(&result)?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let style = StyleOptions::detect();
        let (tag, role, verb) = if is_error {
            ("error", Role::Error, "failed")
        } else {
            ("success", Role::Success, "ok")
        };
        let title = format!("{} {resolved} {}", emoji(tag, &style), color(role, verb, &style));
        let subtitle = format!("{label} • {elapsed_ms}ms");
        println!("{}", box_header(title.trim(), Some(&subtitle), &style));

        if !arguments.is_empty() {
            let rows: Vec<Vec<String>> = arguments
                .iter()
                .map(|(k, v)| {
                    let shown = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                    vec![k.clone(), shown]
                })
                .collect();
            println!("{}", table(&["ARGUMENT", "VALUE"], &rows, &style));
            println!();
        }
        if args.raw {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            for text in &texts {
                println!("{text}");
            }
        }
    }

    if is_error {
        bail!("tool '{resolved}' reported an error");
    }
    Ok(())
}
