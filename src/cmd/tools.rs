/*!
`fleetctl mcp tools [NAME] [--json] [-t TARGET]`

Without NAME: one row per tool. With NAME: the tool's description and a
parameter table (nested `flags` listed as `flags.<name>`).

JSON shapes:
  list   {"status","target","elapsed_ms","count","tools":[{"name","description","parameters"}]}
  single {"status","target","elapsed_ms","name","tool":{..raw..},"parameters":[..]}
*/

use anyhow::{Result, anyhow};
use clap::Args;
use rmcp::model::Tool;
use serde_json::{Value, json};
use std::time::Instant;

use cmdtree_mcp::AdapterConfig;

use crate::cmd::format::{StyleOptions, box_header, emoji, table, truncate_ellipsis};
use crate::cmd::shared::{Endpoint, ParamRow, find_tool, schema_rows};

#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Show one tool in detail
    #[arg(value_name = "NAME")]
    pub name: Option<String>,

    /// Output JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,

    /// MCP server command to spawn instead of the bundled adapter
    #[arg(short = 't', long, env = "MCP_TARGET")]
    pub target: Option<String>,
}

pub async fn execute_tools(args: ToolsArgs, config: &AdapterConfig) -> Result<()> {
    let started = Instant::now();
    let endpoint = Endpoint::open(config, args.target.as_deref()).await?;
    let label = endpoint.label();
    let listed = endpoint.list_tools().await;
    endpoint.close().await;
    let tools = listed?;
    let elapsed_ms = started.elapsed().as_millis();

    match args.name.as_deref() {
        None => print_list(&tools, &label, elapsed_ms, args.json),
        Some(name) => {
            let tool = find_tool(&tools, name).ok_or_else(|| {
                let known: Vec<&str> = tools.iter().map(|t| &*t.name).collect();
                anyhow!("tool '{name}' not found; available: {}", known.join(", "))
            })?;
            print_single(tool, &label, elapsed_ms, args.json)
        }
    }
}

fn print_list(tools: &[Tool], label: &str, elapsed_ms: u128, as_json: bool) -> Result<()> {
    if as_json {
        let items: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": description(t),
                    "parameters": params_json(&schema_rows(&t.input_schema)),
                })
            })
            .collect();
        let out = json!({
            "status": "ok",
            "target": label,
            "elapsed_ms": elapsed_ms,
            "count": tools.len(),
            "tools": items,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let style = StyleOptions::detect();
    let title = format!("{} Tools ({})", emoji("tool", &style), tools.len());
    let subtitle = format!("{label} • {elapsed_ms}ms");
    println!("{}", box_header(title.trim(), Some(&subtitle), &style));
    if tools.is_empty() {
        println!("(none)");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = tools
        .iter()
        .enumerate()
        .map(|(i, t)| {
            vec![
                (i + 1).to_string(),
                t.name.to_string(),
                schema_rows(&t.input_schema).len().to_string(),
                truncate_ellipsis(first_line(description(t)), 120),
            ]
        })
        .collect();
    println!("{}", table(&["#", "NAME", "PARAMS", "DESCRIPTION"], &rows, &style));
    Ok(())
}

fn print_single(tool: &Tool, label: &str, elapsed_ms: u128, as_json: bool) -> Result<()> {
    let params = schema_rows(&tool.input_schema);
    if as_json {
        let out = json!({
            "status": "ok",
            "target": label,
            "elapsed_ms": elapsed_ms,
            "name": tool.name,
            "tool": serde_json::to_value(tool)?,
            "parameters": params_json(&params),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let style = StyleOptions::detect();
    let title = format!("{} {}", emoji("tool", &style), tool.name);
    println!("{}", box_header(title.trim(), Some(label), &style));
    println!("{}", description(tool));
    println!();
    if params.is_empty() {
        println!("Parameters: (none)");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = params
        .into_iter()
        .map(|p| {
            vec![
                p.name,
                p.kind,
                if p.required { "yes" } else { "no" }.to_string(),
                if p.description.is_empty() { "-".to_string() } else { first_line(&p.description).to_string() },
            ]
        })
        .collect();
    println!("{}", table(&["NAME", "TYPE", "REQ", "DESCRIPTION"], &rows, &style));
    Ok(())
}

fn description(tool: &Tool) -> &str {
    tool.description.as_deref().unwrap_or_default()
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}

fn params_json(rows: &[ParamRow]) -> Vec<Value> {
    rows.iter()
        .map(|p| {
            json!({
                "name": p.name,
                "type": p.kind,
                "required": p.required,
                "description": p.description,
            })
        })
        .collect()
}
