//! `fleetctl mcp resources [URI] [--json] [-t TARGET]`: list resources, or
//! read one.

use anyhow::{Result, bail};
use clap::Args;
use serde_json::{Value, json};

use cmdtree_mcp::AdapterConfig;

use crate::cmd::format::{StyleOptions, box_header, emoji, table};
use crate::cmd::shared::Endpoint;

#[derive(Args, Debug)]
pub struct ResourcesArgs {
    /// Resource to read, e.g. fleet://clusters/alpha
    #[arg(value_name = "URI")]
    pub uri: Option<String>,

    /// Output JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,

    /// MCP server command to spawn instead of the bundled adapter
    #[arg(short = 't', long, env = "MCP_TARGET")]
    pub target: Option<String>,
}

pub async fn execute_resources(args: ResourcesArgs, config: &AdapterConfig) -> Result<()> {
    let endpoint = Endpoint::open(config, args.target.as_deref()).await?;
    let label = endpoint.label();
    let outcome = match &args.uri {
        Some(uri) => endpoint.read_resource(uri).await.map(Listing::Read),
        None => endpoint
            .list_resources()
            .await
            .and_then(|r| Ok(Listing::All(serde_json::to_value(r)?))),
    };
    endpoint.close().await;

    match outcome? {
        Listing::All(list) => print_list(list, &label, args.json),
        Listing::Read(contents) => print_contents(&contents, args.json),
    }
}

enum Listing {
    All(Value),
    Read(Vec<Value>),
}

fn print_list(list: Value, label: &str, as_json: bool) -> Result<()> {
    let items = list.as_array().cloned().unwrap_or_default();
    if as_json {
        let out = json!({
            "status": "ok",
            "target": label,
            "count": items.len(),
            "resources": items,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let style = StyleOptions::detect();
    let title = format!("{} Resources ({})", emoji("resource", &style), items.len());
    println!("{}", box_header(title.trim(), Some(label), &style));
    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|r| {
            ["uri", "name", "description"]
                .iter()
                .map(|k| r[*k].as_str().unwrap_or_default().to_string())
                .collect()
        })
        .collect();
    println!("{}", table(&["URI", "NAME", "DESCRIPTION"], &rows, &style));
    Ok(())
}

/// JSON contents are re-indented; anything else prints verbatim. A failed
/// read (plain-text `Error: ...` content) becomes the command's error.
fn print_contents(contents: &[Value], as_json: bool) -> Result<()> {
    let failure = contents.iter().find_map(|c| {
        c["text"]
            .as_str()
            .filter(|t| c["mimeType"] == "text/plain" && t.starts_with("Error: "))
    });
    if let Some(message) = failure {
        bail!("{}", message.trim_start_matches("Error: "));
    }
    if as_json {
        println!("{}", serde_json::to_string_pretty(contents)?);
        return Ok(());
    }
    for item in contents {
        let text = item["text"].as_str().unwrap_or_default();
        let pretty = (item["mimeType"] == "application/json")
            .then(|| serde_json::from_str::<Value>(text).ok())
            .flatten()
            .and_then(|v| serde_json::to_string_pretty(&v).ok());
        println!("{}", pretty.as_deref().unwrap_or(text));
    }
    Ok(())
}
