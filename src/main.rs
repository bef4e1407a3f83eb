use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use cmdtree_mcp::{AdapterConfig, ExecutionPolicy, fleet, utils};

mod cmd;

use cmd::{CallArgs, ChatArgs, ResourcesArgs, ServeArgs, ToolsArgs};

/// Expose the fleet command tree as MCP tools and resources.
///
/// Layout:
///   fleetctl mcp serve [--transport stdio|http] [--port N]
///   fleetctl mcp chat [--message TEXT | --stdin] [--model M] [--api-url URL]
///   fleetctl mcp tools [NAME] [--json] [-t "<server command>"]
///   fleetctl mcp call <TOOL> [--param k=v ...] [--param-file F] [--json]
///   fleetctl mcp resources [URI] [--json]
///
/// Global flags / env:
///   -v / -vv          Increase verbosity (logs go to stderr; RUST_LOG overrides)
///   -q / --quiet      Errors only
///   --config PATH     Adapter config, JSON or YAML (CMDTREE_CONFIG)
///   --policy P        in-process | sub-process | auto (CMDTREE_POLICY)
///   --no-resources    Serve tools only
///
/// Examples:
///   fleetctl mcp tools fleet_create
///   fleetctl mcp call fleet_list -p resource=clusters -p all=true
///   fleetctl mcp resources fleet://clusters/alpha
///   fleetctl mcp tools -t "fleetctl mcp serve --policy sub-process"
#[derive(Parser, Debug)]
#[command(
    name = "fleetctl mcp",
    bin_name = "fleetctl mcp",
    version,
    about = "MCP adapter for the fleet command tree",
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Adapter config file (JSON or YAML)
    #[arg(long, global = true, env = "CMDTREE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// How wrapped commands are executed
    #[arg(long, global = true, env = "CMDTREE_POLICY", value_enum)]
    policy: Option<ExecutionPolicy>,

    /// Do not register resources
    #[arg(long, global = true)]
    no_resources: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the tools and resources over MCP
    Serve(ServeArgs),

    /// Chat with a language model that can call the tools
    Chat(ChatArgs),

    /// List tools or show one tool
    Tools(ToolsArgs),

    /// Invoke a tool
    Call(CallArgs),

    /// List resources or read one
    Resources(ResourcesArgs),
}

fn main() -> Result<()> {
    let args: Vec<OsString> = std::env::args_os().collect();
    if args.get(1).is_none_or(|a| a != "mcp") {
        std::process::exit(fleet::tree().run_main());
    }

    let cli = Cli::parse_from(args.into_iter().skip(1));
    utils::init_logging(utils::derive_level(cli.verbose, cli.quiet));

    let mut config = AdapterConfig::for_program(fleet::PROGRAM);
    if let Some(path) = &cli.config {
        config = AdapterConfig::load_over(config, path)?;
    }
    if let Some(policy) = cli.policy {
        config.policy = policy;
    }
    if cli.no_resources {
        config.enable_resources = false;
    }

    utils::block_on(async move {
        match cli.command {
            Commands::Serve(args) => cmd::execute_serve(args, &config).await,
            Commands::Chat(args) => cmd::execute_chat(args, &config).await,
            Commands::Tools(args) => cmd::execute_tools(args, &config).await,
            Commands::Call(args) => cmd::execute_call(args, &config).await,
            Commands::Resources(args) => cmd::execute_resources(args, &config).await,
        }
    })?
}
