/*!
`fleetctl mcp chat`: talk to a language model that can call the fleet tools.

Modes:
  --message TEXT   one message, print the answer, exit
  --stdin          one message read from stdin
  (neither)        interactive loop; `exit` or `quit` leaves

The completion endpoint is any OpenAI-compatible `/chat/completions` server
(`--api-url`, default the OpenAI API) authenticated with `--api-key` or
`OPENAI_API_KEY`.
*/

use anyhow::{Result, bail};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use cmdtree_mcp::AdapterConfig;
use cmdtree_mcp::chat::{
    ChatClient, ChatEvent, OpenAiCompatibleClient, ProgressFn, system_message,
};

use crate::cmd::shared::local_server;

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Send one message and exit
    #[arg(short, long, value_name = "TEXT")]
    pub message: Option<String>,

    /// Read one message from stdin and exit
    #[arg(long, conflicts_with = "message")]
    pub stdin: bool,

    /// Print the system message before chatting
    #[arg(long)]
    pub show_system_message: bool,

    /// Use this file as the system message instead of the generated one
    #[arg(long, value_name = "PATH")]
    pub system_message_file: Option<PathBuf>,

    /// API key for the completion endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// Completion rounds allowed per message
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<usize>,

    /// Print tool arguments and result previews
    #[arg(long)]
    pub debug: bool,
}

pub async fn execute_chat(args: ChatArgs, config: &AdapterConfig) -> Result<()> {
    let mut config = config.clone();
    if let Some(path) = args.system_message_file {
        config.chat.system_message_file = Some(path);
    }
    if let Some(model) = args.model {
        config.chat.model = model;
    }
    if let Some(url) = args.api_url {
        config.chat.api_url = Some(url);
    }
    if let Some(n) = args.max_iterations {
        config.chat.max_iterations = n;
    }
    let settings = config.chat_settings()?;
    let registry = local_server(&config).tool_registry().clone();

    let one_shot = args.message.is_some() || args.stdin;
    if args.show_system_message {
        let text = settings
            .system_message
            .clone()
            .unwrap_or_else(|| system_message(&registry, &settings.dangerous));
        println!("{text}\n");
        if !one_shot {
            return Ok(());
        }
    }

    let Some(api_key) = args.api_key.filter(|k| !k.trim().is_empty()) else {
        bail!("an API key is required: pass --api-key or set OPENAI_API_KEY");
    };
    let backend = OpenAiCompatibleClient::new(config.chat.api_url.as_deref(), api_key)?;
    tracing::debug!(endpoint = %backend.endpoint(), model = %settings.model, "chat backend ready");

    let model = settings.model.clone();
    let mut client =
        ChatClient::new(registry, Arc::new(backend), settings).with_progress(progress(args.debug));

    if let Some(message) = args.message {
        println!("{}", client.process_message(&message).await?);
        return Ok(());
    }
    if args.stdin {
        let mut message = String::new();
        tokio::io::stdin().read_to_string(&mut message).await?;
        println!("{}", client.process_message(&message).await?);
        return Ok(());
    }
    repl(&mut client, &model).await
}

fn progress(debug: bool) -> ProgressFn {
    Box::new(move |event: &ChatEvent| match event {
        ChatEvent::ToolCall {
            name,
            arguments,
            index,
            total,
        } => {
            println!("[Executing: {name}] (call {index}/{total})");
            if debug {
                println!("  arguments: {arguments}");
            }
        }
        ChatEvent::ToolResult {
            name,
            is_error,
            preview,
        } if debug => {
            let verb = if *is_error { "failed" } else { "returned" };
            println!("  {name} {verb}: {preview}");
        }
        ChatEvent::ToolResult { .. } => {}
    })
}

async fn repl(client: &mut ChatClient, model: &str) -> Result<()> {
    println!("Chatting with {model}. Type 'exit' or 'quit' to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        match client.process_message(line).await {
            Ok(answer) => println!("\n{answer}\n"),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}
