/*!
cmdtree-mcp: expose a command tree as MCP tools and resources.

Layers, leaves first:
  - `tree`: the wrapped program's command tree (compiled to clap).
  - `executor`: discovery, path resolution, in-process or sub-process runs
    with captured output.
  - `tools`: action/resource taxonomy, JSON-schema synthesis, call routing.
  - `resources`: read-only URI resources over the same tree.
  - `server`: rmcp binding over stdio or streamable HTTP.
  - `chat`: completion loop that calls the tools as functions.

`fleet` is the sample program bundled with the `fleetctl` binary.
*/

pub mod chat;
pub mod config;
pub mod error;
pub mod executor;
pub mod fleet;
pub mod prompt;
pub mod resources;
pub mod server;
pub mod tools;
pub mod tree;
pub mod utils;

#[cfg(test)]
mod testing;

pub use chat::{ChatClient, ChatError, ChatSettings};
pub use config::AdapterConfig;
pub use error::AdapterError;
pub use executor::{
    CommandExecutor, CommandInfo, CommandRunner, ExecuteResult, ExecutionMode, ExecutionPolicy,
    ExecutorOptions,
};
pub use resources::ResourceRegistry;
pub use server::{ProtocolServer, ServerIdentity};
pub use tools::{RegistryOptions, ToolOutput, ToolRegistry};
pub use tree::{CommandSpec, CommandTree, FlagSpec, Invocation};

use std::sync::Arc;

/// Build the executor, both registries and the protocol server for `tree`.
pub fn build_server(tree: CommandTree, config: &AdapterConfig) -> ProtocolServer {
    let runner: Arc<dyn CommandRunner> =
        Arc::new(CommandExecutor::new(Arc::new(tree), config.executor_options()));
    let tools = ToolRegistry::new(runner.clone(), config.registry_options());
    let resources = config.enable_resources.then(|| {
        ResourceRegistry::new(runner, config.scheme.clone()).with_actions(config.actions.clone())
    });
    ProtocolServer::new(tools, resources, config.server_identity())
}
