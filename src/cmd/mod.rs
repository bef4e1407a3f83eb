/*!
`fleetctl mcp` subcommands.

Each module exposes one `Args` struct and one async `execute_*` entry point
returning `anyhow::Result<()>`:

  serve.rs      run the MCP server (stdio or streamable HTTP)
  chat.rs       language-model chat over the tools
  tools.rs      list tools / show one tool's parameters
  call.rs       invoke one tool
  resources.rs  list resources / read one

`tools`, `call` and `resources` talk to the bundled adapter in-process, or
to a spawned MCP server given with `--target` (see `target.rs`).
`shared.rs` and `format.rs` hold what they have in common.
*/

pub mod call;
pub mod chat;
pub mod format;
pub mod resources;
pub mod serve;
pub mod shared;
pub mod target;
pub mod tools;

pub use call::{CallArgs, execute_call};
pub use chat::{ChatArgs, execute_chat};
pub use resources::{ResourcesArgs, execute_resources};
pub use serve::{ServeArgs, execute_serve};
pub use tools::{ToolsArgs, execute_tools};
