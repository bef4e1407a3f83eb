/*!
MCP binding for the tool and resource registries.

`ProtocolServer` answers tools/list, tools/call, resources/list and
resources/read through rmcp's `ServerHandler`. Protocol tools and resources
are converted once at construction; calls run the synchronous registries on
tokio's blocking pool. A server built without a resource registry does not
advertise the resources capability.

Transports:
  - stdio: frames go to a duplicate of the original fd 1; fd 1 itself is
    pointed at stderr so nothing a handler prints can corrupt the stream.
  - streamable HTTP: rmcp's service mounted at `/mcp` on an axum router.
*/

use std::net::SocketAddr;
use std::sync::Arc;

use rmcp::model::{
    AnnotateAble, CallToolRequestParam, CallToolResult, Content, Implementation,
    ListResourcesResult, ListToolsResult, PaginatedRequestParam, ProtocolVersion, RawResource,
    ReadResourceRequestParam, ReadResourceResult, Resource, ResourceContents, ServerCapabilities,
    ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::transport::StreamableHttpService;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, ServiceExt};
use serde_json::{Map, Value};
use tokio::net::TcpListener;

use crate::error::AdapterError;
use crate::resources::{ResourceDefinition, ResourceRegistry};
use crate::tools::{HELP_ACTION, ToolDefinition, ToolOutput, ToolRegistry};

const TEXT_MIME: &str = "text/plain";

/// Name, version and instructions advertised during initialization.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    /// Replaces the generated instructions when set.
    pub instructions: Option<String>,
}

impl Default for ServerIdentity {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
        }
    }
}

#[derive(Clone)]
pub struct ProtocolServer {
    inner: Arc<Inner>,
}

struct Inner {
    tools: Arc<ToolRegistry>,
    resources: Option<Arc<ResourceRegistry>>,
    tool_list: Vec<Tool>,
    resource_list: Vec<Resource>,
    identity: ServerIdentity,
    instructions: String,
}

impl ProtocolServer {
    pub fn new(
        tools: ToolRegistry,
        resources: Option<ResourceRegistry>,
        identity: ServerIdentity,
    ) -> Self {
        let tool_list = tools
            .hierarchical_tools()
            .iter()
            .filter_map(|def| match to_protocol_tool(def) {
                Ok(tool) => Some(tool),
                Err(e) => {
                    tracing::warn!("{e}");
                    None
                }
            })
            .collect::<Vec<_>>();
        let resource_list = resources
            .iter()
            .flat_map(|r| r.resources())
            .map(|def| to_protocol_resource(&def))
            .collect::<Vec<_>>();
        tracing::info!(
            tools = tool_list.len(),
            resources = resource_list.len(),
            "protocol server ready"
        );

        let instructions = identity
            .instructions
            .clone()
            .unwrap_or_else(|| default_instructions(&tools, resources.as_ref()));
        Self {
            inner: Arc::new(Inner {
                tools: Arc::new(tools),
                resources: resources.map(Arc::new),
                tool_list,
                resource_list,
                identity,
                instructions,
            }),
        }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.inner.tool_list
    }

    pub fn resources(&self) -> &[Resource] {
        &self.inner.resource_list
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.inner.tools
    }

    pub fn resources_enabled(&self) -> bool {
        self.inner.resources.is_some()
    }

    /// Run one tool call to completion. Registry errors come back as an
    /// error result, never as a protocol failure.
    pub async fn handle_call(&self, name: String, arguments: Map<String, Value>) -> CallToolResult {
        let registry = self.inner.tools.clone();
        let outcome =
            tokio::task::spawn_blocking(move || registry.call_tool(&name, arguments)).await;
        match outcome {
            Ok(Ok(output)) => to_call_result(output),
            Ok(Err(e)) => CallToolResult::error(vec![Content::text(format!("Error: {e}"))]),
            Err(e) => CallToolResult::error(vec![Content::text(format!(
                "Error: tool call did not complete: {e}"
            ))]),
        }
    }

    /// Read one resource. Failures are returned as `text/plain` content so
    /// the caller can react to them.
    pub async fn handle_read(&self, uri: String) -> ReadResourceResult {
        let Some(registry) = self.inner.resources.clone() else {
            return ReadResourceResult {
                contents: vec![text_contents(
                    "Error: resources are disabled on this server".to_string(),
                    uri,
                    TEXT_MIME,
                )],
            };
        };
        let key = uri.clone();
        let outcome = tokio::task::spawn_blocking(move || registry.read_resource(&key)).await;
        let contents = match outcome {
            Ok(Ok(content)) => text_contents(content.text, content.uri, &content.mime_type),
            Ok(Err(e)) => {
                tracing::debug!(%uri, "resource read failed: {e}");
                text_contents(format!("Error: {e}"), uri, TEXT_MIME)
            }
            Err(e) => text_contents(format!("Error: read did not complete: {e}"), uri, TEXT_MIME),
        };
        ReadResourceResult {
            contents: vec![contents],
        }
    }

    /* ---- Transports ---- */

    /// Serve over stdin/stdout until the client disconnects.
    pub async fn serve_stdio(self) -> Result<(), AdapterError> {
        #[cfg(unix)]
        let transport = {
            let out = crate::executor::detach_protocol_stdout().map_err(AdapterError::Capture)?;
            (tokio::io::stdin(), tokio::fs::File::from_std(out))
        };
        #[cfg(not(unix))]
        let transport = rmcp::transport::stdio();

        tracing::info!("serving MCP over stdio");
        let running = self
            .serve(transport)
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        let reason = running
            .waiting()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        tracing::info!(?reason, "stdio session ended");
        Ok(())
    }

    /// Serve streamable HTTP at `http://<addr>/mcp`.
    pub async fn serve_http(self, addr: SocketAddr) -> Result<(), AdapterError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_http_on(listener).await
    }

    pub async fn serve_http_on(self, listener: TcpListener) -> Result<(), AdapterError> {
        let local = listener.local_addr()?;
        let service = StreamableHttpService::new(
            move || Ok(self.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );
        let router = axum::Router::new().nest_service("/mcp", service);
        tracing::info!("serving MCP on http://{local}/mcp");
        axum::serve(listener, router)
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))
    }
}

impl ServerHandler for ProtocolServer {
    fn get_info(&self) -> ServerInfo {
        let capabilities = if self.resources_enabled() {
            ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build()
        } else {
            ServerCapabilities::builder().enable_tools().build()
        };
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities,
            server_info: Implementation {
                name: self.inner.identity.name.clone(),
                version: self.inner.identity.version.clone(),
                ..Implementation::from_build_env()
            },
            instructions: Some(self.inner.instructions.clone()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.inner.tool_list.clone(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = %request.name, "tools/call");
        Ok(self
            .handle_call(request.name.to_string(), request.arguments.unwrap_or_default())
            .await)
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: self.inner.resource_list.clone(),
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        if !self.resources_enabled() {
            return Err(McpError::invalid_request("resources are disabled", None));
        }
        Ok(self.handle_read(request.uri).await)
    }
}

/* ---- Conversions ---- */

fn to_protocol_tool(def: &ToolDefinition) -> Result<Tool, AdapterError> {
    match &def.input_schema {
        Value::Object(schema) => Ok(Tool::new(
            def.name.clone(),
            def.description.clone(),
            Arc::new(schema.clone()),
        )),
        _ => Err(AdapterError::SchemaGenerationSkipped(def.name.clone())),
    }
}

fn to_protocol_resource(def: &ResourceDefinition) -> Resource {
    let mut raw = RawResource::new(def.uri.clone(), def.name.clone());
    raw.description = Some(def.description.clone());
    raw.mime_type = Some(def.mime_type.clone());
    raw.no_annotation()
}

fn to_call_result(output: ToolOutput) -> CallToolResult {
    let content = output.content.into_iter().map(Content::text).collect();
    if output.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

fn text_contents(text: String, uri: String, mime: &str) -> ResourceContents {
    let mut contents = ResourceContents::text(text, uri);
    if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
        *mime_type = Some(mime.to_string());
    }
    contents
}

fn default_instructions(tools: &ToolRegistry, resources: Option<&ResourceRegistry>) -> String {
    let help = tools.tool_name(HELP_ACTION);
    let mut text = format!(
        "Tools named {prefix}_<action> run the '{prefix}' command tree. Hierarchical tools \
         need a 'resource'; command options go in 'flags' keyed by long flag name. Call {help} \
         with a 'command' such as '<action> <resource>' to see flags and example arguments.",
        prefix = tools.prefix()
    );
    let Some(resources) = resources else {
        return text;
    };
    let types = resources.resource_types();
    if !types.is_empty() {
        text.push_str(&format!(
            " Read-only views are available as {}://<type>[/<id>] resources for: {}.",
            resources.scheme(),
            types.join(", ")
        ));
    }
    text
}
