/*!
Function-calling chat loop over the tool registry.

A `ChatClient` owns one transcript. Each user message runs a bounded loop:
send transcript and tool schemas to the completion backend, execute any
requested tool calls through `ToolRegistry::call_tool`, append their results,
repeat until the model answers without calling a tool.
*/

pub mod completion;

use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::tools::{ActionKind, HELP_ACTION, ToolRegistry};

pub use completion::{
    AssistantMessage, ChatMessage, CompletionBackend, CompletionError, CompletionRequest,
    DEFAULT_MODEL, FunctionCall, OpenAiCompatibleClient, ToolCall,
};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(
        "no final answer after {0} completion rounds; ask a narrower question or raise the \
         iteration limit"
    )]
    IterationLimit(usize),

    #[error("message cannot be empty")]
    EmptyMessage,
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub max_iterations: usize,
    /// Replaces the generated system message.
    pub system_message: Option<String>,
    /// `action` or `action/resource` entries that need user confirmation.
    pub dangerous: Vec<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_message: None,
            dangerous: Vec::new(),
        }
    }
}

/// Progress notifications for front-ends.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    ToolCall {
        name: String,
        arguments: String,
        index: usize,
        total: usize,
    },
    ToolResult {
        name: String,
        is_error: bool,
        preview: String,
    },
}

pub type ProgressFn = Box<dyn Fn(&ChatEvent) + Send + Sync>;

const PREVIEW_CHARS: usize = 200;

pub struct ChatClient {
    registry: Arc<ToolRegistry>,
    backend: Arc<dyn CompletionBackend>,
    settings: ChatSettings,
    functions: Vec<Value>,
    messages: Vec<ChatMessage>,
    progress: Option<ProgressFn>,
}

impl ChatClient {
    pub fn new(
        registry: Arc<ToolRegistry>,
        backend: Arc<dyn CompletionBackend>,
        settings: ChatSettings,
    ) -> Self {
        let system = settings
            .system_message
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| system_message(&registry, &settings.dangerous));
        let functions = function_schemas(&registry);
        Self {
            registry,
            backend,
            settings,
            functions,
            messages: vec![ChatMessage::System { content: system }],
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn system_text(&self) -> &str {
        match self.messages.first() {
            Some(ChatMessage::System { content }) => content,
            _ => "",
        }
    }

    /// Send one user message and return the model's final text answer.
    pub async fn process_message(&mut self, text: &str) -> Result<String, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.messages.push(ChatMessage::User {
            content: text.to_string(),
        });

        for round in 0..self.settings.max_iterations {
            let reply = self
                .backend
                .complete(CompletionRequest {
                    model: &self.settings.model,
                    messages: &self.messages,
                    tools: &self.functions,
                })
                .await?;
            let calls = reply.calls().to_vec();
            self.messages.push(ChatMessage::Assistant(reply.clone()));

            if calls.is_empty() {
                return Ok(reply.content.unwrap_or_default());
            }
            tracing::debug!(round, calls = calls.len(), "model requested tool calls");

            let total = calls.len();
            for (index, call) in calls.into_iter().enumerate() {
                self.notify(ChatEvent::ToolCall {
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                    index: index + 1,
                    total,
                });
                let (content, is_error) = self.invoke(&call).await;
                self.notify(ChatEvent::ToolResult {
                    name: call.function.name.clone(),
                    is_error,
                    preview: preview(&content),
                });
                self.messages.push(ChatMessage::Tool {
                    tool_call_id: call.id,
                    content,
                });
            }
        }
        Err(ChatError::IterationLimit(self.settings.max_iterations))
    }

    fn notify(&self, event: ChatEvent) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }

    /// Run one tool call; the text goes back to the model as-is.
    async fn invoke(&self, call: &ToolCall) -> (String, bool) {
        let name = call.function.name.clone();
        let arguments = match parse_arguments(&call.function.arguments) {
            Ok(a) => a,
            Err(e) => return (format!("Error: invalid arguments for {name}: {e}"), true),
        };
        let registry = self.registry.clone();
        let outcome =
            tokio::task::spawn_blocking(move || registry.call_tool(&name, arguments)).await;
        match outcome {
            Ok(Ok(output)) => (output.to_json().to_string(), output.is_error),
            Ok(Err(e)) => (format!("Error: {e}"), true),
            Err(e) => (format!("Error: tool call did not complete: {e}"), true),
        }
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Function-calling schemas for every tool the registry lists.
pub fn function_schemas(registry: &ToolRegistry) -> Vec<Value> {
    registry
        .hierarchical_tools()
        .into_iter()
        .map(|tool| {
            let mut parameters = match tool.input_schema {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            parameters.insert("type".into(), json!("object"));
            let properties = parameters
                .entry("properties")
                .or_insert_with(|| json!({}));
            if let Value::Object(props) = properties {
                for prop in props.values_mut() {
                    if prop["type"] == "array" && prop.get("items").is_none() {
                        prop["items"] = json!({"type": "string"});
                    }
                }
            }
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": parameters,
                }
            })
        })
        .collect()
}

/// System prompt built from the tool taxonomy.
pub fn system_message(registry: &ToolRegistry, dangerous: &[String]) -> String {
    let prefix = registry.prefix();
    let help = registry.tool_name(HELP_ACTION);
    let mut hierarchical = String::new();
    let mut standalone = String::new();
    for action in registry.actions() {
        let name = registry.tool_name(&action);
        match registry.action_kind(&action) {
            Some(ActionKind::Hierarchical(resources)) => {
                let _ = writeln!(hierarchical, "  - {name}: {}", resources.join(", "));
            }
            Some(ActionKind::Standalone) => {
                let _ = writeln!(standalone, "  - {name}");
            }
            None => {}
        }
    }

    let mut out = format!(
        "You are a helpful assistant that operates the '{prefix}' command line tool through \
         function calls.\n\nTOOL USAGE:\n"
    );
    if !hierarchical.is_empty() {
        out.push_str("- Hierarchical tools REQUIRE a 'resource' parameter. Tools and resources:\n");
        out.push_str(&hierarchical);
    }
    if !standalone.is_empty() {
        out.push_str("- Standalone tools take no 'resource' parameter:\n");
        out.push_str(&standalone);
    }
    out.push_str(
        "- Put command options in the 'flags' object, keyed by flag name without the '--' \
         prefix. Positional arguments go in 'args'.\n",
    );
    let _ = write!(
        out,
        "\nOUTPUT FORMAT:\n- Commands return JSON where they support it. Parse it and present \
         the key fields (name, id, status) clearly and concisely.\n\nERRORS AND HELP:\n- If you \
         are unsure about a command or its options, call {help} with 'command' set to \
         '<action> <resource>'.\n- If a call fails, read the error, explain it, and suggest \
         {help} or a corrected call.\n"
    );

    if !dangerous.is_empty() {
        let ops: Vec<String> = dangerous
            .iter()
            .map(|d| match d.split_once('/') {
                Some((action, resource)) => {
                    format!("{} with resource '{resource}'", registry.tool_name(action))
                }
                None => registry.tool_name(d),
            })
            .collect();
        let _ = write!(
            out,
            "\nDESTRUCTIVE OPERATIONS (explicit confirmation required):\n- {}\n- Before calling \
             one of these: explain what will change, name the affected resource, ask \"Are you \
             sure you want to <action> <resource>?\" and wait for an explicit yes.\n- If the \
             intent is unclear, ask instead of assuming.\n",
            ops.join("\n- ")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRunner, sample_commands};
    use crate::tools::RegistryOptions;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays scripted replies and records request sizes.
    struct FakeBackend {
        replies: Mutex<VecDeque<AssistantMessage>>,
        repeat: Option<AssistantMessage>,
        seen: Mutex<Vec<usize>>,
    }

    impl FakeBackend {
        fn scripted(replies: Vec<AssistantMessage>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                repeat: None,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn forever(reply: AssistantMessage) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                repeat: Some(reply),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for FakeBackend {
        async fn complete(
            &self,
            request: CompletionRequest<'_>,
        ) -> Result<AssistantMessage, CompletionError> {
            assert!(!request.tools.is_empty());
            self.seen.lock().push(request.messages.len());
            let next = self.replies.lock().pop_front();
            next.or_else(|| self.repeat.clone())
                .ok_or_else(|| CompletionError::Decode("script exhausted".into()))
        }
    }

    fn tool_reply(calls: Vec<ToolCall>) -> AssistantMessage {
        AssistantMessage {
            content: None,
            tool_calls: Some(calls),
        }
    }

    fn setup(backend: Arc<FakeBackend>) -> (Arc<RecordingRunner>, ChatClient) {
        let runner = Arc::new(RecordingRunner::new(sample_commands()));
        let registry = Arc::new(ToolRegistry::new(
            runner.clone(),
            RegistryOptions {
                prefix: "fleet".into(),
                ..Default::default()
            },
        ));
        let settings = ChatSettings {
            max_iterations: 3,
            dangerous: vec!["create/cluster".into()],
            ..Default::default()
        };
        (runner, ChatClient::new(registry, backend, settings))
    }

    #[tokio::test]
    async fn plain_answer() {
        let backend = FakeBackend::scripted(vec![AssistantMessage::text("hello there")]);
        let (runner, mut chat) = setup(backend.clone());
        assert_eq!(chat.process_message("  hi  ").await.unwrap(), "hello there");
        assert!(runner.calls().is_empty());
        assert_eq!(chat.transcript().len(), 3);
        assert_eq!(
            chat.transcript()[1],
            ChatMessage::User {
                content: "hi".into()
            }
        );
    }

    #[tokio::test]
    async fn tool_round_trip() {
        let backend = FakeBackend::scripted(vec![
            tool_reply(vec![ToolCall::new(
                "call_1",
                "fleet_list",
                r#"{"resource":"clusters"}"#,
            )]),
            AssistantMessage::text("you have one cluster"),
        ]);
        let (runner, mut chat) = setup(backend.clone());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        chat = chat.with_progress(Box::new(move |e| sink.lock().push(e.clone())));

        let answer = chat.process_message("list my clusters").await.unwrap();
        assert_eq!(answer, "you have one cluster");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, vec!["list", "clusters"]);

        match &chat.transcript()[3] {
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => {
                assert_eq!(tool_call_id, "call_1");
                let payload: Value = serde_json::from_str(content).unwrap();
                assert_eq!(payload["isError"], false);
                assert_eq!(payload["content"][0]["text"], "{\"ok\":true}");
            }
            other => panic!("unexpected message: {other:?}"),
        }
        // system, user on the first round; plus assistant and tool on the second
        assert_eq!(*backend.seen.lock(), vec![2, 4]);
        let events = events.lock();
        assert!(matches!(&events[0], ChatEvent::ToolCall { index: 1, total: 1, .. }));
        assert!(matches!(&events[1], ChatEvent::ToolResult { is_error: false, .. }));
    }

    #[tokio::test]
    async fn bad_arguments_and_registry_errors_go_back_to_the_model() {
        let backend = FakeBackend::scripted(vec![
            tool_reply(vec![
                ToolCall::new("a", "fleet_list", "{not json"),
                ToolCall::new("b", "fleet_create", "{}"),
            ]),
            AssistantMessage::text("sorry"),
        ]);
        let (runner, mut chat) = setup(backend);
        assert_eq!(chat.process_message("do it").await.unwrap(), "sorry");
        assert!(runner.calls().is_empty());
        let tool_texts: Vec<&str> = chat
            .transcript()
            .iter()
            .filter_map(|m| match m {
                ChatMessage::Tool { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tool_texts.len(), 2);
        assert!(tool_texts[0].starts_with("Error: invalid arguments for fleet_list"));
        assert!(tool_texts[1].starts_with("Error: "));
        assert!(tool_texts[1].contains("resource"));
    }

    #[tokio::test]
    async fn iteration_limit_is_enforced() {
        let backend = FakeBackend::forever(tool_reply(vec![ToolCall::new(
            "loop",
            "fleet_whoami",
            "",
        )]));
        let (runner, mut chat) = setup(backend.clone());
        let err = chat.process_message("again and again").await.unwrap_err();
        assert!(matches!(err, ChatError::IterationLimit(3)));
        assert_eq!(backend.seen.lock().len(), 3);
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let (_, mut chat) = setup(FakeBackend::scripted(vec![]));
        assert!(matches!(
            chat.process_message(" \n\t").await,
            Err(ChatError::EmptyMessage)
        ));
        assert_eq!(chat.transcript().len(), 1);
    }

    #[tokio::test]
    async fn completion_errors_surface() {
        let (_, mut chat) = setup(FakeBackend::scripted(vec![]));
        assert!(matches!(
            chat.process_message("hi").await,
            Err(ChatError::Completion(CompletionError::Decode(_)))
        ));
    }

    #[test]
    fn system_message_reflects_taxonomy_and_dangerous_ops() {
        let (_, chat) = setup(FakeBackend::scripted(vec![]));
        let text = chat.system_text();
        assert!(text.contains("- fleet_create: cluster, role"));
        assert!(text.contains("- fleet_whoami"));
        assert!(text.contains("fleet_help"));
        assert!(text.contains("fleet_create with resource 'cluster'"));
    }

    #[test]
    fn custom_system_message_replaces_generated() {
        let runner = Arc::new(RecordingRunner::new(sample_commands()));
        let registry = Arc::new(ToolRegistry::new(runner, RegistryOptions::default()));
        let chat = ChatClient::new(
            registry,
            FakeBackend::scripted(vec![]),
            ChatSettings {
                system_message: Some("be brief".into()),
                ..Default::default()
            },
        );
        assert_eq!(chat.system_text(), "be brief");
    }

    #[test]
    fn function_schemas_wrap_tool_definitions() {
        let runner = Arc::new(RecordingRunner::new(sample_commands()));
        let registry = ToolRegistry::new(runner, RegistryOptions::default());
        let functions = function_schemas(&registry);
        assert_eq!(functions.len(), 5);
        let create = functions
            .iter()
            .find(|f| f["function"]["name"] == "cli_create")
            .unwrap();
        assert_eq!(create["type"], "function");
        assert_eq!(create["function"]["parameters"]["type"], "object");
        assert_eq!(
            create["function"]["parameters"]["properties"]["args"]["items"]["type"],
            "string"
        );
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        let long = "é".repeat(300);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }
}
