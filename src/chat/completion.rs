//! Chat-completion wire types and the OpenAI-compatible HTTP backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/* ---- Messages ---- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant(AssistantMessage),
    Tool { tool_call_id: String, content: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl AssistantMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    pub fn calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, as sent by the model.
    #[serde(default)]
    pub arguments: String,
}

/// One request to the completion endpoint.
#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "no_tools")]
    pub tools: &'a [Value],
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

/* ---- Errors ---- */

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error(
        "completion endpoint rate limit or quota exceeded: {message}. Wait and try again, or \
         check the plan and billing of the API key"
    )]
    RateLimited { message: String },

    #[error("completion request failed with HTTP {status}: {message}{}", request_hint(.status))]
    Request { status: u16, message: String },

    #[error("could not reach the completion endpoint: {0}. Check --api-url and network access")]
    Transport(String),

    #[error("unexpected completion response: {0}")]
    Decode(String),
}

fn request_hint(status: &u16) -> &'static str {
    match *status {
        401 | 403 => ". Check --api-key or OPENAI_API_KEY",
        404 => ". Check --model and --api-url",
        _ => "",
    }
}

/// Map a non-success status and its body onto an error kind.
pub fn classify_status(status: u16, body: &str) -> CompletionError {
    let message = error_message(body);
    let quota = body.contains("insufficient_quota") || body.contains("rate_limit_exceeded");
    if status == 429 || quota {
        CompletionError::RateLimited { message }
    } else {
        CompletionError::Request { status, message }
    }
}

/// `error.message` from an OpenAI-style error body, else the trimmed body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/* ---- Backend ---- */

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<AssistantMessage, CompletionError>;
}

/// Backend for any server speaking the OpenAI `/chat/completions` dialect.
pub struct OpenAiCompatibleClient {
    http: Client,
    endpoint: Url,
    api_key: String,
}

impl OpenAiCompatibleClient {
    pub fn new(api_url: Option<&str>, api_key: impl Into<String>) -> Result<Self, CompletionError> {
        let endpoint = completions_endpoint(api_url.unwrap_or(DEFAULT_API_URL))?;
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// `<base>/chat/completions`, keeping any path prefix of the base URL.
pub fn completions_endpoint(base: &str) -> Result<Url, CompletionError> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|u| u.join("chat/completions"))
        .map_err(|e| CompletionError::Transport(format!("invalid API URL '{base}': {e}")))
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleClient {
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<AssistantMessage, CompletionError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "requesting completion"
        );
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&body).map_err(|e| CompletionError::Decode(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| CompletionError::Decode("no choices in completion response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(429, "slow down"),
            CompletionError::RateLimited { .. }
        ));
        let quota = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota"}}"#;
        match classify_status(403, quota) {
            CompletionError::RateLimited { message } => {
                assert_eq!(message, "You exceeded your current quota")
            }
            other => panic!("unexpected: {other:?}"),
        }
        let err = classify_status(401, r#"{"error":{"message":"bad key"}}"#);
        assert!(matches!(err, CompletionError::Request { status: 401, .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn endpoint_keeps_base_path() {
        assert_eq!(
            completions_endpoint("https://api.example.com/v1").unwrap().as_str(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("http://localhost:8080/").unwrap().as_str(),
            "http://localhost:8080/chat/completions"
        );
        assert!(completions_endpoint("not a url").is_err());
    }

    #[test]
    fn messages_use_the_wire_shape() {
        let msgs = vec![
            ChatMessage::System { content: "sys".into() },
            ChatMessage::Assistant(AssistantMessage {
                content: None,
                tool_calls: Some(vec![ToolCall::new("call_1", "fleet_list", "{}")]),
            }),
            ChatMessage::Tool {
                tool_call_id: "call_1".into(),
                content: "[]".into(),
            },
        ];
        let v = serde_json::to_value(&msgs).unwrap();
        assert_eq!(v[0], json!({"role": "system", "content": "sys"}));
        assert_eq!(v[1]["role"], "assistant");
        assert_eq!(v[1]["tool_calls"][0]["type"], "function");
        assert_eq!(v[1]["tool_calls"][0]["function"]["name"], "fleet_list");
        assert_eq!(v[2], json!({"role": "tool", "tool_call_id": "call_1", "content": "[]"}));
    }

    #[test]
    fn response_choice_decodes() {
        let body = json!({
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "fleet_whoami", "arguments": "{}"}
                    }]
                }
            }]
        });
        let parsed: CompletionResponse = serde_json::from_value(body).unwrap();
        let message = &parsed.choices[0].message;
        assert_eq!(message.content, None);
        assert_eq!(message.calls()[0].function.name, "fleet_whoami");
    }
}
