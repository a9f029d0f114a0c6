//! OpenAI-compatible chat completions client.
//!
//! Every provider keel routes to exposes a `/chat/completions` endpoint
//! that speaks this protocol, so one client covers them all.
//!
//! Supports:
//! - Streaming completions over SSE with incremental tool-call assembly
//! - Auto-execution of catalog tools once the model has finished the turn
//! - Non-streaming completions for summaries

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use keel_core::error::ProviderError;
use keel_core::message::{Message, Role, ToolCall};
use keel_core::model::{
    FinishReason, ModelClient, ModelRequest, ModelStream, StreamEvent, TurnOutcome, Usage,
};
use keel_core::tool::{ToolCatalog, ToolDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::retry::{RetryPolicy, with_retries};

type EventSender = mpsc::Sender<Result<StreamEvent, ProviderError>>;

/// A model client for any OpenAI-compatible endpoint.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiCompatClient {
    /// Create a new client for `base_url` (the part before `/chat/completions`).
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("keel/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert the conversation to OpenAI format, system prompt first.
    fn to_api_messages(system_prompt: &str, messages: &[Message]) -> Vec<ApiMessage> {
        let mut api = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            api.push(ApiMessage {
                role: "system".into(),
                content: Some(system_prompt.to_string()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        let mut open_calls = std::collections::HashSet::new();
        api.extend(messages.iter().map(|m| {
            open_calls.extend(m.tool_calls.iter().map(|tc| tc.id.as_str()));
            // A result whose call was compressed away would be rejected;
            // send it as plain user text instead.
            if let (Role::Tool, Some(id)) = (m.role, m.tool_call_id.as_deref()) {
                if !open_calls.contains(id) {
                    return ApiMessage {
                        role: "user".into(),
                        content: Some(format!("Tool result ({id}):\n{}", m.content)),
                        tool_calls: None,
                        tool_call_id: None,
                    };
                }
            }
            let tool_calls = (!m.tool_calls.is_empty()).then(|| {
                m.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.input.to_string(),
                        },
                    })
                    .collect::<Vec<_>>()
            });
            // Assistant turns that only call tools carry no content.
            let content = if m.content.is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(m.content.clone())
            };
            ApiMessage {
                role: role_name(m.role).into(),
                content,
                tool_calls,
                tool_call_id: m.tool_call_id.clone(),
            }
        }));
        api
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    async fn post_chat(
        &self,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ProviderError> {
        with_retries(&self.retry, cancel, || self.send_once(body)).await
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
        Err(status_error(status, error_body, retry_after))
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> Result<ModelStream, ProviderError> {
        let mut body = serde_json::json!({
            "model": wire_model(&request.model),
            "messages": Self::to_api_messages(&request.system_prompt, &request.messages),
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        let tools = request.tools.definitions();
        if !tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&tools));
        }

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending streaming request"
        );

        let response = self.post_chat(&body, &cancel).await?;

        let (tx, rx) = mpsc::channel(64);
        let catalog = Arc::clone(&request.tools);
        let provider = self.name.clone();
        tokio::spawn(async move {
            pump_sse(Box::pin(response.bytes_stream()), tx, catalog, cancel, provider).await;
        });

        Ok(rx)
    }

    async fn summarize(
        &self,
        model: &str,
        messages: &[Message],
        instruction: &str,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": wire_model(model),
            "messages": [
                { "role": "system", "content": instruction },
                { "role": "user", "content": transcript(messages) },
            ],
            "stream": false,
        });

        debug!(provider = %self.name, model = %model, messages = messages.len(), "Sending summary request");

        let response = self.post_chat(&body, &CancellationToken::new()).await?;
        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })
    }
}

/// The model name sent on the wire: `provider:model` loses its prefix.
pub fn wire_model(model_id: &str) -> &str {
    model_id.split_once(':').map_or(model_id, |(_, model)| model)
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Render messages as plain text for a summary request.
///
/// A window of recent messages may start with tool results whose calls
/// were cut off, which chat endpoints reject as structured messages.
pub fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let mut entry = format!("{}: {}", role_name(m.role), m.content);
            for call in &m.tool_calls {
                entry.push_str(&format!("\n[tool call {}] {}", call.name, call.input));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Map a non-success HTTP status to a provider error.
fn status_error(status: u16, body: String, retry_after: Option<u64>) -> ProviderError {
    match status {
        401 => ProviderError::AuthenticationFailed(format!("401 Unauthorized: {body}")),
        403 => ProviderError::Forbidden(format!("403 Forbidden: {body}")),
        404 => ProviderError::ModelNotFound(body),
        408 => ProviderError::Timeout(body),
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(5),
        },
        503 => ProviderError::ServiceUnavailable(format!("503 Service Unavailable: {body}")),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// Read the SSE byte stream of one turn and forward events to `tx`.
///
/// Text deltas are sent as they arrive. Tool calls are sent once the
/// stream ends, followed by the results of any auto-executed tools and
/// the final [`StreamEvent::Finish`].
async fn pump_sse<S, B, E>(
    mut bytes: S,
    tx: EventSender,
    catalog: Arc<ToolCatalog>,
    cancel: CancellationToken,
    provider: String,
) where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut lines = SseLineBuffer::default();
    let mut turn = TurnAccumulator::default();

    'read: loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = tx.send(Err(ProviderError::Cancelled)).await;
                return;
            }
            chunk = bytes.next() => chunk,
        };

        let payload = match chunk {
            Some(Ok(b)) => b,
            Some(Err(e)) => {
                let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                return;
            }
            None => break,
        };

        for data in lines.push(payload.as_ref()) {
            if data == "[DONE]" {
                break 'read;
            }
            match serde_json::from_str::<StreamResponse>(&data) {
                Ok(parsed) => {
                    if let Some(text) = turn.apply(parsed) {
                        if tx.send(Ok(StreamEvent::TextDelta(text))).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                }
                Err(e) => {
                    trace!(
                        provider = %provider,
                        data = %data,
                        error = %e,
                        "Ignoring unparseable SSE chunk"
                    );
                }
            }
        }
    }

    finish_turn(turn, &tx, &catalog, &cancel).await;
}

async fn finish_turn(
    turn: TurnAccumulator,
    tx: &EventSender,
    catalog: &ToolCatalog,
    cancel: &CancellationToken,
) {
    let (text, calls, usage, finish_reason) = turn.finish();

    for call in &calls {
        if tx.send(Ok(StreamEvent::ToolCall(call.clone()))).await.is_err() {
            return;
        }
    }

    let mut messages = vec![Message::assistant_with_calls(text, calls.clone())];
    for call in &calls {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tx.send(Err(ProviderError::Cancelled)).await;
                return;
            }
            result = catalog.execute_auto(call) => result,
        };
        let Some(text) = result else {
            continue;
        };
        let event = StreamEvent::ToolResult {
            call_id: call.id.clone(),
            text: text.clone(),
        };
        if tx.send(Ok(event)).await.is_err() {
            return;
        }
        messages.push(Message::tool_result(&call.id, text));
    }

    let _ = tx
        .send(Ok(StreamEvent::Finish(TurnOutcome {
            messages,
            usage,
            finish_reason,
        })))
        .await;
}

/// Splits raw SSE bytes into `data:` payloads. Bytes are held until a
/// full line arrives, so a character split across chunks decodes whole.
#[derive(Debug, Default)]
struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim().to_string());
            }
        }
        payloads
    }
}

/// Everything learned from the chunks of one streamed turn.
#[derive(Debug, Default)]
struct TurnAccumulator {
    text: String,
    calls: BTreeMap<u32, ToolCallAccumulator>,
    usage: Usage,
    finish_reason: Option<String>,
}

impl TurnAccumulator {
    /// Fold one chunk in. Returns its text delta, if any.
    fn apply(&mut self, chunk: StreamResponse) -> Option<String> {
        if let Some(usage) = chunk.usage {
            self.usage = Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            };
        }

        let choice = chunk.choices.into_iter().next()?;
        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }

        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let acc = self.calls.entry(delta.index).or_default();
            if let Some(id) = delta.id {
                acc.id = id;
            }
            if let Some(func) = delta.function {
                if let Some(name) = func.name {
                    acc.name = name;
                }
                if let Some(args) = func.arguments {
                    acc.arguments.push_str(&args);
                }
            }
        }

        let text = choice.delta.content.filter(|c| !c.is_empty())?;
        self.text.push_str(&text);
        Some(text)
    }

    /// Text, tool calls in index order, usage and finish reason.
    ///
    /// Some providers report `stop` even when the turn requested tools;
    /// the calls win.
    fn finish(self) -> (String, Vec<ToolCall>, Usage, FinishReason) {
        let calls: Vec<ToolCall> = self
            .calls
            .into_values()
            .filter(|acc| !acc.name.is_empty())
            .map(ToolCallAccumulator::into_tool_call)
            .collect();

        let reason = match self.finish_reason.as_deref() {
            _ if !calls.is_empty() => FinishReason::ToolCalls,
            Some(raw) => FinishReason::from_provider(raw),
            None => FinishReason::Stop,
        };
        (self.text, calls, self.usage, reason)
    }
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_tool_call(self) -> ToolCall {
        let input = if self.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&self.arguments).unwrap_or_else(|e| {
                warn!(tool = %self.name, error = %e, "Tool call arguments are not valid JSON");
                serde_json::json!({})
            })
        };
        let id = if self.id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            self.id
        };
        ToolCall::new(id, self.name, input)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::error::ToolError;
    use keel_core::tool::{GatedTool, Tool, ToolKind, ToolResult};

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercases text"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;
            Ok(ToolResult::ok(text.to_uppercase()))
        }
    }

    fn catalog() -> Arc<ToolCatalog> {
        let mut catalog = ToolCatalog::new();
        catalog.register_auto(Arc::new(UpperTool));
        catalog.register_manual(
            ToolDefinition {
                name: "shell".into(),
                description: "Run a command".into(),
                parameters: serde_json::json!({"type": "object"}),
            },
            ToolKind::PermissionGated(GatedTool::Shell),
        );
        Arc::new(catalog)
    }

    fn sse(lines: &[&str]) -> Vec<Result<Vec<u8>, std::io::Error>> {
        lines
            .iter()
            .map(|l| Ok(format!("data: {l}\n\n").into_bytes()))
            .collect()
    }

    async fn run_pump(
        chunks: Vec<Result<Vec<u8>, std::io::Error>>,
        cancel: CancellationToken,
    ) -> Vec<Result<StreamEvent, ProviderError>> {
        let (tx, mut rx) = mpsc::channel(64);
        pump_sse(futures::stream::iter(chunks), tx, catalog(), cancel, "test".into()).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn system_prompt_comes_first() {
        let messages = vec![Message::user("Hello")];
        let api = OpenAiCompatClient::to_api_messages("You are helpful", &messages);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
    }

    #[test]
    fn tool_calls_and_results_map_to_wire_format() {
        let call = ToolCall::new("call_1", "shell", serde_json::json!({"command": "ls"}));
        let messages = vec![
            Message::assistant_with_calls("", vec![call]),
            Message::tool_result("call_1", "a.txt"),
        ];
        let api = OpenAiCompatClient::to_api_messages("", &messages);
        assert_eq!(api.len(), 2);
        assert!(api[0].content.is_none());
        let tc = api[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].function.name, "shell");
        assert_eq!(tc[0].function.arguments, r#"{"command":"ls"}"#);
        assert_eq!(api[1].role, "tool");
        assert_eq!(api[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn orphan_tool_result_becomes_user_text() {
        let messages = vec![
            Message::user("[Previous conversation summary]\nran ls"),
            Message::tool_result("call_gone", "a.txt"),
        ];
        let api = OpenAiCompatClient::to_api_messages("", &messages);
        assert_eq!(api[1].role, "user");
        assert!(api[1].tool_call_id.is_none());
        assert_eq!(api[1].content.as_deref(), Some("Tool result (call_gone):\na.txt"));
    }

    #[test]
    fn tool_definition_conversion() {
        let api = OpenAiCompatClient::to_api_tools(&catalog().definitions());
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].r#type, "function");
        assert_eq!(api[0].function.name, "shell");
    }

    #[test]
    fn wire_model_strips_provider_prefix() {
        assert_eq!(wire_model("anthropic:claude-sonnet-4-5"), "claude-sonnet-4-5");
        assert_eq!(wire_model("gpt-4.1"), "gpt-4.1");
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(
            status_error(401, "bad".into(), None),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(status_error(403, "no".into(), None), ProviderError::Forbidden(_)));
        assert!(matches!(
            status_error(429, String::new(), Some(12)),
            ProviderError::RateLimited { retry_after_secs: 12 }
        ));
        assert!(matches!(
            status_error(503, String::new(), None),
            ProviderError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            status_error(500, "boom".into(), None),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }

    #[test]
    fn sse_buffer_handles_split_lines() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        let payloads = buffer.push(b":1}\r\n\r\n: keep-alive\ndata:[DONE]\n");
        assert_eq!(payloads, vec![r#"{"a":1}"#.to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn sse_buffer_keeps_characters_split_across_chunks() {
        let line = "data: {\"x\":\"héllo\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(&line[..split]).is_empty());
        let payloads = buffer.push(&line[split..]);
        assert_eq!(payloads, vec![r#"{"x":"héllo"}"#.to_string()]);
    }

    #[test]
    fn accumulator_assembles_tool_call_fragments() {
        let mut turn = TurnAccumulator::default();
        for data in [
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"upper","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"text\""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":": \"hi\"}"}}]},"finish_reason":"tool_calls"}]}"#,
        ] {
            assert!(turn.apply(serde_json::from_str(data).unwrap()).is_none());
        }
        let (text, calls, _, reason) = turn.finish();
        assert!(text.is_empty());
        assert_eq!(reason, FinishReason::ToolCalls);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].str_arg("text"), Some("hi"));
    }

    #[test]
    fn calls_override_a_stop_finish_reason() {
        let mut turn = TurnAccumulator::default();
        turn.apply(
            serde_json::from_str(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c","function":{"name":"shell","arguments":"{}"}}]},"finish_reason":"stop"}]}"#,
            )
            .unwrap(),
        );
        assert_eq!(turn.finish().3, FinishReason::ToolCalls);
    }

    #[test]
    fn invalid_arguments_become_empty_object() {
        let acc = ToolCallAccumulator {
            id: String::new(),
            name: "shell".into(),
            arguments: "{not json".into(),
        };
        let call = acc.into_tool_call();
        assert_eq!(call.input, serde_json::json!({}));
        assert!(call.id.starts_with("call_"));
    }

    #[tokio::test]
    async fn text_turn_streams_deltas_then_finishes() {
        let events = run_pump(
            sse(&[
                r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
                r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
                r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":2,"total_tokens":12}}"#,
                "[DONE]",
            ]),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], Ok(StreamEvent::TextDelta(t)) if t.as_str() == "Hel"));
        assert!(matches!(&events[1], Ok(StreamEvent::TextDelta(t)) if t.as_str() == "lo"));
        let Ok(StreamEvent::Finish(outcome)) = &events[2] else {
            panic!("expected finish, got {:?}", events[2]);
        };
        assert_eq!(outcome.finish_reason, FinishReason::Stop);
        assert_eq!(outcome.usage, Usage { input_tokens: 10, output_tokens: 2 });
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].content, "Hello");
    }

    #[tokio::test]
    async fn auto_tools_run_and_gated_tools_do_not() {
        let events = run_pump(
            sse(&[
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"upper","arguments":"{\"text\":\"abc\"}"}},{"index":1,"id":"c2","function":{"name":"shell","arguments":"{\"command\":\"ls\"}"}}]},"finish_reason":"tool_calls"}]}"#,
                "[DONE]",
            ]),
            CancellationToken::new(),
        )
        .await;

        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                Ok(StreamEvent::TextDelta(_)) => "text",
                Ok(StreamEvent::ToolCall(_)) => "call",
                Ok(StreamEvent::ToolResult { .. }) => "result",
                Ok(StreamEvent::Finish(_)) => "finish",
                Err(_) => "error",
            })
            .collect();
        assert_eq!(kinds, vec!["call", "call", "result", "finish"]);

        let Ok(StreamEvent::Finish(outcome)) = events.last().unwrap() else {
            panic!("expected finish");
        };
        assert_eq!(outcome.finish_reason, FinishReason::ToolCalls);
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[1].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(outcome.messages[1].content, "ABC");
        assert_eq!(outcome.tool_calls().len(), 2);
    }

    #[tokio::test]
    async fn stream_without_done_still_finishes() {
        let events = run_pump(
            sse(&[r#"{"choices":[{"delta":{"content":"partial"}}]}"#]),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(events.last(), Some(Ok(StreamEvent::Finish(_)))));
    }

    #[tokio::test]
    async fn transport_error_interrupts_stream() {
        let chunks = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Err(std::io::Error::other("connection reset")),
        ];
        let events = run_pump(chunks, CancellationToken::new()).await;
        assert!(matches!(events.last(), Some(Err(ProviderError::StreamInterrupted(_)))));
    }

    #[tokio::test]
    async fn cancellation_ends_stream_with_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let events = run_pump(sse(&["[DONE]"]), cancel).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(ProviderError::Cancelled)));
    }

    #[test]
    fn transcript_renders_roles_and_calls() {
        let call = ToolCall::new("c", "read_file", serde_json::json!({"file_path": "a"}));
        let text = transcript(&[
            Message::user("fix it"),
            Message::assistant_with_calls("looking", vec![call]),
            Message::tool_result("c", "contents"),
        ]);
        assert!(text.starts_with("user: fix it\n\nassistant: looking\n[tool call read_file]"));
        assert!(text.ends_with("tool: contents"));
    }
}
