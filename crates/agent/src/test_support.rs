//! Shared test helpers: a scripted model client.

use async_trait::async_trait;
use keel_core::error::ProviderError;
use keel_core::message::{Message, ToolCall};
use keel_core::model::{
    FinishReason, ModelClient, ModelRequest, ModelStream, StreamEvent, TurnOutcome, Usage,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One scripted response to `stream`.
pub enum ScriptedTurn {
    /// Events delivered in order, then the stream closes.
    Events(Vec<StreamEvent>),
    /// `stream` itself fails.
    Fail(ProviderError),
    /// The stream stays open until cancelled.
    Hang,
}

/// A model client that replays scripted turns and records every request.
///
/// Panics if `stream` is called more times than turns were scripted.
/// `summarize` pops the next scripted summary and fails with
/// `ServiceUnavailable` once they run out, or never returns after
/// [`with_hanging_summaries`](Self::with_hanging_summaries).
pub struct ScriptedClient {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    summaries: Mutex<VecDeque<String>>,
    hang_summaries: bool,
    requests: Mutex<Vec<ModelRequest>>,
    summarized: Mutex<Vec<usize>>,
}

impl ScriptedClient {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            summaries: Mutex::new(VecDeque::new()),
            hang_summaries: false,
            requests: Mutex::new(Vec::new()),
            summarized: Mutex::new(Vec::new()),
        }
    }

    pub fn with_summaries(self, summaries: Vec<String>) -> Self {
        *self.summaries.lock().unwrap() = summaries.into();
        self
    }

    pub fn with_hanging_summaries(mut self) -> Self {
        self.hang_summaries = true;
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn stream_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn summarize_calls(&self) -> usize {
        self.summarized.lock().unwrap().len()
    }

    /// Number of messages passed to each `summarize` call.
    pub fn summarized_lengths(&self) -> Vec<usize> {
        self.summarized.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> Result<ModelStream, ProviderError> {
        let call = self.stream_calls();
        self.requests.lock().unwrap().push(request);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedClient: no turn scripted for call #{call}"));

        match turn {
            ScriptedTurn::Fail(e) => Err(e),
            ScriptedTurn::Events(events) => {
                let (tx, rx) = mpsc::channel(events.len().max(1));
                for event in events {
                    tx.try_send(Ok(event)).unwrap();
                }
                Ok(rx)
            }
            ScriptedTurn::Hang => {
                let (tx, rx) = mpsc::channel(1);
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    let _ = tx.send(Err(ProviderError::Cancelled)).await;
                });
                Ok(rx)
            }
        }
    }

    async fn summarize(
        &self,
        _model: &str,
        messages: &[Message],
        _instruction: &str,
    ) -> Result<String, ProviderError> {
        self.summarized.lock().unwrap().push(messages.len());
        if self.hang_summaries {
            std::future::pending::<()>().await;
        }
        self.summaries
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::ServiceUnavailable("no summary scripted".into()))
    }
}

const TURN_USAGE: Usage = Usage {
    input_tokens: 10,
    output_tokens: 5,
};

/// A turn that streams `text` and stops.
pub fn text_turn(text: &str) -> ScriptedTurn {
    ScriptedTurn::Events(vec![
        StreamEvent::TextDelta(text.to_string()),
        StreamEvent::Finish(TurnOutcome {
            messages: vec![Message::assistant(text)],
            usage: TURN_USAGE,
            finish_reason: FinishReason::Stop,
        }),
    ])
}

/// A turn that requests `calls` and leaves them all to the loop.
pub fn tool_turn(calls: Vec<ToolCall>) -> ScriptedTurn {
    tool_turn_with_results(calls, Vec::new())
}

/// A turn that requests `calls` and answers some of them itself, as a
/// client does for auto-executed tools.
pub fn tool_turn_with_results(calls: Vec<ToolCall>, results: Vec<(&str, &str)>) -> ScriptedTurn {
    let mut events: Vec<StreamEvent> = calls.iter().cloned().map(StreamEvent::ToolCall).collect();
    let mut messages = vec![Message::assistant_with_calls("", calls)];
    for (id, text) in results {
        events.push(StreamEvent::ToolResult {
            call_id: id.to_string(),
            text: text.to_string(),
        });
        messages.push(Message::tool_result(id, text));
    }
    events.push(StreamEvent::Finish(TurnOutcome {
        messages,
        usage: TURN_USAGE,
        finish_reason: FinishReason::ToolCalls,
    }));
    ScriptedTurn::Events(events)
}

pub fn call(id: &str, name: &str, input: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, input)
}
