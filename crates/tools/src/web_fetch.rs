//! web_fetch: GET a page and return its readable text.

use async_trait::async_trait;
use keel_core::error::ToolError;
use keel_core::tool::{MAX_TOOL_RESULT_CHARS, Tool, ToolResult, names};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("Mozilla/5.0 (compatible; keel/", env!("CARGO_PKG_VERSION"), ")");

static NOISE_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|nav|footer|header|aside|noscript)\b[^>]*>.*?</(script|style|nav|footer|header|aside|noscript)>")
        .expect("noise pattern is valid")
});

static BLOCK_BREAKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(p|div|br|li|tr|h[1-6]|pre|section|article)\b[^>]*>")
        .expect("block pattern is valid")
});

static TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").expect("blank pattern is valid"));

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip markup down to readable text.
pub fn html_to_text(html: &str) -> String {
    let without_noise = NOISE_BLOCKS.replace_all(html, "");
    let with_breaks = BLOCK_BREAKS.replace_all(&without_noise, "\n");
    let text = TAGS.replace_all(&with_breaks, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    BLANK_RUNS.replace_all(text.trim(), "\n\n").into_owned()
}

fn cap(text: String) -> String {
    if text.chars().count() <= MAX_TOOL_RESULT_CHARS {
        return text;
    }
    let head: String = text.chars().take(MAX_TOOL_RESULT_CHARS).collect();
    format!("{head}\n\n... [content truncated]")
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        names::WEB_FETCH
    }

    fn description(&self) -> &str {
        "Fetch a web page and extract its readable text content. No API key needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                },
                "prompt": {
                    "type": "string",
                    "description": "What information to extract from the page"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        debug!(url = %url, "Fetching URL");
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::failed(format!("Error fetching URL: {e}"))),
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(ToolResult::failed(format!("Error: HTTP {status}")));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Ok(ToolResult::failed(format!("Error fetching URL: {e}"))),
        };

        let text = if is_json { body } else { html_to_text(&body) };
        if text.is_empty() {
            return Ok(ToolResult::failed("Error: Could not extract content from page."));
        }

        let text = cap(text);
        let output = match arguments["prompt"].as_str() {
            Some(prompt) => {
                format!("# Content from {url}\n\n{text}\n\n---\nExtract instruction: {prompt}")
            }
            None => text,
        };
        Ok(ToolResult::ok(output))
    }
}
