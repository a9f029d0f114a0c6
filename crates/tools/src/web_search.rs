//! web_search: Tavily search API.
//!
//! Requires `TAVILY_API_KEY`. Without it the tool answers with a setup hint
//! instead of failing the turn.

use async_trait::async_trait;
use keel_core::error::ToolError;
use keel_core::tool::{Tool, ToolResult, names};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const TAVILY_URL: &str = "https://api.tavily.com/search";

pub struct WebSearchTool {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }

    /// Key taken from `TAVILY_API_KEY`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("TAVILY_API_KEY").ok())
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".into();
    }
    results
        .iter()
        .map(|r| format!("### {}\n{}\n{}", r.title, r.url, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        names::WEB_SEARCH
    }

    fn description(&self) -> &str {
        "Search the web for information. Useful for looking up documentation, error messages, or current information."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Max results (default: 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let max_results = arguments["max_results"].as_u64().unwrap_or(5).clamp(1, 20);

        let Some(api_key) = &self.api_key else {
            return Ok(ToolResult::failed(
                "Error: TAVILY_API_KEY is not configured. Get a free API key at https://tavily.com",
            ));
        };

        debug!(query = %query, max_results, "Searching the web");
        let response = self
            .client
            .post(TAVILY_URL)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "query": query,
                "max_results": max_results,
            }))
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => return Ok(ToolResult::failed(format!("Error searching: HTTP {}", r.status()))),
            Err(e) => return Ok(ToolResult::failed(format!("Error searching: {e}"))),
        };

        match response.json::<TavilyResponse>().await {
            Ok(body) => Ok(ToolResult::ok(format_results(&body.results))),
            Err(e) => Ok(ToolResult::failed(format!("Error searching: {e}"))),
        }
    }
}
