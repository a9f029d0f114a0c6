//! Session summaries for "continue where we left off".
//!
//! `latest.json` is overwritten on every save; each save also creates an
//! archive copy `{session-id}_{ended-at}.json` that is never rewritten.

use chrono::{DateTime, Utc};
use keel_core::error::MemoryError;
use keel_core::{Message, ModelClient, SessionStatus, SessionSummary};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Messages from the end of the conversation sent for summarizing.
pub const SUMMARY_WINDOW: usize = 20;

const LATEST_FILE: &str = "latest.json";

const SUMMARY_INSTRUCTION: &str = "Summarize this conversation as a structured JSON object with these fields:
- title: short descriptive title (string)
- summary: 2-3 sentence overview (string)
- keyResults: what was accomplished (string[])
- pendingWork: what remains to be done (string[])
- decisions: important decisions made (string[])
- status: \"completed\" | \"in_progress\" | \"abandoned\"

Return ONLY valid JSON, no markdown fencing.";

/// Reads and writes summaries in one sessions directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// The most recently saved summary, if any is readable.
    pub fn load_latest(&self) -> Option<SessionSummary> {
        let raw = std::fs::read_to_string(self.latest_path()).ok()?;
        match serde_json::from_str(&raw) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable latest session");
                None
            }
        }
    }

    /// Overwrite `latest.json` and create the archive copy.
    pub fn save(&self, summary: &SessionSummary) -> Result<(), MemoryError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| MemoryError::Storage(format!("Failed to create sessions directory: {e}")))?;

        let json = serde_json::to_string_pretty(summary)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize session: {e}")))?;

        std::fs::write(self.latest_path(), &json)
            .map_err(|e| MemoryError::Storage(format!("Failed to write latest session: {e}")))?;

        let archive = self.dir.join(format!(
            "{}_{}.json",
            summary.id,
            summary.ended_at.format("%Y%m%dT%H%M%S%3f")
        ));
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&archive)
        {
            Ok(mut file) => file
                .write_all(json.as_bytes())
                .map_err(|e| MemoryError::Storage(format!("Failed to write session archive: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(path = %archive.display(), "Session archive already exists");
            }
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to create session archive: {e}"
                )));
            }
        }

        debug!(session = %summary.id, "Session saved");
        Ok(())
    }

    /// Archived summaries, newest first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut summaries: Vec<SessionSummary> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == "json")
                    && p.file_name().is_some_and(|n| n != LATEST_FILE)
            })
            .filter_map(|p| {
                let raw = std::fs::read_to_string(&p).ok()?;
                serde_json::from_str(&raw).ok()
            })
            .collect();
        summaries.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
        summaries
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SummaryDraft {
    title: Option<String>,
    summary: Option<String>,
    key_results: Vec<String>,
    pending_work: Vec<String>,
    decisions: Vec<String>,
    status: Option<String>,
}

fn parse_status(raw: Option<&str>) -> SessionStatus {
    match raw {
        Some("in_progress") => SessionStatus::InProgress,
        Some("abandoned") => SessionStatus::Abandoned,
        _ => SessionStatus::Completed,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Ask the model for a structured summary of the conversation.
///
/// Never fails: unparseable output and model errors both produce a
/// degraded summary titled "Session".
pub async fn generate_summary(
    client: &dyn ModelClient,
    model: &str,
    messages: &[Message],
    session_id: &str,
    started_at: DateTime<Utc>,
    files_modified: &BTreeSet<PathBuf>,
) -> SessionSummary {
    let recent = &messages[messages.len().saturating_sub(SUMMARY_WINDOW)..];
    let files: Vec<String> = files_modified
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    let mut summary = SessionSummary {
        id: session_id.to_string(),
        title: "Session".into(),
        started_at,
        ended_at: Utc::now(),
        status: SessionStatus::Completed,
        summary: String::new(),
        key_results: Vec::new(),
        pending_work: Vec::new(),
        files_modified: files,
        decisions: Vec::new(),
    };

    let text = match client.summarize(model, recent, SUMMARY_INSTRUCTION).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Session summary request failed");
            summary.status = SessionStatus::InProgress;
            return summary;
        }
    };

    match serde_json::from_str::<SummaryDraft>(strip_code_fence(&text)) {
        Ok(draft) => {
            summary.title = draft.title.unwrap_or_else(|| "Untitled session".into());
            summary.summary = draft.summary.unwrap_or_default();
            summary.key_results = draft.key_results;
            summary.pending_work = draft.pending_work;
            summary.decisions = draft.decisions;
            summary.status = parse_status(draft.status.as_deref());
        }
        Err(e) => {
            debug!(error = %e, "Session summary was not JSON, keeping raw text");
            summary.summary = text.chars().take(200).collect();
        }
    }
    summary
}

/// The `### Previous Session` block for the knowledge context.
pub fn format_session_for_prompt(session: &SessionSummary) -> String {
    let mut lines = vec![
        "### Previous Session".to_string(),
        format!("Title: {}", session.title),
        format!("Status: {}", session.status.as_str()),
        format!("Summary: {}", session.summary),
    ];
    for (label, items) in [
        ("Key results:", &session.key_results),
        ("Pending work:", &session.pending_work),
        ("Decisions:", &session.decisions),
    ] {
        if !items.is_empty() {
            lines.push(label.to_string());
            lines.extend(items.iter().map(|item| format!("- {item}")));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use keel_core::error::ProviderError;
    use keel_core::{ModelRequest, ModelStream};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct CannedSummarizer {
        reply: Result<String, ()>,
        seen: Mutex<Vec<usize>>,
    }

    impl CannedSummarizer {
        fn new(reply: Result<&str, ()>) -> Self {
            Self {
                reply: reply.map(String::from),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelClient for CannedSummarizer {
        fn name(&self) -> &str {
            "canned"
        }

        async fn stream(
            &self,
            _request: ModelRequest,
            _cancel: CancellationToken,
        ) -> Result<ModelStream, ProviderError> {
            Err(ProviderError::NotConfigured("streaming".into()))
        }

        async fn summarize(
            &self,
            _model: &str,
            messages: &[Message],
            _instruction: &str,
        ) -> Result<String, ProviderError> {
            self.seen.lock().unwrap().push(messages.len());
            self.reply
                .clone()
                .map_err(|_| ProviderError::Network("connection reset".into()))
        }
    }

    fn sample(id: &str) -> SessionSummary {
        let now = Utc::now();
        SessionSummary {
            id: id.into(),
            title: "Refactor loader".into(),
            started_at: now,
            ended_at: now,
            status: SessionStatus::InProgress,
            summary: "Moved rules into their own module.".into(),
            key_results: vec!["rules.rs".into()],
            pending_work: vec!["tests".into()],
            files_modified: vec!["/p/src/rules.rs".into()],
            decisions: vec!["use glob".into()],
        }
    }

    #[test]
    fn save_then_load_latest_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions"));
        assert!(store.load_latest().is_none());

        let summary = sample("s1");
        store.save(&summary).unwrap();
        assert_eq!(store.load_latest().unwrap(), summary);
    }

    #[test]
    fn archives_are_kept_and_latest_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let first = sample("s1");
        let mut second = sample("s2");
        second.ended_at = first.ended_at + chrono::Duration::seconds(5);

        store.save(&first).unwrap();
        store.save(&second).unwrap();
        // saving the same record again leaves its archive untouched
        store.save(&second).unwrap();

        assert_eq!(store.load_latest().unwrap().id, "s2");
        let ids: Vec<_> = store.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
    }

    #[tokio::test]
    async fn generate_parses_json_reply() {
        let client = CannedSummarizer::new(Ok(
            "```json\n{\"title\":\"Fix tests\",\"summary\":\"Fixed them.\",\"keyResults\":[\"green\"],\"status\":\"in_progress\"}\n```",
        ));
        let messages: Vec<Message> = (0..30).map(|i| Message::user(format!("m{i}"))).collect();
        let files = BTreeSet::from([PathBuf::from("/p/a.rs")]);

        let summary = generate_summary(&client, "m", &messages, "s1", Utc::now(), &files).await;
        assert_eq!(summary.title, "Fix tests");
        assert_eq!(summary.key_results, vec!["green"]);
        assert!(summary.pending_work.is_empty());
        assert_eq!(summary.status, SessionStatus::InProgress);
        assert_eq!(summary.files_modified, vec!["/p/a.rs"]);
        assert_eq!(*client.seen.lock().unwrap(), vec![SUMMARY_WINDOW]);
    }

    #[tokio::test]
    async fn generate_degrades_on_bad_output() {
        let long = "x".repeat(500);
        let client = CannedSummarizer::new(Ok(&long));
        let summary =
            generate_summary(&client, "m", &[], "s1", Utc::now(), &BTreeSet::new()).await;
        assert_eq!(summary.title, "Session");
        assert_eq!(summary.summary.len(), 200);
        assert_eq!(summary.status, SessionStatus::Completed);

        let client = CannedSummarizer::new(Err(()));
        let summary =
            generate_summary(&client, "m", &[], "s1", Utc::now(), &BTreeSet::new()).await;
        assert_eq!(summary.title, "Session");
        assert_eq!(summary.status, SessionStatus::InProgress);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let draft: SummaryDraft = serde_json::from_str("{}").unwrap();
        assert!(draft.title.is_none());
        assert_eq!(parse_status(Some("weird")), SessionStatus::Completed);
    }

    #[test]
    fn prompt_block_lists_non_empty_sections() {
        let mut summary = sample("s1");
        summary.decisions.clear();
        let block = format_session_for_prompt(&summary);
        assert_eq!(
            block,
            "### Previous Session\nTitle: Refactor loader\nStatus: in_progress\nSummary: Moved rules into their own module.\nKey results:\n- rules.rs\nPending work:\n- tests"
        );
    }
}
