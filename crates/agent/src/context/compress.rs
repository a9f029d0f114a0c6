//! History compression: older messages collapse into one model-written
//! summary, the most recent ones are kept verbatim.

use keel_core::error::ProviderError;
use keel_core::message::Message;
use keel_core::model::ModelClient;
use tracing::info;

/// Messages always kept verbatim.
pub const KEEP_RECENT: usize = 6;

pub const COMPRESSION_INSTRUCTION: &str = "Summarize the following conversation concisely, \
     preserving key decisions, file changes, and context needed to continue.";

/// Prefix of the synthetic message replacing compressed history.
pub const SUMMARY_PREFIX: &str = "[Previous conversation summary]";

/// Replace everything but the last [`KEEP_RECENT`] messages with a summary.
///
/// A no-op (returns a copy) when there is nothing older to compress.
pub async fn compress_messages(
    client: &dyn ModelClient,
    model: &str,
    messages: &[Message],
) -> Result<Vec<Message>, ProviderError> {
    if messages.len() <= KEEP_RECENT {
        return Ok(messages.to_vec());
    }

    let split = messages.len() - KEEP_RECENT;
    let (old, recent) = messages.split_at(split);
    let summary = client.summarize(model, old, COMPRESSION_INSTRUCTION).await?;
    info!(compressed = old.len(), kept = recent.len(), "Compressed conversation history");

    let mut compressed = Vec::with_capacity(KEEP_RECENT + 1);
    compressed.push(Message::user(format!("{SUMMARY_PREFIX}\n{summary}")));
    compressed.extend_from_slice(recent);
    Ok(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedClient;

    fn conversation(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(format!("message {i}"))).collect()
    }

    #[tokio::test]
    async fn short_conversations_are_untouched() {
        let client = ScriptedClient::new(vec![]);
        let messages = conversation(KEEP_RECENT);
        let out = compress_messages(&client, "test:model", &messages).await.unwrap();
        assert_eq!(out.len(), KEEP_RECENT);
        assert_eq!(out[0].content, "message 0");
        assert_eq!(client.summarize_calls(), 0);
    }

    #[tokio::test]
    async fn keeps_last_six_and_prepends_one_summary() {
        let client = ScriptedClient::new(vec![]).with_summaries(vec!["they talked".into()]);
        let messages = conversation(10);
        let out = compress_messages(&client, "test:model", &messages).await.unwrap();

        assert_eq!(out.len(), KEEP_RECENT + 1);
        assert_eq!(out[0].content, "[Previous conversation summary]\nthey talked");
        for (kept, original) in out[1..].iter().zip(&messages[4..]) {
            assert_eq!(kept.id, original.id);
        }
        assert_eq!(client.summarized_lengths(), vec![4]);
    }

    #[tokio::test]
    async fn failure_is_returned() {
        let client = ScriptedClient::new(vec![]);
        let err = compress_messages(&client, "test:model", &conversation(8))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ServiceUnavailable(_)));
    }
}
