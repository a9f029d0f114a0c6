//! Classification of model errors into user-facing recovery messages.
//!
//! Retries already happened inside the model client; the loop only needs
//! to know what to tell the user and whether the failure was transient.

use keel_core::error::ProviderError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static STATUS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{3})\b").expect("valid status code pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Forbidden,
    ServiceUnavailable,
    RateLimited,
    Network,
    Cancelled,
    Unclassified,
}

/// A model error with the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl ClassifiedError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: matches!(kind, ErrorKind::RateLimited | ErrorKind::Network),
        }
    }
}

/// Classify by structured variant first, then by HTTP status, then by text.
pub fn classify_model_error(error: &ProviderError) -> ClassifiedError {
    let kind = match error {
        ProviderError::AuthenticationFailed(_) => Some(ErrorKind::Authentication),
        ProviderError::Forbidden(_) => Some(ErrorKind::Forbidden),
        ProviderError::ServiceUnavailable(_) => Some(ErrorKind::ServiceUnavailable),
        ProviderError::RateLimited { .. } => Some(ErrorKind::RateLimited),
        ProviderError::Network(_) | ProviderError::Timeout(_) | ProviderError::StreamInterrupted(_) => {
            Some(ErrorKind::Network)
        }
        ProviderError::Cancelled => Some(ErrorKind::Cancelled),
        ProviderError::ApiError { status_code, .. } => kind_for_status(*status_code),
        ProviderError::ModelNotFound(_) | ProviderError::NotConfigured(_) => None,
    };

    let text = error.to_string();
    let kind = kind
        .or_else(|| status_in_text(&text).and_then(kind_for_status))
        .or_else(|| kind_for_text(&text))
        .unwrap_or(ErrorKind::Unclassified);

    ClassifiedError::new(kind, message_for(kind, &text))
}

fn status_in_text(text: &str) -> Option<u16> {
    STATUS_CODE
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

fn kind_for_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 => Some(ErrorKind::Authentication),
        403 => Some(ErrorKind::Forbidden),
        503 => Some(ErrorKind::ServiceUnavailable),
        429 => Some(ErrorKind::RateLimited),
        _ => None,
    }
}

fn kind_for_text(text: &str) -> Option<ErrorKind> {
    let lower = text.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("unauthorized") || has("invalid api key") {
        Some(ErrorKind::Authentication)
    } else if has("forbidden") {
        Some(ErrorKind::Forbidden)
    } else if has("service unavailable") || has("overloaded") {
        Some(ErrorKind::ServiceUnavailable)
    } else if has("rate limit") {
        Some(ErrorKind::RateLimited)
    } else if has("timeout") || has("timed out") || has("etimedout") || has("econnreset") {
        Some(ErrorKind::Network)
    } else {
        None
    }
}

fn message_for(kind: ErrorKind, text: &str) -> String {
    match kind {
        ErrorKind::Authentication => "API authentication failed (401). Check your API key in \
                                      ~/.keel/config.toml or the provider's environment variable."
            .into(),
        ErrorKind::Forbidden => {
            "API access forbidden (403). Your API key may not have permission for this model.".into()
        }
        ErrorKind::ServiceUnavailable => {
            "Model service unavailable (503). Try switching to a different model with --model.".into()
        }
        ErrorKind::RateLimited => format!("Rate limited (429) and retries are exhausted: {text}"),
        ErrorKind::Network => format!("Network error: {text}"),
        ErrorKind::Cancelled => "Request cancelled.".into(),
        ErrorKind::Unclassified => text.to_string(),
    }
}
