//! Maps raw provider failures to a [`ClassifiedError`].
//!
//! Matching is driven by the keyword tables below so the rules stay in one
//! place and can be exercised without any HTTP machinery. The usage-limit
//! phrases are checked before the billing keywords: the provider's rate-limit
//! text ends with generic "check your plan and billing" help that would
//! otherwise read as a billing failure.

use std::fmt;

use serde_json::Value;

use crate::error::{ClassifiedError, ErrorCategory};

/// Phrases that always mean a usage limit, whatever else the message says.
const USAGE_LIMIT_PHRASES: &[&str] = &["exceeded your current quota", "quota exceeded"];

/// Provider error codes/types that denote a usage limit unless billing is explicit.
const USAGE_LIMIT_CODES: &[&str] = &["insufficient_quota", "rate_limit_exceeded"];

/// Explicit billing failures.
const BILLING_KEYWORDS: &[&str] = &[
    "billing quota",
    "credit",
    "payment method",
    "no active subscription",
    "subscription expired",
    "payment required",
];

/// Generic help text that mentions billing without being a billing failure.
const GENERIC_BILLING_HELP: &str = "check your plan and billing";

/// Text that only shows up when the request never got an HTTP answer.
const TRANSPORT_MARKERS: &[&str] = &[
    "fetch failed",
    "network error",
    "connection refused",
    "connection reset",
    "connection closed",
    "broken pipe",
    "dns error",
    "failed to lookup address",
    "timed out",
    "operation was aborted",
    "econnrefused",
    "enotfound",
    "etimedout",
    "epipe",
];

/// Kinds of failures where no HTTP response was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Connect,
    Timeout,
    Interrupted,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Connect => write!(f, "connection failed"),
            TransportKind::Timeout => write!(f, "request timed out"),
            TransportKind::Interrupted => write!(f, "connection interrupted"),
        }
    }
}

/// Fields the classifier reads out of a provider error body.
#[derive(Debug, Default, PartialEq)]
struct ErrorFields {
    message: String,
    code: String,
    kind: String,
}

impl ErrorFields {
    /// Accepts `{"error": {"message", "code", "type"}}` as well as a flat
    /// `{"message": ...}` or a bare string. Missing fields stay empty.
    fn extract(payload: &Value) -> Self {
        if let Value::String(text) = payload {
            return Self {
                message: text.clone(),
                ..Self::default()
            };
        }

        let nested = payload.get("error");
        let field = |name: &str| -> String {
            nested
                .and_then(|e| e.get(name))
                .or_else(|| payload.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        // Some providers send `"error": "text"` instead of an object.
        let message = match nested {
            Some(Value::String(text)) => text.clone(),
            _ => field("message"),
        };

        Self {
            message,
            code: field("code"),
            kind: field("type"),
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// True when the lowercased message names a billing failure explicitly.
pub fn has_billing_keyword(lower: &str) -> bool {
    contains_any(lower, BILLING_KEYWORDS)
        || (lower.contains("billing") && !lower.contains(GENERIC_BILLING_HELP))
}

/// True when the lowercased message carries one of the usage-limit phrases.
pub fn has_usage_limit_phrase(lower: &str) -> bool {
    contains_any(lower, USAGE_LIMIT_PHRASES)
}

/// Classifies a provider failure. Pure: the first matching rule wins.
pub fn classify(http_status: Option<u16>, payload: &Value) -> ClassifiedError {
    let fields = ErrorFields::extract(payload);
    let lower = fields.message.to_lowercase();
    let message = if fields.message.is_empty() {
        match http_status {
            Some(status) => format!("request failed with status {status}"),
            None => "request failed".to_string(),
        }
    } else {
        fields.message.clone()
    };

    let (category, retryable) = if has_usage_limit_phrase(&lower) {
        (ErrorCategory::UsageLimit, true)
    } else if !has_billing_keyword(&lower)
        && (http_status == Some(429)
            || USAGE_LIMIT_CODES.contains(&fields.code.as_str())
            || USAGE_LIMIT_CODES.contains(&fields.kind.as_str()))
    {
        (ErrorCategory::UsageLimit, true)
    } else if has_billing_keyword(&lower) {
        (ErrorCategory::BillingQuota, false)
    } else if http_status.is_none() && contains_any(&lower, TRANSPORT_MARKERS) {
        (ErrorCategory::NetworkFailure, true)
    } else {
        match http_status {
            Some(status) if (500..600).contains(&status) => (ErrorCategory::ServerFailure, true),
            Some(status) if (400..500).contains(&status) => (ErrorCategory::ClientFailure, false),
            _ => (ErrorCategory::Unknown, false),
        }
    };

    ClassifiedError::new(category, retryable, http_status, message, payload.clone())
}

/// Classifies a failure that never produced an HTTP response. Always a
/// retryable network failure.
pub fn classify_transport(kind: TransportKind, detail: impl Into<String>) -> ClassifiedError {
    let detail = detail.into();
    let message = format!("Network error calling the analysis provider ({kind}): {detail}");
    match kind {
        TransportKind::Timeout => ClassifiedError::timeout(message),
        _ => ClassifiedError::new(
            ErrorCategory::NetworkFailure,
            true,
            None,
            message,
            Value::String(detail),
        ),
    }
}

/// Extracts a retry hint in seconds from a `retry-after` header value or,
/// failing that, from text like "retry in 20 seconds" / "try again in 2m".
pub fn parse_retry_after(header: Option<&str>, message: &str) -> Option<u64> {
    if let Some(secs) = header.and_then(|h| h.trim().parse::<u64>().ok()) {
        return Some(secs);
    }

    let lower = message.to_lowercase();
    let anchor = lower.find("retry").or_else(|| lower.find("try again"))?;
    parse_first_duration(&lower[anchor..])
}

/// Finds the first `<number><unit>` pair and converts it to whole seconds.
fn parse_first_duration(text: &str) -> Option<u64> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            i += 1;
        }
        let number: f64 = match text[start..i].trim_end_matches('.').parse() {
            Ok(n) => n,
            Err(_) => continue,
        };

        let unit: String = text[i..]
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();

        let secs = if unit == "ms" || unit.starts_with("millisecond") {
            number / 1000.0
        } else if unit.starts_with('s') {
            number
        } else if unit.starts_with('m') {
            number * 60.0
        } else if unit.starts_with('h') {
            number * 3600.0
        } else {
            continue;
        };

        return Some(secs.ceil().max(1.0) as u64);
    }
    None
}
