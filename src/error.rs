use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Application-level failures outside the media pipeline itself.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// The exhaustive failure taxonomy of the media pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Account-level failure (no payment method, lapsed subscription). Never retried.
    BillingQuota,
    /// Requests/tokens per minute or per day exceeded. Clears after a wait.
    UsageLimit,
    /// The request never produced an HTTP response (connect, DNS, timeout, broken pipe).
    NetworkFailure,
    /// 5xx from the remote service.
    ServerFailure,
    /// Rejected input or 4xx that waiting will not fix.
    ClientFailure,
    Unknown,
}

impl ErrorCategory {
    /// Snake-case label used in logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::BillingQuota => "billing_quota",
            ErrorCategory::UsageLimit => "usage_limit",
            ErrorCategory::NetworkFailure => "network_failure",
            ErrorCategory::ServerFailure => "server_failure",
            ErrorCategory::ClientFailure => "client_failure",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure together with its retry verdict.
///
/// Built once by the classifier (or by a step for validation and timeouts)
/// and then carried unchanged through the retry layers, the orchestrator and
/// the queue back to whoever submitted the job.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{category}: {message}")]
pub struct ClassifiedError {
    http_status: Option<u16>,
    category: ErrorCategory,
    retryable: bool,
    retry_after_secs: Option<u64>,
    timed_out: bool,
    message: String,
    raw_payload: Value,
}

impl ClassifiedError {
    pub fn new(
        category: ErrorCategory,
        retryable: bool,
        http_status: Option<u16>,
        message: impl Into<String>,
        raw_payload: Value,
    ) -> Self {
        Self {
            http_status,
            category,
            retryable,
            retry_after_secs: None,
            timed_out: false,
            message: message.into(),
            raw_payload,
        }
    }

    /// Input rejected before any network call. Never retried.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ClientFailure, false, None, message, Value::Null)
    }

    /// A step's hard deadline expired and the in-flight call was dropped.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::new(ErrorCategory::NetworkFailure, true, None, message, Value::Null)
        }
    }

    /// Returns a copy annotated with a retry hint. An existing hint is replaced
    /// only when `secs` is `Some`.
    pub fn with_retry_after(self, secs: Option<u64>) -> Self {
        Self {
            retry_after_secs: secs.or(self.retry_after_secs),
            ..self
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_secs
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn raw_payload(&self) -> &Value {
        &self.raw_payload
    }

    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }

    /// HTTP status a caller should surface for this failure.
    pub fn status_code(&self) -> u16 {
        if let Some(status) = self.http_status {
            return status;
        }
        match self.category {
            ErrorCategory::NetworkFailure if self.timed_out => 504,
            ErrorCategory::NetworkFailure => 503,
            ErrorCategory::UsageLimit => 429,
            ErrorCategory::BillingQuota => 402,
            ErrorCategory::ClientFailure => 400,
            ErrorCategory::ServerFailure | ErrorCategory::Unknown => 500,
        }
    }

    /// Human-facing explanation, chosen by category.
    pub fn user_message(&self) -> String {
        match self.category {
            ErrorCategory::BillingQuota => {
                "Billing issue with the analysis provider. Please contact support.".to_string()
            }
            ErrorCategory::UsageLimit => match self.retry_after_secs {
                Some(secs) => format!("The service is temporarily busy. Try again in {secs}s."),
                None => "The service is temporarily busy. Try again shortly.".to_string(),
            },
            ErrorCategory::NetworkFailure => {
                "Network issue reaching the analysis provider. Check your connectivity.".to_string()
            }
            ErrorCategory::ServerFailure => {
                "The analysis provider is having problems. Try again later.".to_string()
            }
            ErrorCategory::ClientFailure | ErrorCategory::Unknown => self.message.clone(),
        }
    }
}
