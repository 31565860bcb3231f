use std::future::Future;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Body, Client, RequestBuilder, multipart};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::types::{ChatRequest, ChatResponse, TranscriptionRequest, TranscriptionResponse};
use crate::classifier::{TransportKind, classify, classify_transport, parse_retry_after};
use crate::error::{AppError, ClassifiedError, ErrorCategory};

/// Longest slice of an unparseable body kept as an error message.
const BODY_PREVIEW_CHARS: usize = 200;

/// The two external calls the pipeline depends on.
pub trait MediaApi: Send + Sync {
    fn transcribe(
        &self,
        req: &TranscriptionRequest,
    ) -> impl Future<Output = Result<TranscriptionResponse, ClassifiedError>> + Send;

    fn complete(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, ClassifiedError>> + Send;
}

pub struct OpenAiClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl OpenAiClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// No overall request timeout is set here; each pipeline step applies its
    /// own deadline.
    pub fn new(api_key: String, base_url: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Sends the request and returns the body of a 2xx response. Anything
    /// else comes back classified.
    async fn send(&self, request: RequestBuilder) -> Result<String, ClassifiedError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(transport_error)?;

        if status.is_success() {
            return Ok(body);
        }

        let payload = error_payload(&body);
        let err = classify(Some(status.as_u16()), &payload);
        let hint = parse_retry_after(retry_after.as_deref(), err.message());
        warn!(
            status = status.as_u16(),
            category = %err.category(),
            "provider returned an error: {}",
            err.message()
        );
        Err(err.with_retry_after(hint))
    }
}

impl MediaApi for OpenAiClient {
    async fn transcribe(
        &self,
        req: &TranscriptionRequest,
    ) -> Result<TranscriptionResponse, ClassifiedError> {
        // Each attempt shares the upload buffer.
        let file = multipart::Part::stream_with_length(Body::from(req.bytes.clone()), req.bytes.len() as u64)
            .file_name(req.file_name.clone())
            .mime_str(&req.mime_type)
            .map_err(|e| ClassifiedError::validation(format!("invalid MIME type: {e}")))?;

        let form = multipart::Form::new()
            .part("file", file)
            .text("model", req.model.clone())
            .text("language", req.language.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .text("temperature", "0.0");

        debug!(model = %req.model, bytes = req.bytes.len(), "sending audio for transcription");
        let body = self
            .send(self.client.post(self.url("audio/transcriptions")).multipart(form))
            .await?;
        parse_body(&body, "transcription")
    }

    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, ClassifiedError> {
        debug!(model = %req.model, "sending chat completion");
        let body = self
            .send(self.client.post(self.url("chat/completions")).json(req))
            .await?;
        parse_body(&body, "chat completion")
    }
}

fn transport_error(err: reqwest::Error) -> ClassifiedError {
    // The request could not even be built: bad base URL or key bytes.
    if err.is_builder() {
        return ClassifiedError::new(
            ErrorCategory::ClientFailure,
            false,
            None,
            format!("Invalid request settings; check OPENAI_BASE_URL and OPENAI_API_KEY: {err}"),
            Value::String(err.to_string()),
        );
    }

    let kind = if err.is_timeout() {
        TransportKind::Timeout
    } else if err.is_connect() {
        TransportKind::Connect
    } else {
        TransportKind::Interrupted
    };
    classify_transport(kind, err.to_string())
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

/// JSON error bodies pass through; anything else (HTML gateways pages,
/// plain text) becomes `{"error": {"message": <preview>}}`.
fn error_payload(body: &str) -> Value {
    match serde_json::from_str::<Value>(body) {
        Ok(value) if value.is_object() => value,
        _ => json!({ "error": { "message": preview(body) } }),
    }
}

fn parse_body<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, ClassifiedError> {
    serde_json::from_str(body).map_err(|e| {
        ClassifiedError::new(
            ErrorCategory::Unknown,
            false,
            None,
            format!("Failed to parse {what} response ({e}): {}", preview(body)),
            Value::String(preview(body)),
        )
    })
}
