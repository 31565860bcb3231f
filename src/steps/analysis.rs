//! Highlight extraction from a finished transcript.
//!
//! The prompt carries only a preview of the transcript and of the first few
//! segments so requests stay small. The model is asked for bare JSON but is
//! known to wrap it in markdown fences now and then, so fences are stripped
//! before parsing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{Instant, timeout};
use tracing::{error, info};

use super::transcription::TranscriptionResult;
use crate::config::{AnalysisSettings, VidscribeConfig};
use crate::error::{ClassifiedError, ErrorCategory};
use crate::openai::{ChatMessage, ChatRequest, MediaApi};
use crate::retry::RetryLayers;

const SYSTEM_PROMPT: &str =
    "You are a professional video content analyst. Always return valid JSON only, no markdown formatting.";

/// One suggested clip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HighlightSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub title: String,
    pub caption: String,
    pub description: String,
    pub hashtags: Vec<String>,
    pub hook: String,
}

/// Output of the language-analysis stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub summary: String,
    pub highlights: Vec<String>,
    pub segments: Vec<HighlightSegment>,
}

#[derive(Debug, Clone)]
pub struct AnalysisStep {
    pub model: String,
    pub timeout: Duration,
    pub limits: AnalysisSettings,
    pub retry: RetryLayers,
}

impl AnalysisStep {
    pub fn from_config(config: &VidscribeConfig) -> Self {
        Self {
            model: config.analysis_model.clone(),
            timeout: config.timeouts.analysis(),
            limits: config.analysis.clone(),
            retry: RetryLayers::from_settings(&config.retry),
        }
    }

    /// Builds the chat request with the transcript and segment previews cut
    /// down to the configured limits.
    pub fn build_request(&self, transcript: &TranscriptionResult) -> ChatRequest {
        let limits = &self.limits;

        let segments = transcript
            .segments
            .iter()
            .take(limits.max_segments)
            .enumerate()
            .map(|(idx, seg)| {
                format!(
                    "[{}] {}-{}: {}",
                    idx + 1,
                    format_timestamp(seg.start),
                    format_timestamp(seg.end),
                    truncate_with_marker(seg.text.trim(), limits.segment_preview_chars, "...")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let preview = truncate_with_marker(
            &transcript.text,
            limits.max_transcript_chars,
            "... [truncated]",
        );

        let prompt = format!(
            "Analyze video and generate highlights.\n\
             \n\
             TRANSCRIPT: {preview}\n\
             SEGMENTS: {segments}\n\
             DURATION: {duration}\n\
             \n\
             Return JSON:\n\
             {{\n  \"summary\": \"2-3 sentence summary\",\n  \"highlights\": [\"highlight 1\", \"highlight 2\"],\n  \
             \"segments\": [{{\n    \"startTime\": 0,\n    \"endTime\": 0,\n    \"title\": \"title\",\n    \
             \"caption\": \"caption\",\n    \"description\": \"description\",\n    \"hashtags\": [\"tag1\"],\n    \
             \"hook\": \"hook text\"\n  }}]\n}}",
            duration = format_timestamp(transcript.duration_seconds),
        );

        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
            temperature: Some(limits.temperature),
            max_tokens: Some(limits.max_tokens),
        }
    }

    pub async fn run<A: MediaApi>(
        &self,
        api: &A,
        transcript: &TranscriptionResult,
    ) -> Result<AnalysisResult, ClassifiedError> {
        let request = self.build_request(transcript);
        let started = Instant::now();
        info!(model = %self.model, transcript_chars = transcript.text.len(), "analyzing transcript");

        let deadline = self.timeout;
        let request = &request;
        let analysis = self
            .retry
            .execute("analysis", move || async move {
                let response = match timeout(deadline, api.complete(request)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(ClassifiedError::timeout(format!(
                            "Analysis request timed out after {}s.",
                            deadline.as_secs()
                        )));
                    }
                };
                parse_analysis(response.first_content().unwrap_or("{}"))
            })
            .await?;

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            highlights = analysis.highlights.len(),
            segments = analysis.segments.len(),
            "analysis completed"
        );
        Ok(analysis)
    }
}

/// Seconds → `m:ss`.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Cuts `text` to at most `max` characters, appending `marker` when it was cut.
pub fn truncate_with_marker(text: &str, max: usize, marker: &str) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}{marker}", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Removes markdown code fences (with or without a language tag).
pub fn strip_code_fences(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 3..];
        // Drop a language tag directly after the fence, e.g. ```json
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        rest = &rest[tag_len..];
        if let Some(stripped) = rest.strip_prefix('\n') {
            rest = stripped;
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Parses the model's answer into an [`AnalysisResult`]. Falls back to the
/// outermost `{...}` when the model added prose around the object.
pub fn parse_analysis(content: &str) -> Result<AnalysisResult, ClassifiedError> {
    let cleaned = strip_code_fences(content);
    if let Ok(result) = serde_json::from_str::<AnalysisResult>(&cleaned) {
        return Ok(result);
    }

    let embedded = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&cleaned[start..=end]),
        _ => None,
    };
    if let Some(result) = embedded.and_then(|json| serde_json::from_str::<AnalysisResult>(json).ok()) {
        return Ok(result);
    }

    error!(raw = %truncate_with_marker(content, 500, "..."), "unparseable analysis response");
    Err(ClassifiedError::new(
        ErrorCategory::Unknown,
        false,
        None,
        "Failed to parse analysis response. The model may have returned invalid JSON.",
        Value::String(truncate_with_marker(content, 200, "")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::types::{ChatChoice, ResponseMessage};
    use crate::openai::{ChatResponse, TranscriptSegment, TranscriptionRequest, TranscriptionResponse};
    use crate::retry::RetryPolicy;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn step() -> AnalysisStep {
        AnalysisStep {
            model: "o3-mini".into(),
            timeout: Duration::from_secs(60),
            limits: AnalysisSettings::default(),
            retry: RetryLayers::single(RetryPolicy::none()),
        }
    }

    fn transcript(text: &str, segments: usize) -> TranscriptionResult {
        TranscriptionResult {
            text: text.to_string(),
            segments: (0..segments)
                .map(|i| TranscriptSegment {
                    start: i as f64 * 5.0,
                    end: i as f64 * 5.0 + 5.0,
                    text: format!("segment number {i} {}", "x".repeat(100)),
                })
                .collect(),
            duration_seconds: segments as f64 * 5.0,
        }
    }

    struct CannedChat {
        content: Option<String>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl MediaApi for CannedChat {
        async fn transcribe(
            &self,
            _req: &TranscriptionRequest,
        ) -> Result<TranscriptionResponse, ClassifiedError> {
            unreachable!("analysis never transcribes")
        }

        async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, ClassifiedError> {
            self.seen.lock().unwrap().push(req.clone());
            Ok(ChatResponse {
                choices: vec![ChatChoice {
                    message: ResponseMessage {
                        content: self.content.clone(),
                    },
                }],
            })
        }
    }

    /// Answers only after two minutes.
    struct SlowChat {
        calls: AtomicU32,
    }

    impl MediaApi for SlowChat {
        async fn transcribe(
            &self,
            _req: &TranscriptionRequest,
        ) -> Result<TranscriptionResponse, ClassifiedError> {
            unreachable!("analysis never transcribes")
        }

        async fn complete(&self, _req: &ChatRequest) -> Result<ChatResponse, ClassifiedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(ChatResponse { choices: Vec::new() })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn analysis_deadline_becomes_network_failure() {
        let api = SlowChat {
            calls: AtomicU32::new(0),
        };
        let err = step().run(&api, &transcript("hello", 1)).await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::NetworkFailure);
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 504);
        assert!(err.message().contains("60s"));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn timestamps() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(65.9), "1:05");
        assert_eq!(format_timestamp(3600.0), "60:00");
        assert_eq!(format_timestamp(f64::NAN), "0:00");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_with_marker("héllo wörld", 5, "..."), "héllo...");
        assert_eq!(truncate_with_marker("short", 10, "..."), "short");
        assert_eq!(truncate_with_marker("exact", 5, "..."), "exact");
    }

    #[test]
    fn request_is_bounded() {
        let long = "word ".repeat(1_000);
        let req = step().build_request(&transcript(&long, 25));

        assert_eq!(req.model, "o3-mini");
        assert_eq!(req.max_tokens, Some(1_500));
        assert_eq!(req.temperature, Some(0.5));
        assert_eq!(req.messages[0].role, "system");

        let prompt = &req.messages[1].content;
        assert!(prompt.contains("... [truncated]"));
        assert!(prompt.contains("[10] 0:45-0:50"));
        assert!(!prompt.contains("[11]"));
        assert!(!prompt.contains(&"x".repeat(100)));
        assert!(prompt.contains("DURATION: 2:05"));
        assert!(prompt.len() < 3_000);
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("{\"x\": \"no fences\"}"), "{\"x\": \"no fences\"}");
    }

    #[test]
    fn parses_fenced_camel_case_response() {
        let content = r#"```json
{
  "summary": "A talk about Rust.",
  "highlights": ["ownership", "borrowing"],
  "segments": [{
    "startTime": 12.5, "endTime": 30,
    "title": "Ownership", "caption": "Own it", "description": "Who owns what",
    "hashtags": ["rust"], "hook": "Ever lost a pointer?"
  }]
}
```"#;
        let result = parse_analysis(content).unwrap();
        assert_eq!(result.highlights, vec!["ownership", "borrowing"]);
        assert_eq!(result.segments[0].start_time, 12.5);
        assert_eq!(result.segments[0].end_time, 30.0);
        assert_eq!(result.segments[0].hook, "Ever lost a pointer?");
    }

    #[test]
    fn parses_object_wrapped_in_prose() {
        let result = parse_analysis("Sure! Here you go: {\"summary\": \"ok\"} Hope that helps.").unwrap();
        assert_eq!(result.summary, "ok");
        assert!(result.segments.is_empty());
    }

    #[test]
    fn garbage_is_an_unknown_failure() {
        let err = parse_analysis("I cannot help with that.").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unknown);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn run_sends_request_and_parses_reply() {
        let api = CannedChat {
            content: Some("```json\n{\"summary\":\"s\",\"highlights\":[\"h\"]}\n```".into()),
            seen: Mutex::new(Vec::new()),
        };
        let result = step().run(&api, &transcript("hello", 2)).await.unwrap();
        assert_eq!(result.summary, "s");
        assert_eq!(api.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_content_yields_empty_analysis() {
        let api = CannedChat {
            content: None,
            seen: Mutex::new(Vec::new()),
        };
        let result = step().run(&api, &transcript("hello", 0)).await.unwrap();
        assert_eq!(result, AnalysisResult::default());
    }
}
