pub mod client;
pub mod types;

pub use client::{MediaApi, OpenAiClient};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, TranscriptSegment, TranscriptionRequest,
    TranscriptionResponse,
};
