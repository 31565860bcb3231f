//! Tipos de dados para as requisições e respostas da API de transcrição e de chat.
//!
//! As respostas são desserializadas de forma tolerante: campos ausentes
//! assumem valores padrão em vez de falhar.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Campos do formulário multipart enviado para `/audio/transcriptions`.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    /// Nome original do arquivo.
    pub file_name: String,
    /// Tipo MIME declarado do arquivo.
    pub mime_type: String,
    /// Conteúdo binário, compartilhado entre tentativas.
    pub bytes: Bytes,
    /// Modelo de transcrição (ex.: "whisper-1").
    pub model: String,
    /// Dica de idioma da fala.
    pub language: String,
}

/// Um trecho da transcrição com início e fim em segundos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

/// Resposta no formato `verbose_json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    /// Duração total do áudio em segundos.
    #[serde(default)]
    pub duration: f64,
}

/// Corpo da requisição para `/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Uma mensagem da conversa ("system", "user" ou "assistant").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Resposta do endpoint de chat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ResponseMessage,
}

/// Mensagem gerada pelo modelo. `content` pode vir nulo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Texto da primeira escolha, se houver.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}
