//! Configuração do vidscribe carregada a partir de `vidscribe.toml`.
//!
//! A struct [`VidscribeConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `OPENAI_API_KEY`, `OPENAI_BASE_URL` e
//! `OPENAI_VIDEO_MODEL` têm precedência sobre o arquivo.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::AppError;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "vidscribe.toml";

/// Configuração de nível superior carregada de `vidscribe.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct VidscribeConfig {
    /// Chave da API. Vazia significa "não configurado".
    #[serde(default)]
    pub api_key: String,

    /// URL base do provedor (sem barra final).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Modelo usado na etapa de análise.
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,

    /// Modelo usado na transcrição.
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    /// Idioma enviado como dica para a transcrição.
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    #[serde(default)]
    pub analysis: AnalysisSettings,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_analysis_model() -> String {
    "o3-mini".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

/// Parâmetros das duas camadas de retentativa.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub inner_max_retries: u32,
    pub inner_base_delay_ms: u64,
    pub inner_max_delay_ms: u64,
    pub outer_max_retries: u32,
    pub outer_base_delay_ms: u64,
    pub outer_max_delay_ms: u64,
    /// Atrasos fixos para falhas de rede (o último se repete).
    pub network_delays_ms: Vec<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            inner_max_retries: 2,
            inner_base_delay_ms: 500,
            inner_max_delay_ms: 1_000,
            outer_max_retries: 6,
            outer_base_delay_ms: 3_000,
            outer_max_delay_ms: 96_000,
            network_delays_ms: vec![300, 600, 900],
        }
    }
}

/// Prazos máximos de cada chamada externa.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub transcription_secs: u64,
    pub analysis_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            transcription_secs: 300,
            analysis_secs: 60,
        }
    }
}

impl TimeoutSettings {
    pub fn transcription(&self) -> Duration {
        Duration::from_secs(self.transcription_secs)
    }

    pub fn analysis(&self) -> Duration {
        Duration::from_secs(self.analysis_secs)
    }
}

/// Limites aplicados ao prompt de análise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub max_transcript_chars: usize,
    pub max_segments: usize,
    pub segment_preview_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_transcript_chars: 1_000,
            max_segments: 10,
            segment_preview_chars: 60,
            max_tokens: 1_500,
            temperature: 0.5,
        }
    }
}

impl Default for VidscribeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            analysis_model: default_analysis_model(),
            transcription_model: default_transcription_model(),
            language: default_language(),
            retry: RetrySettings::default(),
            timeouts: TimeoutSettings::default(),
            analysis: AnalysisSettings::default(),
        }
    }
}

impl VidscribeConfig {
    /// Carrega a configuração de `vidscribe.toml` no diretório atual e aplica
    /// as variáveis de ambiente.
    pub fn load() -> Result<Self, AppError> {
        let mut config = Self::from_file(Path::new(CONFIG_FILE))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Lê o arquivo indicado. Usa valores padrão se o arquivo não existir.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str::<VidscribeConfig>(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo; valores vazios são ignorados.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.api_key = key;
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = non_empty("OPENAI_VIDEO_MODEL") {
            self.analysis_model = model;
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
    }

    /// Verdadeiro quando há uma chave de API.
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.retry.network_delays_ms.is_empty() {
            return Err(AppError::Config(
                "retry.network_delays_ms must list at least one delay".into(),
            ));
        }
        if self.timeouts.transcription_secs == 0 || self.timeouts.analysis_secs == 0 {
            return Err(AppError::Config("timeouts must be greater than zero".into()));
        }
        Ok(())
    }
}
