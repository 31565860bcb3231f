//! Interface de terminal do vidscribe: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente a espera
//! pelo resultado de um arquivo no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use vidscribe::config::VidscribeConfig;
use vidscribe::error::{AppError, ClassifiedError, ErrorCategory};
use vidscribe::orchestrator::PipelineResult;
use vidscribe::steps::{MAX_FILE_SIZE_MB, format_timestamp};

/// Indicador visual de progresso para um arquivo na fila.
///
/// Exibe um spinner animado enquanto o job espera ou roda, e mensagens
/// coloridas para sucesso (verde), falha definitiva (vermelho) e limites
/// temporários (amarelo).
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl JobProgress {
    /// Inicia o spinner com o nome do arquivo.
    pub fn start(file: &str, position: usize, total: usize) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("[{position}/{total}] {file}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Finaliza o spinner e exibe o resultado do arquivo.
    pub fn complete(&self, file: &str, outcome: &Result<PipelineResult, ClassifiedError>) {
        self.pb.finish_and_clear();
        match outcome {
            Ok(result) => {
                println!(
                    "  {} {file} {}",
                    self.green.apply_to("✓"),
                    self.dim.apply_to(format!(
                        "({} of media, {:.1}s)",
                        format_timestamp(result.duration_seconds),
                        result.processing_ms as f64 / 1000.0
                    ))
                );
                self.print_result(result);
            }
            Err(err) => self.failure(file, err),
        }
    }

    /// Falha de um arquivo, com a mensagem da categoria.
    pub fn failure(&self, file: &str, err: &ClassifiedError) {
        self.pb.finish_and_clear();
        let style = self.category_style(err.category());
        println!(
            "  {} {file}: {}",
            style.apply_to("✗"),
            style.apply_to(err.user_message())
        );
        println!("    {}", self.dim.apply_to(err.to_string()));
    }

    fn print_result(&self, result: &PipelineResult) {
        if !result.summary.is_empty() {
            println!("    {}", result.summary);
        }
        for highlight in &result.highlights {
            println!("    • {highlight}");
        }
        for segment in &result.segments {
            println!(
                "    {} {}",
                self.dim.apply_to(format!(
                    "{}-{}",
                    format_timestamp(segment.start_time),
                    format_timestamp(segment.end_time)
                )),
                segment.title
            );
        }
    }

    fn category_style(&self, category: ErrorCategory) -> &Style {
        match category {
            ErrorCategory::UsageLimit | ErrorCategory::NetworkFailure => &self.yellow,
            _ => &self.red,
        }
    }
}

/// Imprime o veredito do classificador para `vidscribe classify`.
pub fn print_verdict(err: &ClassifiedError) {
    let label = Style::new().bold();
    println!("{} {}", label.apply_to("category:   "), err.category());
    println!("{} {}", label.apply_to("retryable:  "), err.is_retryable());
    println!("{} {}", label.apply_to("status:     "), err.status_code());
    match err.retry_after_secs() {
        Some(secs) => println!("{} {secs}s", label.apply_to("retry after:")),
        None => println!("{} -", label.apply_to("retry after:")),
    }
    println!("{} {}", label.apply_to("user message:"), err.user_message());
}

/// Imprime o estado da configuração para `vidscribe check`. A chave nunca
/// é exibida.
pub fn print_check(config: &VidscribeConfig) {
    let (mark, state) = if config.is_configured() {
        (Style::new().green().bold().apply_to("✓"), "configured")
    } else {
        (
            Style::new().red().bold().apply_to("✗"),
            "not configured (set OPENAI_API_KEY)",
        )
    };
    println!("{mark} {state}");
    println!("  endpoint:        {}", config.base_url);
    println!("  analysis model:  {}", config.analysis_model);
    println!("  transcription:   {} ({})", config.transcription_model, config.language);
    println!(
        "  timeouts:        {}s transcription, {}s analysis",
        config.timeouts.transcription_secs, config.timeouts.analysis_secs
    );
    println!(
        "  retries:         {} fast, {} patient",
        config.retry.inner_max_retries, config.retry.outer_max_retries
    );
    println!("  upload limit:    {MAX_FILE_SIZE_MB}MB");
}

/// Serializa um valor para a saída `--json`.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(value)?)
}
