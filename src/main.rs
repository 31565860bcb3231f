mod cli;
mod ui;

use anyhow::{Context, bail};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use vidscribe::classifier::{classify, parse_retry_after};
use vidscribe::config::VidscribeConfig;
use vidscribe::error::ClassifiedError;
use vidscribe::openai::OpenAiClient;
use vidscribe::service::MediaAnalysisService;
use vidscribe::steps::load_uploads;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = VidscribeConfig::load().context("failed to load configuration")?;
    if let Some(model) = &cli.model {
        config.analysis_model = model.clone();
    }
    if let Some(max_retries) = cli.max_retries {
        config.retry.outer_max_retries = max_retries;
    }

    match cli.command {
        Command::Analyze { files, mime, json } => analyze(&config, &files, mime.as_deref(), json).await,
        Command::Check => {
            ui::print_check(&config);
            Ok(())
        }
        Command::Classify { status, message } => {
            let verdict = classify(status, &json!({ "error": { "message": message } }))
                .with_retry_after(parse_retry_after(None, &message));
            ui::print_verdict(&verdict);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise `vidscribe=info`, or debug with `--verbose`.
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(verbose: bool) {
    let default = if verbose { "vidscribe=debug" } else { "vidscribe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

async fn analyze(
    config: &VidscribeConfig,
    files: &[std::path::PathBuf],
    mime: Option<&str>,
    as_json: bool,
) -> anyhow::Result<()> {
    let client = OpenAiClient::new(config.api_key.clone(), config.base_url.clone())
        .context("failed to build HTTP client")?;
    let service = MediaAnalysisService::start(client, config);

    // All files are read before the first submission, so a bad path cannot
    // abort work already in the queue. The queue runs one file at a time.
    let submissions: Vec<_> = load_uploads(files, mime)
        .into_iter()
        .map(|(file, upload)| {
            let submission = upload.and_then(|upload| service.analyze(upload));
            (file, submission)
        })
        .collect();

    let total = submissions.len();
    let mut failed = 0;
    for (idx, (file, submission)) in submissions.into_iter().enumerate() {
        let progress = (!as_json).then(|| ui::JobProgress::start(&file, idx + 1, total));
        let outcome = match submission {
            Ok(handle) => handle.outcome().await,
            Err(err) => Err(err),
        };
        if outcome.is_err() {
            failed += 1;
        }

        match progress {
            Some(progress) => progress.complete(&file, &outcome),
            None => println!("{}", ui::to_json(&json_outcome(&file, &outcome))?),
        }
    }

    if failed > 0 {
        bail!("{failed} of {total} files failed");
    }
    Ok(())
}

fn json_outcome(
    file: &str,
    outcome: &Result<vidscribe::orchestrator::PipelineResult, ClassifiedError>,
) -> serde_json::Value {
    match outcome {
        Ok(result) => json!({ "file": file, "ok": true, "result": result }),
        Err(err) => json!({
            "file": file,
            "ok": false,
            "error": {
                "category": err.category(),
                "status": err.status_code(),
                "retryable": err.is_retryable(),
                "retry_after_secs": err.retry_after_secs(),
                "message": err.message(),
                "user_message": err.user_message(),
            }
        }),
    }
}
