//! Interface de linha de comando do vidscribe baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (analyze, check,
//! classify) e flags globais (--model, --max-retries, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// vidscribe: transcrição e análise de destaques de áudio e vídeo.
#[derive(Debug, Parser)]
#[command(name = "vidscribe", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Modelo de análise (sobrescreve OPENAI_VIDEO_MODEL e o arquivo de config).
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Número máximo de retentativas da camada externa.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Transcreve e analisa um ou mais arquivos, um de cada vez, na ordem dada.
    Analyze {
        /// Arquivos de áudio ou vídeo (até 25MB cada).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Força o tipo MIME em vez de deduzi-lo pela extensão.
        #[arg(long)]
        mime: Option<String>,

        /// Imprime cada resultado como JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Mostra se o serviço está configurado e quais parâmetros estão em uso.
    Check,

    /// Classifica uma mensagem de erro do provedor (diagnóstico).
    Classify {
        /// Status HTTP recebido junto com a mensagem.
        #[arg(long)]
        status: Option<u16>,

        /// Texto da mensagem de erro.
        message: String,
    },
}
