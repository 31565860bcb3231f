//! Single-lane media analysis: speech-to-text followed by highlight
//! extraction, with classified errors and layered retries around every
//! provider call.

pub mod classifier;
pub mod config;
pub mod error;
pub mod openai;
pub mod orchestrator;
pub mod queue;
pub mod retry;
pub mod service;
pub mod steps;
