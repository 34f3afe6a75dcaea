//! Speech synthesis for page text.
//!
//! This module provides:
//! * [`SpeechSynthesizer`] — async trait implemented by every backend.
//! * [`HttpSynthesizer`] — POSTs text to a synthesis endpoint.
//! * [`CommandSynthesizer`] — pipes text through a local program.
//! * [`prepare_text`] / [`no_text_message`] — the text actually voiced.
//! * [`from_config`] — builds the backend selected in [`SynthesisConfig`].

pub mod command;
pub mod http;
pub mod text;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{SynthesisBackend, SynthesisConfig};

pub use command::CommandSynthesizer;
pub use http::HttpSynthesizer;
pub use text::{no_text_message, prepare_text};

// ---------------------------------------------------------------------------
// SynthError
// ---------------------------------------------------------------------------

/// Errors that can occur while voicing a page.
#[derive(Debug, Error)]
pub enum SynthError {
    /// HTTP transport error or non-success status.
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("synthesis timed out")]
    Timeout,

    /// The local synthesis program could not be run or exited with failure.
    #[error("synthesis command failed: {0}")]
    Command(String),

    /// The backend answered successfully but produced no audio.
    #[error("synthesizer returned no audio")]
    EmptyAudio,
}

impl From<reqwest::Error> for SynthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SynthError::Timeout
        } else {
            SynthError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer trait
// ---------------------------------------------------------------------------

/// Async trait for text-to-speech backends.
///
/// Implementors must be `Send + Sync` so they can be shared across tasks
/// behind `Arc<dyn SpeechSynthesizer>`.
///
/// # Arguments
/// * `text`     – Text to voice, already passed through [`prepare_text`].
/// * `language` – Language code of the owning document (e.g. `"en"`).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SynthError>;
}

/// Build the synthesizer selected by `config.backend`.
pub fn from_config(config: &SynthesisConfig) -> Arc<dyn SpeechSynthesizer> {
    match config.backend {
        SynthesisBackend::Http => Arc::new(HttpSynthesizer::from_config(config)),
        SynthesisBackend::Command => Arc::new(CommandSynthesizer::from_config(config)),
    }
}
