//! Local-program synthesis backend.
//!
//! Runs the configured command with `{lang}` substituted, writes the page
//! text to its stdin and reads the encoded audio from its stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{SpeechSynthesizer, SynthError};
use crate::config::SynthesisConfig;

const LANG_PLACEHOLDER: &str = "{lang}";

pub struct CommandSynthesizer {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandSynthesizer {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(
            config.command.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Program and arguments with the language substituted.
    fn command_line(&self, language: &str) -> Result<(String, Vec<String>), SynthError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| SynthError::Command("no synthesis command configured".into()))?;
        let args = args
            .iter()
            .map(|a| a.replace(LANG_PLACEHOLDER, language))
            .collect();
        Ok((program.clone(), args))
    }

    async fn run(&self, text: &str, language: &str) -> Result<Vec<u8>, SynthError> {
        let (program, args) = self.command_line(language)?;

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SynthError::Command(format!("failed to spawn {program}: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| SynthError::Command(format!("failed to write to {program}: {e}")))?;
            // Dropping stdin closes the pipe so the program sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SynthError::Command(format!("{program} did not finish: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthError::Command(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(SynthError::EmptyAudio);
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SynthError> {
        tokio::time::timeout(self.timeout, self.run(text, language))
            .await
            .map_err(|_| SynthError::Timeout)?
    }
}
