//! HTTP synthesis backend.
//!
//! Sends `{"text", "lang", "slow"}` as JSON to the configured endpoint and
//! takes the response body as the encoded audio.

use async_trait::async_trait;

use super::{SpeechSynthesizer, SynthError};
use crate::config::SynthesisConfig;

pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    slow: bool,
}

impl HttpSynthesizer {
    /// Build an `HttpSynthesizer` from application config.
    ///
    /// The client carries the per-request timeout from
    /// `config.timeout_secs`.
    pub fn from_config(config: &SynthesisConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            slow: config.slow,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    /// The `Authorization: Bearer …` header is attached only when an API key
    /// is configured and non-empty.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SynthError> {
        let body = serde_json::json!({
            "text": text,
            "lang": language,
            "slow": self.slow,
        });

        let mut req = self.client.post(&self.endpoint).json(&body);

        let key = self.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?.error_for_status()?;
        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(SynthError::EmptyAudio);
        }

        log::debug!(
            "synth: {} chars ({language}) -> {} bytes",
            text.chars().count(),
            audio.len()
        );
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(api_key: Option<&str>) -> SynthesisConfig {
        SynthesisConfig {
            // Discard port; nothing listens there.
            endpoint: "http://127.0.0.1:9/api/tts".into(),
            api_key: api_key.map(|s| s.to_string()),
            timeout_secs: 2,
            ..SynthesisConfig::default()
        }
    }

    #[test]
    fn from_config_accepts_empty_and_real_keys() {
        let _a = HttpSynthesizer::from_config(&make_config(None));
        let _b = HttpSynthesizer::from_config(&make_config(Some("")));
        let _c = HttpSynthesizer::from_config(&make_config(Some("sk-test")));
    }

    #[test]
    fn synthesizer_is_object_safe() {
        let synth: Box<dyn SpeechSynthesizer> =
            Box::new(HttpSynthesizer::from_config(&make_config(None)));
        drop(synth);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let synth = HttpSynthesizer::from_config(&make_config(None));
        let err = synth.synthesize("hello", "en").await.unwrap_err();
        assert!(matches!(err, SynthError::Request(_) | SynthError::Timeout));
    }
}
