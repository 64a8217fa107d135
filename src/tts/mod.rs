//! Text-to-speech via an OpenAI-compatible speech API.
//!
//! Targets any server implementing `/v1/audio/speech` with raw-PCM output
//! (Kokoro-FastAPI, OpenAI, LocalAI). Requesting `response_format: "pcm"`
//! yields 24kHz 16-bit LE mono directly, so no decode step is needed
//! before playback.

use crate::audio::{pcm_to_samples, samples_to_pcm};
use crate::config::TtsConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};

/// Sample rate of the PCM returned by the speech API.
const PCM_SAMPLE_RATE: u32 = 24_000;

/// Per-request synthesis timeout.
const SYNTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Async text-to-speech synthesis.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Native sample rate of the produced PCM. The playback sink is
    /// configured with this at construction time.
    fn sample_rate(&self) -> u32;

    /// Convert text to raw 16-bit LE mono PCM at [`Self::sample_rate`].
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis fails; the driver treats this as
    /// recoverable.
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

/// Text-to-speech engine speaking the OpenAI audio API.
pub struct HttpTts {
    client: reqwest::Client,
    base_url: String,
    model: String,
    voice: String,
    api_key: String,
    /// Playback rate multiplier derived from the `rate` percentage.
    speed: f32,
    /// Linear gain derived from the `volume` percentage.
    gain: f32,
}

impl HttpTts {
    /// Create a synthesizer from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate/volume percentages are malformed or
    /// the HTTP client cannot be constructed.
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let speed = 1.0 + parse_percent(&config.rate)? / 100.0;
        let gain = 1.0 + parse_percent(&config.volume)? / 100.0;
        if speed <= 0.0 {
            return Err(AssistantError::Config(format!(
                "tts.rate '{}' yields a non-positive speed",
                config.rate
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(SYNTH_TIMEOUT)
            .build()
            .map_err(|e| AssistantError::Tts(format!("failed to build HTTP client: {e}")))?;

        info!(
            "TTS configured: {} voice={} speed={speed:.2} gain={gain:.2}",
            config.base_url, config.voice
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            api_key: config.api_key.clone(),
            speed,
            gain,
        })
    }
}

#[async_trait]
impl Synthesizer for HttpTts {
    fn sample_rate(&self) -> u32 {
        PCM_SAMPLE_RATE
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        if text.trim().is_empty() {
            return Ok(Bytes::new());
        }

        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "speed": self.speed,
            "response_format": "pcm",
        });
        debug!(voice = self.voice.as_str(), chars = text.len(), "TTS request");

        let mut request = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AssistantError::Tts(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AssistantError::Tts(format!(
                "speech API returned {status}: {detail}"
            )));
        }

        let pcm = response
            .bytes()
            .await
            .map_err(|e| AssistantError::Tts(format!("failed to read audio body: {e}")))?;

        if (self.gain - 1.0).abs() < f32::EPSILON {
            return Ok(pcm);
        }

        // Apply the configured volume as linear gain.
        let scaled: Vec<f32> = pcm_to_samples(&pcm)
            .into_iter()
            .map(|s| s * self.gain)
            .collect();
        Ok(Bytes::from(samples_to_pcm(&scaled)))
    }
}

/// Parse a signed percentage string like `"+10%"`, `"-25%"`, or `"0%"`.
fn parse_percent(raw: &str) -> Result<f32> {
    let trimmed = raw.trim().trim_end_matches('%');
    trimmed
        .parse::<f32>()
        .map_err(|_| AssistantError::Config(format!("invalid percentage: '{raw}'")))
}
