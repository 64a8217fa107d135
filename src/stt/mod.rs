//! Speech-to-text using NVIDIA Parakeet TDT.
//!
//! Uses `parakeet-rs` with the `ParakeetTDT` model for batch transcription
//! with punctuation support.

use crate::audio::pcm_to_samples;
use crate::config::SttConfig;
use crate::error::{AssistantError, Result};
use crate::models::ModelManager;
use parakeet_rs::{ParakeetTDT, TimestampMode, Transcriber as _};
use std::time::Instant;
use tracing::info;

/// Blocking utterance transcription.
///
/// Implementations take 16kHz mono 16-bit LE PCM and return the
/// whitespace-trimmed transcript; an empty string means the audio was
/// unintelligible and is a valid outcome, distinct from an error. The
/// driver invokes this on a worker thread.
pub trait Transcriber: Send {
    /// Transcribe one utterance.
    ///
    /// # Errors
    ///
    /// Returns an error if the model fails; never for merely silent audio.
    fn transcribe(&mut self, pcm: &[u8]) -> Result<String>;
}

/// Speech-to-text engine using Parakeet TDT (multilingual, 25 languages).
pub struct ParakeetStt {
    model: Option<ParakeetTDT>,
    model_id: String,
    sample_rate: u32,
    model_manager: ModelManager,
}

impl ParakeetStt {
    /// Create a new STT engine instance.
    ///
    /// The model is loaded lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be prepared.
    pub fn new(config: &SttConfig, sample_rate: u32) -> Result<Self> {
        let model_manager = ModelManager::new(&config.cache_dir)?;
        info!("STT configured with model: {}", config.model_id);

        Ok(Self {
            model: None,
            model_id: config.model_id.clone(),
            sample_rate,
            model_manager,
        })
    }

    /// Eagerly load the model so the first utterance is not delayed.
    ///
    /// # Errors
    ///
    /// Returns an error if model download or loading fails.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.model.is_none() {
            self.initialize()?;
        }
        Ok(())
    }

    /// Load the Parakeet TDT model from cache (downloading if needed).
    fn initialize(&mut self) -> Result<()> {
        info!("loading STT model: {}", self.model_id);

        let repo_dir = self.model_manager.get_repo_dir(&self.model_id)?;
        let model = ParakeetTDT::from_pretrained(&repo_dir, None)
            .map_err(|e| AssistantError::Stt(format!("failed to load Parakeet TDT: {e}")))?;

        info!("STT model loaded successfully");
        self.model = Some(model);
        Ok(())
    }
}

impl Transcriber for ParakeetStt {
    fn transcribe(&mut self, pcm: &[u8]) -> Result<String> {
        if self.model.is_none() {
            self.initialize()?;
        }

        let samples = pcm_to_samples(pcm);
        let duration_s = samples.len() as f32 / self.sample_rate as f32;
        let start = Instant::now();

        let model = self
            .model
            .as_mut()
            .ok_or_else(|| AssistantError::Stt("model not initialized".into()))?;

        let result = model
            .transcribe_samples(
                samples,
                self.sample_rate,
                1, // mono
                Some(TimestampMode::Sentences),
            )
            .map_err(|e| AssistantError::Stt(format!("transcription failed: {e}")))?;

        let text = result.text.trim().to_owned();
        info!(
            "transcribed {duration_s:.1}s audio in {:.0}ms: \"{text}\"",
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}
