//! Utterance endpointing: turns the raw frame stream into complete
//! utterances using voice activity detection.
//!
//! Leading silence is never buffered; trailing silence is included in the
//! returned utterance because it helps the recognizer. Utterances shorter
//! than the configured minimum are discarded as noise bursts.

use crate::config::VadConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::{DriverState, StateHandle};
use crate::vad::VoiceDetector;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Poll interval for the frame queue, keeping the endpointer responsive
/// to cancellation.
const FRAME_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Consumes PCM frames and produces one utterance per call.
pub struct Endpointer {
    frames: mpsc::Receiver<Bytes>,
    vad: Box<dyn VoiceDetector>,
    state: StateHandle,
    sample_rate: u32,
    silence_threshold: f32,
    min_speech_duration: f32,
}

impl Endpointer {
    /// Create an endpointer over a frame queue.
    pub fn new(
        frames: mpsc::Receiver<Bytes>,
        vad: Box<dyn VoiceDetector>,
        state: StateHandle,
        sample_rate: u32,
        config: &VadConfig,
    ) -> Self {
        Self {
            frames,
            vad,
            state,
            sample_rate,
            silence_threshold: config.silence_threshold,
            min_speech_duration: config.min_speech_duration,
        }
    }

    /// Collect frames until a complete utterance is detected, then return
    /// its concatenated PCM bytes.
    ///
    /// Guarantees at least one speech-positive frame and a total duration
    /// of at least `min_speech_duration`. Frames arriving while the driver
    /// is SPEAKING are discarded (echo suppression).
    ///
    /// # Errors
    ///
    /// Returns an error if the frame queue closes (the audio source
    /// stopped).
    pub async fn next_utterance(&mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        let mut speech_active = false;
        let mut silence_duration = 0.0_f32;

        loop {
            let frame = match tokio::time::timeout(FRAME_POLL_TIMEOUT, self.frames.recv()).await {
                Err(_) => continue,
                Ok(None) => {
                    return Err(AssistantError::Channel("frame queue closed".into()));
                }
                Ok(Some(frame)) => frame,
            };

            // Ignore our own playback (half-duplex echo suppression).
            if self.state.get() == DriverState::Speaking {
                continue;
            }

            let frame_duration = self.frame_duration(&frame);
            let is_speech = self.vad.is_speech(&frame, self.sample_rate);

            if is_speech {
                if !speech_active {
                    // Speech onset.
                    speech_active = true;
                    self.state.set(DriverState::Listening);
                    debug!("speech onset");
                }
                silence_duration = 0.0;
                buffer.extend_from_slice(&frame);
            } else if speech_active {
                buffer.extend_from_slice(&frame);
                silence_duration += frame_duration;

                if silence_duration >= self.silence_threshold {
                    let total_duration =
                        buffer.len() as f32 / (self.sample_rate as f32 * 2.0);
                    // The buffer ends with the full silence tail; only the
                    // part before it counts toward the minimum.
                    let speech_duration = total_duration - silence_duration;
                    if speech_duration >= self.min_speech_duration {
                        debug!("utterance endpointed: {total_duration:.2}s");
                        return Ok(buffer.freeze());
                    }

                    // Too short: a noise burst, not speech.
                    debug!("discarding micro-utterance ({speech_duration:.2}s of speech)");
                    buffer.clear();
                    speech_active = false;
                    silence_duration = 0.0;
                    self.vad.reset();
                    self.state.set(DriverState::Idle);
                }
            }
            // Leading silence (not active, not speech) is dropped.
        }
    }

    /// Discard every queued frame (echo guard).
    pub fn drain(&mut self) {
        while self.frames.try_recv().is_ok() {}
    }

    /// Reset the voice detector at an utterance boundary.
    pub fn reset_vad(&mut self) {
        self.vad.reset();
    }

    fn frame_duration(&self, frame: &Bytes) -> f32 {
        (frame.len() as f32 / 2.0) / self.sample_rate as f32
    }
}
