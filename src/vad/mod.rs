//! Voice activity detection using energy-based analysis.
//!
//! Classifies each PCM frame with an RMS-energy confidence score over an
//! adaptive noise floor. Silero ONNX model integration is planned for a
//! future version.

use crate::audio::pcm_to_samples;
use tracing::info;

/// Stateful speech/non-speech classifier for PCM frames.
///
/// Consecutive calls share smoothing context, so the detector is called
/// sequentially from one task; it is not thread-safe by design.
pub trait VoiceDetector: Send {
    /// Whether this frame contains speech.
    fn is_speech(&mut self, frame: &[u8], sample_rate: u32) -> bool;

    /// Clear detection context at an utterance boundary.
    fn reset(&mut self);
}

/// Initial noise floor estimate (RMS of normalized samples, ~-60 dBFS).
const INITIAL_NOISE_FLOOR: f32 = 1e-3;

/// Lower bound for the adaptive floor so confidence stays finite.
const MIN_NOISE_FLOOR: f32 = 1e-4;

/// How fast the floor rises toward sustained louder input.
const NOISE_FLOOR_RISE: f32 = 0.02;

/// Smoothing factor applied to the per-frame confidence.
const SMOOTHING: f32 = 0.6;

/// Shapes the energy-over-floor ratio into a 0..1 confidence.
const SNR_SCALE: f32 = 4.0;

/// Voice activity detector using RMS energy over an adaptive noise floor.
///
/// Each frame gets a 0..1 confidence: 0 at the noise floor, approaching 1
/// as energy climbs well above it. The confidence is exponentially
/// smoothed across frames to suppress single-frame flicker.
pub struct EnergyVad {
    threshold: f32,
    noise_floor: f32,
    smoothed: f32,
}

impl EnergyVad {
    /// Create a detector with the given confidence threshold (0..1).
    pub fn new(threshold: f32) -> Self {
        info!("VAD initialized: threshold={threshold}");
        Self {
            threshold,
            noise_floor: INITIAL_NOISE_FLOOR,
            smoothed: 0.0,
        }
    }

    /// Smoothed speech confidence for one frame.
    fn confidence(&mut self, frame: &[u8]) -> f32 {
        let samples = pcm_to_samples(frame);
        let rms = compute_rms_energy(&samples);

        // Track the quiet level: drop fast, rise slowly so speech does not
        // drag the floor up.
        if rms < self.noise_floor {
            self.noise_floor = rms;
        } else {
            self.noise_floor += (rms - self.noise_floor) * NOISE_FLOOR_RISE;
        }
        let floor = self.noise_floor.max(MIN_NOISE_FLOOR);

        let snr = rms / floor;
        let raw = if snr <= 1.0 {
            0.0
        } else {
            1.0 - (-(snr - 1.0) / SNR_SCALE).exp()
        };

        self.smoothed += (raw - self.smoothed) * SMOOTHING;
        self.smoothed
    }
}

impl VoiceDetector for EnergyVad {
    fn is_speech(&mut self, frame: &[u8], _sample_rate: u32) -> bool {
        self.confidence(frame) >= self.threshold
    }

    fn reset(&mut self) {
        // The noise floor is device calibration, not utterance context, so
        // it survives the reset.
        self.smoothed = 0.0;
    }
}

/// Compute RMS energy of normalized audio samples.
fn compute_rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
