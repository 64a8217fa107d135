//! Audio I/O: source/sink contracts and PCM helpers.
//!
//! All audio crossing these interfaces is raw 16-bit signed little-endian
//! PCM. Capture is mono at the configured rate (default 16kHz); playback
//! runs at the synthesizer's native rate. There is no runtime format
//! negotiation.

pub mod capture;
pub mod playback;

pub use capture::CpalSource;
pub use playback::CpalSink;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Capacity of the frame queue between the capture thread and the
/// endpointer (~6s of audio at 30ms frames). Overflow drops the new frame.
pub const FRAME_QUEUE_CAPACITY: usize = 200;

/// Where an [`AudioSource`] delivers captured frames.
///
/// Senders must use `try_send`: the capture thread may never block.
pub type FrameSink = mpsc::Sender<Bytes>;

/// Produces a stream of fixed-size PCM frames on its own thread.
pub trait AudioSource: Send {
    /// Begin delivering frames to `sink`. Returns once capture is live.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture device cannot be opened.
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    /// Stop capture. No frames are delivered after this returns.
    fn stop(&mut self);
}

/// Renders raw PCM and completes when playback has finished.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play a full clip of 16-bit LE PCM at the sink's fixed sample rate.
    ///
    /// The returned future resolves when rendering completes; the
    /// implementation must not block the async runtime while waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the output device or stream fails.
    async fn play(&self, pcm: Bytes) -> Result<()>;
}

/// Decode 16-bit LE PCM bytes to normalized f32 samples.
pub fn pcm_to_samples(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Encode normalized f32 samples as 16-bit LE PCM bytes.
pub fn samples_to_pcm(samples: &[f32]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        pcm.extend_from_slice(&clamped.to_le_bytes());
    }
    pcm
}
