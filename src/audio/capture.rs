//! Microphone capture using cpal.
//!
//! Captures at the device's native sample rate, mixes to mono, and
//! downsamples to the configured pipeline rate (default 16kHz), emitting
//! fixed-size 16-bit LE frames. The cpal callback runs on the audio
//! thread and never blocks: frames that do not fit in the queue are
//! dropped, which only happens while the driver is ignoring input anyway.

use crate::audio::{AudioSource, FrameSink, samples_to_pcm};
use crate::config::AudioConfig;
use crate::error::{AssistantError, Result};
use bytes::Bytes;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Microphone audio source backed by a cpal input stream.
pub struct CpalSource {
    device: cpal::Device,
    stream_config: StreamConfig,
    target_sample_rate: u32,
    frame_samples: usize,
    stream: Option<cpal::Stream>,
}

impl CpalSource {
    /// Create a capture instance bound to the configured (or default)
    /// input device.
    ///
    /// Uses the device's default configuration for maximum compatibility,
    /// then downsamples to the target rate in software.
    ///
    /// # Errors
    ///
    /// Returns an error if no input device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            let requested = host
                .input_devices()
                .map_err(|e| AssistantError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| match d.description() {
                    Ok(desc) => desc.name() == name,
                    Err(_) => false,
                });

            match requested {
                Some(device) => device,
                None => {
                    warn!(
                        "configured input device '{}' not found, falling back to default input device",
                        name
                    );
                    host.default_input_device()
                        .ok_or_else(|| AssistantError::Audio("no default input device".into()))?
                }
            }
        } else {
            host.default_input_device()
                .ok_or_else(|| AssistantError::Audio("no default input device".into()))?
        };

        let device_name = match device.description() {
            Ok(d) => d.name().to_owned(),
            Err(_) => "<unknown>".into(),
        };
        info!("using input device: {device_name}");

        let default_config = device
            .default_input_config()
            .map_err(|e| AssistantError::Audio(format!("no default input config: {e}")))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();

        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: native_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            "native input config: {}Hz, {} channels",
            native_rate, native_channels
        );
        if native_rate != config.sample_rate {
            info!(
                "will downsample from {}Hz to {}Hz",
                native_rate, config.sample_rate
            );
        }

        Ok(Self {
            device,
            stream_config,
            target_sample_rate: config.sample_rate,
            frame_samples: config.blocksize.max(1),
            stream: None,
        })
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AssistantError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

impl AudioSource for CpalSource {
    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.stream.is_some() {
            return Err(AssistantError::Audio("capture already started".into()));
        }

        let native_rate = self.stream_config.sample_rate;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;
        let frame_samples = self.frame_samples;
        let mut pending: VecDeque<f32> = VecDeque::with_capacity(frame_samples.saturating_mul(4));

        // Rate-limited drop reporting from the audio callback thread.
        let dropped_full = AtomicU64::new(0);
        let last_report_ms = AtomicU64::new(0);

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };

                    let samples = if native_rate != target_rate {
                        downsample(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };

                    pending.extend(samples);

                    // Emit fixed-size frames to keep downstream timing consistent.
                    while pending.len() >= frame_samples {
                        let frame: Vec<f32> = pending.drain(..frame_samples).collect();
                        let bytes = Bytes::from(samples_to_pcm(&frame));
                        match sink.try_send(bytes) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                dropped_full.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                pending.clear();
                                return;
                            }
                        }

                        // Rate-limit logs to avoid spamming.
                        let now_ms = SystemTime::now()
                            .duration_since(UNIX_EPOCH)
                            .map(|d| d.as_millis() as u64)
                            .unwrap_or(0);
                        let last = last_report_ms.load(Ordering::Relaxed);
                        if now_ms.saturating_sub(last) >= 2_000
                            && last_report_ms
                                .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
                                .is_ok()
                        {
                            let n = dropped_full.swap(0, Ordering::Relaxed);
                            if n > 0 {
                                debug!("frame queue full, dropped {n} frames (last 2s)");
                            }
                        }
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| AssistantError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| AssistantError::Audio(format!("failed to start input stream: {e}")))?;

        info!(
            "audio capture started: native {}Hz -> target {}Hz",
            native_rate, target_rate
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("audio capture stopped");
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Simple linear-interpolation downsampler.
///
/// Converts audio from `src_rate` to `dst_rate`. For speech processing
/// (48kHz → 16kHz) this is sufficient quality — no anti-alias filter
/// needed since human speech energy is below 8kHz.
fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}
