//! Speaker playback via cpal.
//!
//! [`CpalPlayback`] renders a full clip synchronously; [`CpalSink`] wraps
//! it for the driver, offloading each clip to the blocking thread pool so
//! the event loop keeps making progress during playback.

use crate::audio::{AudioSink, pcm_to_samples};
use crate::config::AudioConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Blocking audio playback to system speakers.
pub struct CpalPlayback {
    device: cpal::Device,
    stream_config: StreamConfig,
}

impl CpalPlayback {
    /// Create a playback instance at a fixed sample rate (the
    /// synthesizer's native rate).
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn new(config: &AudioConfig, sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| AssistantError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    AssistantError::Audio(format!("output device '{name}' not found"))
                })?
        } else {
            host.default_output_device()
                .ok_or_else(|| AssistantError::Audio("no default output device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name} at {sample_rate}Hz");

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            device,
            stream_config,
        })
    }

    /// Play 16-bit LE PCM through the output device.
    ///
    /// Blocks until all samples have been rendered.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio stream cannot be created or played.
    pub fn play(&mut self, pcm: &[u8]) -> Result<()> {
        let samples = pcm_to_samples(pcm);
        if samples.is_empty() {
            return Ok(());
        }

        let buffer = Arc::new(Mutex::new(PlaybackBuffer {
            samples,
            position: 0,
            finished: false,
        }));
        let buffer_clone = Arc::clone(&buffer);

        let stream = self
            .device
            .build_output_stream(
                &self.stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut buf = match buffer_clone.lock() {
                        Ok(b) => b,
                        Err(_) => return,
                    };

                    for sample in data.iter_mut() {
                        if buf.position < buf.samples.len() {
                            *sample = buf.samples[buf.position];
                            buf.position += 1;
                        } else {
                            *sample = 0.0;
                            buf.finished = true;
                        }
                    }
                },
                move |err| {
                    error!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| AssistantError::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| AssistantError::Audio(format!("failed to start output stream: {e}")))?;

        // Wait for playback to finish.
        loop {
            std::thread::sleep(std::time::Duration::from_millis(10));
            let buf = buffer
                .lock()
                .map_err(|e| AssistantError::Audio(format!("playback buffer lock poisoned: {e}")))?;
            if buf.finished {
                break;
            }
        }

        drop(stream);
        Ok(())
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
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

/// Internal buffer for tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

/// Async sink over [`CpalPlayback`], used by the conversation driver.
pub struct CpalSink {
    playback: Arc<Mutex<CpalPlayback>>,
}

impl CpalSink {
    /// Open the output device at the given sample rate.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn new(config: &AudioConfig, sample_rate: u32) -> Result<Self> {
        Ok(Self {
            playback: Arc::new(Mutex::new(CpalPlayback::new(config, sample_rate)?)),
        })
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, pcm: Bytes) -> Result<()> {
        let playback = Arc::clone(&self.playback);
        tokio::task::spawn_blocking(move || {
            let mut playback = playback
                .lock()
                .map_err(|e| AssistantError::Audio(format!("playback lock poisoned: {e}")))?;
            playback.play(&pcm)
        })
        .await
        .map_err(|e| AssistantError::Audio(format!("playback task failed: {e}")))?
    }
}
