//! Malone: voice-driven personal AI assistant.
//!
//! A real-time conversation pipeline:
//! Microphone → VAD endpointing → STT → LLM (+tools) → TTS → Speaker
//!
//! # Architecture
//!
//! The [`pipeline::ConversationDriver`] owns a four-state machine
//! (idle/listening/processing/speaking) over components constructed once
//! at startup:
//! - **Audio capture**: microphone frames via `cpal`, pushed from the
//!   audio thread onto a bounded queue (drop-on-full)
//! - **Endpointer**: VAD-based utterance boundary detection with
//!   half-duplex echo suppression
//! - **STT**: NVIDIA Parakeet transcription on the blocking pool
//! - **LLM**: local/cloud routing with one-shot mutual fallback and an
//!   OpenAI-style tool-calling loop
//! - **TTS**: OpenAI-compatible speech API returning raw PCM
//! - **Audio playback**: speaker output via `cpal`

pub mod app;
pub mod audio;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stt;
pub mod tools;
pub mod tts;
pub mod vad;

pub use app::AssistantApp;
pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use pipeline::{ConversationDriver, DriverState, Endpointer, StateHandle};
