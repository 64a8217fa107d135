//! Configuration types for the assistant pipeline.
//!
//! Resolution order: built-in defaults, overridden by the YAML config file,
//! overridden by `MALONE_`-prefixed environment variables (secrets and
//! endpoints only).

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Voice activity detection settings.
    pub vad: VadConfig,
    /// Speech-to-text settings.
    pub stt: SttConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Language model backends.
    pub llm: LlmConfig,
    /// Local/cloud routing policy.
    pub router: RouterConfig,
    /// Conversation transcript and tool-loop settings.
    pub conversation: ConversationConfig,
    /// Home Assistant tool settings.
    pub home_assistant: HomeAssistantConfig,
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Number of capture channels (1 = mono).
    pub channels: u16,
    /// Frame size in samples per channel (480 = 30ms at 16kHz).
    pub blocksize: usize,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            blocksize: 480,
            input_device: None,
            output_device: None,
        }
    }
}

impl AudioConfig {
    /// Size in bytes of one 16-bit PCM frame.
    pub fn frame_bytes(&self) -> usize {
        self.blocksize * self.channels as usize * 2
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration(&self) -> f32 {
        self.blocksize as f32 / self.sample_rate as f32
    }
}

/// Voice activity detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Speech confidence threshold on a 0..1 score.
    pub threshold: f32,
    /// Seconds of trailing silence that end an utterance.
    pub silence_threshold: f32,
    /// Minimum utterance duration in seconds; shorter bursts are dropped.
    pub min_speech_duration: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            silence_threshold: 0.8,
            min_speech_duration: 0.3,
        }
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// HuggingFace model ID for the STT model.
    pub model_id: String,
    /// Directory for caching downloaded models.
    pub cache_dir: PathBuf,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            // The ONNX-converted repo — the original NVIDIA repo only has .nemo format.
            model_id: "istupakov/parakeet-tdt-0.6b-v3-onnx".to_owned(),
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("malone")
        .join("models")
}

/// Text-to-speech configuration.
///
/// Targets any server implementing the OpenAI `/v1/audio/speech` API
/// (Kokoro-FastAPI, OpenAI, LocalAI, etc.) with raw-PCM output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL including `/v1`.
    pub base_url: String,
    /// Model identifier sent in requests.
    pub model: String,
    /// Voice name.
    pub voice: String,
    /// Speaking rate as a signed percentage, e.g. "+10%".
    pub rate: String,
    /// Output volume as a signed percentage, e.g. "-20%".
    pub volume: String,
    /// Bearer token; empty for servers that do not require one.
    pub api_key: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8880/v1".to_owned(),
            model: "tts-1".to_owned(),
            voice: "alloy".to_owned(),
            rate: "+0%".to_owned(),
            volume: "+0%".to_owned(),
            api_key: String::new(),
        }
    }
}

/// Language model backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Required local backend (Ollama-style OpenAI-compatible API).
    pub local: LocalLlmConfig,
    /// Optional cloud backend; an empty `api_key` disables it.
    pub cloud: CloudLlmConfig,
}

/// Local LLM backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalLlmConfig {
    /// Base URL including `/v1`.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Request timeout in seconds.
    #[serde(alias = "timeout")]
    pub timeout_secs: u64,
}

impl Default for LocalLlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/v1".to_owned(),
            model: "llama3.1:8b".to_owned(),
            timeout_secs: 30,
        }
    }
}

/// Cloud LLM backend configuration (Anthropic Messages API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudLlmConfig {
    /// API key; empty disables the cloud backend entirely.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Maximum tokens per response.
    pub max_tokens: usize,
    /// Base URL (override for testing with mock servers).
    pub base_url: String,
}

impl Default for CloudLlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-sonnet-4-5-20250929".to_owned(),
            max_tokens: 1024,
            base_url: "https://api.anthropic.com".to_owned(),
        }
    }
}

impl CloudLlmConfig {
    /// Whether the cloud backend is usable.
    pub fn enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Routing policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// User messages longer than this many bytes route to the cloud.
    pub complexity_threshold: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 500,
        }
    }
}

/// Conversation transcript and tool-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// System prompt prepended to every LLM request.
    pub system_prompt: String,
    /// Maximum number of retained transcript entries after the system prompt.
    pub max_history: usize,
    /// Maximum LLM/tool round-trips per user turn.
    pub max_tool_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are Malone, a helpful personal AI assistant. \
                You control smart home devices, manage network infrastructure, \
                and help with daily tasks. Keep voice responses concise."
                .to_owned(),
            max_history: 50,
            max_tool_turns: 8,
        }
    }
}

/// Home Assistant tool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    /// Base URL, e.g. `http://homeassistant.local:8123`. Empty disables the tools.
    pub url: String,
    /// Long-lived access token.
    pub token: String,
}

impl AssistantConfig {
    /// Load configuration: defaults, then the YAML file at `path` (if it
    /// exists), then `MALONE_` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&raw).map_err(|e| {
                AssistantError::Config(format!("invalid config {}: {e}", path.display()))
            })?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default config file location (working directory).
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config.yaml")
    }

    /// Overlay secrets and endpoints from `MALONE_` environment variables.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_nonempty("MALONE_LLM_LOCAL_BASE_URL") {
            self.llm.local.base_url = v;
        }
        if let Some(v) = env_nonempty("MALONE_LLM_LOCAL_MODEL") {
            self.llm.local.model = v;
        }
        if let Some(v) = env_nonempty("MALONE_LLM_CLOUD_API_KEY") {
            self.llm.cloud.api_key = v;
        }
        if let Some(v) = env_nonempty("MALONE_LLM_CLOUD_MODEL") {
            self.llm.cloud.model = v;
        }
        if let Some(v) = env_nonempty("MALONE_TTS_BASE_URL") {
            self.tts.base_url = v;
        }
        if let Some(v) = env_nonempty("MALONE_TTS_API_KEY") {
            self.tts.api_key = v;
        }
        if let Some(v) = env_nonempty("MALONE_HOME_ASSISTANT_URL") {
            self.home_assistant.url = v;
        }
        if let Some(v) = env_nonempty("MALONE_HOME_ASSISTANT_TOKEN") {
            self.home_assistant.token = v;
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
