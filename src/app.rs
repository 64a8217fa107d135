//! Application wiring: builds every component from config and runs the
//! conversation driver.

use crate::audio::{CpalSink, CpalSource, FRAME_QUEUE_CAPACITY};
use crate::config::AssistantConfig;
use crate::conversation::Transcript;
use crate::error::Result;
use crate::llm::{AnthropicClient, LlmClient, LlmRouter, OpenAiCompatClient};
use crate::pipeline::{ConversationDriver, Endpointer, StateHandle};
use crate::stt::ParakeetStt;
use crate::tools::builtin::register_builtin_tools;
use crate::tools::{ToolExecutor, ToolRegistry};
use crate::tts::{HttpTts, Synthesizer};
use crate::vad::EnergyVad;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The assembled assistant.
pub struct AssistantApp {
    config: AssistantConfig,
}

impl AssistantApp {
    /// Create an app from resolved configuration.
    pub fn new(config: AssistantConfig) -> Self {
        Self { config }
    }

    /// Construct all components and run the conversation loop until
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if a component cannot be constructed or the
    /// driver fails non-recoverably.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let config = self.config;

        info!("loading speech recognition");
        let mut stt = ParakeetStt::new(&config.stt, config.audio.sample_rate)?;
        // Load eagerly so the first utterance is not delayed by a download.
        tokio::task::block_in_place(|| stt.ensure_loaded())?;

        info!("connecting to local LLM at {}", config.llm.local.base_url);
        let local: Arc<dyn LlmClient> = Arc::new(OpenAiCompatClient::new(&config.llm.local)?);
        let cloud: Option<Arc<dyn LlmClient>> = if config.llm.cloud.enabled() {
            info!("cloud LLM fallback enabled ({})", config.llm.cloud.model);
            Some(Arc::new(AnthropicClient::new(&config.llm.cloud)?))
        } else {
            None
        };
        let llm: Arc<dyn LlmClient> = Arc::new(LlmRouter::new(
            local,
            cloud,
            config.router.complexity_threshold,
        ));

        info!("loading tools");
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, &config.home_assistant)?;
        info!("registered tools: {}", registry.names().join(", "));
        let executor = ToolExecutor::new(Arc::new(registry));

        info!("loading text-to-speech");
        let tts = Arc::new(HttpTts::new(&config.tts)?);
        let sink = Arc::new(CpalSink::new(&config.audio, tts.sample_rate())?);
        let source = CpalSource::new(&config.audio)?;

        let state = StateHandle::new();
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        let vad = Box::new(EnergyVad::new(config.vad.threshold));
        let endpointer = Endpointer::new(
            frame_rx,
            vad,
            state.clone(),
            config.audio.sample_rate,
            &config.vad,
        );

        let transcript = Transcript::new(
            config.conversation.system_prompt.clone(),
            config.conversation.max_history,
        );

        let mut driver = ConversationDriver::new(
            Box::new(source),
            sink,
            endpointer,
            Arc::new(Mutex::new(stt)),
            llm,
            tts,
            executor,
            transcript,
            state,
            frame_tx,
            config.conversation.max_tool_turns,
        );

        info!("assistant ready, start speaking");
        driver.run(cancel).await
    }
}
