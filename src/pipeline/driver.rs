//! The conversation driver: the top-level state machine that couples
//! capture, endpointing, transcription, LLM/tool orchestration, synthesis,
//! and echo-suppressed playback.
//!
//! One turn: endpoint an utterance, transcribe it off-thread, run the
//! LLM/tool sub-loop against the shared transcript, speak the reply, then
//! hold the echo guard before listening again. TTS and playback failures
//! are recoverable; LLM failures (after router fallback) terminate the
//! driver.

use crate::audio::{AudioSink, AudioSource, FrameSink};
use crate::conversation::Transcript;
use crate::error::{AssistantError, Result};
use crate::llm::{LlmClient, LlmResponse};
use crate::pipeline::endpointer::Endpointer;
use crate::pipeline::{DriverState, StateHandle};
use crate::stt::Transcriber;
use crate::tools::ToolExecutor;
use crate::tts::Synthesizer;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Assistant reply used when the tool sub-loop hits its bound.
const TOOL_LOOP_EXCEEDED: &str = "(tool loop exceeded)";

/// Settle time after playback before listening resumes.
const ECHO_SETTLE: Duration = Duration::from_millis(500);

/// Everything the driver needs, constructed once at startup.
pub struct ConversationDriver {
    source: Box<dyn AudioSource>,
    sink: Arc<dyn AudioSink>,
    endpointer: Endpointer,
    transcriber: Arc<Mutex<dyn Transcriber>>,
    llm: Arc<dyn LlmClient>,
    tts: Arc<dyn Synthesizer>,
    executor: ToolExecutor,
    transcript: Transcript,
    state: StateHandle,
    frame_sink: FrameSink,
    max_tool_turns: usize,
}

impl ConversationDriver {
    /// Wire up a driver. `frame_sink` is the sender side of the queue the
    /// endpointer reads; it is handed to the audio source on start.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn AudioSource>,
        sink: Arc<dyn AudioSink>,
        endpointer: Endpointer,
        transcriber: Arc<Mutex<dyn Transcriber>>,
        llm: Arc<dyn LlmClient>,
        tts: Arc<dyn Synthesizer>,
        executor: ToolExecutor,
        transcript: Transcript,
        state: StateHandle,
        frame_sink: FrameSink,
        max_tool_turns: usize,
    ) -> Self {
        Self {
            source,
            sink,
            endpointer,
            transcriber,
            llm,
            tts,
            executor,
            transcript,
            state,
            frame_sink,
            max_tool_turns,
        }
    }

    /// The shared conversation transcript.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Run the conversation loop until cancelled.
    ///
    /// The audio source is stopped on every exit path, including
    /// cancellation and errors.
    ///
    /// # Errors
    ///
    /// Returns an error if a non-recoverable stage fails (audio capture
    /// setup, frame queue closure, or an LLM failure that survived router
    /// fallback).
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        self.source.start(self.frame_sink.clone())?;
        self.state.set(DriverState::Idle);

        let result = {
            let looped = self.conversation_loop();
            tokio::pin!(looped);
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("conversation driver cancelled");
                    Ok(())
                }
                res = &mut looped => res,
            }
        };

        self.source.stop();
        result
    }

    async fn conversation_loop(&mut self) -> Result<()> {
        loop {
            self.state.set(DriverState::Idle);
            let utterance = self.endpointer.next_utterance().await?;
            self.state.set(DriverState::Processing);

            let Some(text) = self.transcribe(utterance).await? else {
                // Unintelligible audio: silently return to listening.
                continue;
            };

            println!("\n  You: {text}");
            self.transcript.append_user(&text)?;

            let reply = self.think().await?;
            println!("  Malone: {reply}");

            self.state.set(DriverState::Speaking);
            self.speak(&reply).await;

            // Echo guard: drop anything captured during playback, let the
            // room settle, and start the next utterance from clean state.
            self.endpointer.drain();
            tokio::time::sleep(ECHO_SETTLE).await;
            self.endpointer.reset_vad();
        }
    }

    /// Transcribe an utterance on the blocking pool. Returns `None` for
    /// unintelligible (empty) results.
    async fn transcribe(&self, utterance: Bytes) -> Result<Option<String>> {
        let transcriber = Arc::clone(&self.transcriber);
        let text = task::spawn_blocking(move || {
            let mut transcriber = transcriber
                .lock()
                .map_err(|e| AssistantError::Stt(format!("transcriber lock poisoned: {e}")))?;
            transcriber.transcribe(&utterance)
        })
        .await
        .map_err(|e| AssistantError::Stt(format!("transcription task failed: {e}")))??;

        let text = text.trim().to_owned();
        if text.is_empty() {
            debug!("empty transcription, ignoring");
            return Ok(None);
        }
        Ok(Some(text))
    }

    /// The LLM/tool sub-loop: chat until the model answers without tool
    /// calls, executing requested tools sequentially in model order.
    /// Bounded by `max_tool_turns` round-trips.
    async fn think(&mut self) -> Result<String> {
        let schemas = self.executor.schemas();

        for _ in 0..self.max_tool_turns {
            let response = self
                .llm
                .chat(&self.transcript.snapshot(), &schemas)
                .await?;

            if response.tool_calls.is_empty() {
                self.transcript.append_assistant_text(&response.content);
                return Ok(response.content);
            }

            self.run_tool_calls(&response).await;
        }

        warn!("tool loop bound reached after {} turns", self.max_tool_turns);
        self.transcript.append_assistant_text(TOOL_LOOP_EXCEEDED);
        Ok(TOOL_LOOP_EXCEEDED.to_owned())
    }

    /// Execute one response's tool calls sequentially, recording each
    /// result against its call id. Tool errors come back as result
    /// strings and never abort the turn.
    async fn run_tool_calls(&mut self, response: &LlmResponse) {
        self.transcript.append_assistant_tool_calls(response);
        for call in &response.tool_calls {
            info!("tool call: {}({})", call.name, call.arguments);
            let result = self
                .executor
                .invoke(&call.name, call.arguments.clone())
                .await;
            self.transcript.append_tool_result(&call.id, &result);
        }
    }

    /// Synthesize and play the reply. Failures are logged, never fatal.
    async fn speak(&self, reply: &str) {
        if reply.trim().is_empty() {
            debug!("empty reply, skipping synthesis");
            return;
        }

        match self.tts.synthesize(reply).await {
            Ok(audio) => {
                if let Err(e) = self.sink.play(audio).await {
                    warn!("[error playing reply: {e}]");
                }
            }
            Err(e) => warn!("[error synthesizing reply: {e}]"),
        }
    }
}
