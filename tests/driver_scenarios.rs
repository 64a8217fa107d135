//! End-to-end conversation driver scenarios with mock components.
//!
//! No audio hardware, network, or models: the audio source, transcriber,
//! LLM, synthesizer, and sink are all scripted doubles wired through the
//! real endpointer, transcript, executor, and driver.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use bytes::Bytes;
use malone::audio::{AudioSink, AudioSource, FrameSink};
use malone::config::VadConfig;
use malone::conversation::Transcript;
use malone::error::{AssistantError, Result};
use malone::llm::{ChatMessage, LlmClient, LlmResponse, Role, ToolCall, ToolDefinition};
use malone::pipeline::{ConversationDriver, DriverState, Endpointer, StateHandle};
use malone::stt::Transcriber;
use malone::tools::{Tool, ToolExecutor, ToolRegistry};
use malone::tts::Synthesizer;
use malone::vad::VoiceDetector;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SAMPLE_RATE: u32 = 16_000;
const FRAME_BYTES: usize = 480 * 2;

// ── Mock components ───────────────────────────────────────────

/// Audio source double: records stop, delivers nothing itself (tests push
/// frames straight into the queue).
#[derive(Default)]
struct MockSource {
    stopped: Arc<AtomicBool>,
}

impl AudioSource for MockSource {
    fn start(&mut self, _sink: FrameSink) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Detector scripted by the first byte of each frame: nonzero = speech.
struct MarkerVad;

impl VoiceDetector for MarkerVad {
    fn is_speech(&mut self, frame: &[u8], _sample_rate: u32) -> bool {
        frame.first().copied().unwrap_or(0) != 0
    }
    fn reset(&mut self) {}
}

/// Transcriber double returning a fixed text for every utterance.
struct MockTranscriber {
    text: String,
    calls: Arc<AtomicUsize>,
}

impl Transcriber for MockTranscriber {
    fn transcribe(&mut self, _pcm: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Per-call record of what the LLM double received.
struct LlmCall {
    messages: Vec<ChatMessage>,
    tool_names: Vec<String>,
}

/// LLM double serving scripted responses in order; repeats the last one
/// when the script runs out.
struct ScriptedLlm {
    script: Mutex<VecDeque<LlmResponse>>,
    repeat_last: Option<LlmResponse>,
    calls: Arc<Mutex<Vec<LlmCall>>>,
}

impl ScriptedLlm {
    fn new(script: Vec<LlmResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            repeat_last: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// An LLM that answers every call with the same response.
    fn repeating(response: LlmResponse) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            repeat_last: Some(response),
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        self.calls.lock().unwrap().push(LlmCall {
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });
        if let Some(response) = self.script.lock().unwrap().pop_front() {
            return Ok(response);
        }
        self.repeat_last
            .clone()
            .ok_or_else(|| AssistantError::Llm("script exhausted".into()))
    }
}

/// Synthesizer double recording synthesized texts.
struct MockTts {
    texts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Synthesizer for MockTts {
    fn sample_rate(&self) -> u32 {
        24_000
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        self.texts.lock().unwrap().push(text.to_owned());
        Ok(Bytes::from_static(&[0u8; 64]))
    }
}

/// Sink double recording played clips.
#[derive(Default)]
struct MockSink {
    played: Arc<Mutex<Vec<Bytes>>>,
}

#[async_trait]
impl AudioSink for MockSink {
    async fn play(&self, pcm: Bytes) -> Result<()> {
        self.played.lock().unwrap().push(pcm);
        Ok(())
    }
}

/// Tool double counting invocations.
struct CountingTool {
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        "toggle"
    }
    fn description(&self) -> &str {
        "Toggle a device"
    }
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        })
    }
    async fn execute(&self, _args: serde_json::Value) -> Result<String> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok("OK".to_owned())
    }
}

// ── Harness ───────────────────────────────────────────────────

/// Shared observation handles for one driver under test.
struct Harness {
    frame_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    state: StateHandle,
    source_stopped: Arc<AtomicBool>,
    stt_calls: Arc<AtomicUsize>,
    tts_texts: Arc<Mutex<Vec<String>>>,
    sink_played: Arc<Mutex<Vec<Bytes>>>,
    tool_invocations: Arc<AtomicUsize>,
    driver: tokio::task::JoinHandle<(Result<()>, Vec<ChatMessage>)>,
}

impl Harness {
    fn spawn(transcribed: &str, llm: Arc<ScriptedLlm>, max_tool_turns: usize) -> Self {
        let source = MockSource::default();
        let source_stopped = Arc::clone(&source.stopped);

        let stt_calls = Arc::new(AtomicUsize::new(0));
        let transcriber = MockTranscriber {
            text: transcribed.to_owned(),
            calls: Arc::clone(&stt_calls),
        };

        let tts_texts = Arc::new(Mutex::new(Vec::new()));
        let tts = MockTts {
            texts: Arc::clone(&tts_texts),
        };

        let sink = MockSink::default();
        let sink_played = Arc::clone(&sink.played);

        let tool_invocations = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(CountingTool {
                invocations: Arc::clone(&tool_invocations),
            }))
            .unwrap();
        let executor = ToolExecutor::new(Arc::new(registry));

        let state = StateHandle::new();
        let (frame_tx, frame_rx) = mpsc::channel(200);
        let endpointer = Endpointer::new(
            frame_rx,
            Box::new(MarkerVad),
            state.clone(),
            SAMPLE_RATE,
            &VadConfig::default(),
        );

        let transcript = Transcript::new("You are Malone.", 50);
        let cancel = CancellationToken::new();

        let mut driver = ConversationDriver::new(
            Box::new(source),
            Arc::new(sink),
            endpointer,
            Arc::new(Mutex::new(transcriber)),
            llm.clone(),
            Arc::new(tts),
            executor,
            transcript,
            state.clone(),
            frame_tx.clone(),
            max_tool_turns,
        );

        let driver_cancel = cancel.clone();
        let driver = tokio::spawn(async move {
            let result = driver.run(driver_cancel).await;
            (result, driver.transcript().snapshot())
        });

        Self {
            frame_tx,
            cancel,
            state,
            source_stopped,
            stt_calls,
            tts_texts,
            sink_played,
            tool_invocations,
            driver,
        }
    }

    /// Push one spoken utterance: speech frames then the silence tail.
    async fn speak_utterance(&self) {
        for _ in 0..20 {
            self.frame_tx
                .send(Bytes::from(vec![1u8; FRAME_BYTES]))
                .await
                .unwrap();
        }
        for _ in 0..30 {
            self.frame_tx
                .send(Bytes::from(vec![0u8; FRAME_BYTES]))
                .await
                .unwrap();
        }
    }

    /// Wait until `predicate` holds or a 5s deadline passes.
    async fn wait_for(&self, predicate: impl Fn(&Self) -> bool) {
        for _ in 0..500 {
            if predicate(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within deadline");
    }

    /// Cancel the driver and return its result and final transcript.
    async fn shutdown(self) -> (Result<()>, Vec<ChatMessage>) {
        self.cancel.cancel();
        self.driver.await.unwrap()
    }
}

fn text_reply(content: &str) -> LlmResponse {
    LlmResponse {
        content: content.to_owned(),
        tool_calls: Vec::new(),
    }
}

fn tool_reply(id: &str) -> LlmResponse {
    LlmResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: id.to_owned(),
            name: "toggle".to_owned(),
            arguments: serde_json::json!({"id": "lamp"}),
        }],
    }
}

// ── Scenarios ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn simple_question_and_answer() {
    let llm = ScriptedLlm::new(vec![text_reply("It is noon.")]);
    let harness = Harness::spawn("what time is it", llm.clone(), 8);

    harness.speak_utterance().await;
    harness
        .wait_for(|h| !h.sink_played.lock().unwrap().is_empty())
        .await;

    let (result, transcript) = harness.shutdown().await;
    result.unwrap();

    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[0].role, Role::System);
    assert_eq!(transcript[1].role, Role::User);
    assert_eq!(transcript[1].text_content(), "what time is it");
    assert_eq!(transcript[2].role, Role::Assistant);
    assert_eq!(transcript[2].text_content(), "It is noon.");

    assert_eq!(llm.call_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn reply_is_synthesized_and_played_once() {
    let llm = ScriptedLlm::new(vec![text_reply("It is noon.")]);
    let harness = Harness::spawn("what time is it", llm, 8);

    harness.speak_utterance().await;
    harness
        .wait_for(|h| !h.sink_played.lock().unwrap().is_empty())
        .await;
    // Give the turn a moment to make any extra (wrong) calls visible.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        harness.tts_texts.lock().unwrap().as_slice(),
        ["It is noon."]
    );
    assert_eq!(harness.sink_played.lock().unwrap().len(), 1);

    harness.shutdown().await.0.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn single_tool_round() {
    let llm = ScriptedLlm::new(vec![tool_reply("t1"), text_reply("Done.")]);
    let harness = Harness::spawn("turn on the lamp", llm.clone(), 8);

    harness.speak_utterance().await;
    harness
        .wait_for(|h| !h.sink_played.lock().unwrap().is_empty())
        .await;

    let tool_invocations = Arc::clone(&harness.tool_invocations);
    let (result, transcript) = harness.shutdown().await;
    result.unwrap();

    assert_eq!(llm.call_count(), 2);
    assert_eq!(tool_invocations.load(Ordering::SeqCst), 1);

    // [system, user, assistant(tool_calls), tool_result, assistant].
    assert_eq!(transcript.len(), 5);
    assert_eq!(transcript[2].tool_calls[0].id, "t1");
    let malone::llm::MessageContent::ToolResult { call_id, content } = &transcript[3].content
    else {
        panic!("expected a tool result at index 3");
    };
    assert_eq!(call_id, "t1");
    assert_eq!(content, "OK");
    assert_eq!(transcript[4].text_content(), "Done.");
}

#[tokio::test(flavor = "multi_thread")]
async fn tools_are_passed_to_every_llm_call() {
    let llm = ScriptedLlm::new(vec![tool_reply("t1"), text_reply("Done.")]);
    let harness = Harness::spawn("turn on the lamp", llm.clone(), 8);

    harness.speak_utterance().await;
    harness
        .wait_for(|h| !h.sink_played.lock().unwrap().is_empty())
        .await;
    harness.shutdown().await.0.unwrap();

    let calls = llm.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    for call in calls.iter() {
        assert_eq!(call.tool_names, ["toggle"]);
        // Snapshot always leads with the system prompt.
        assert_eq!(call.messages[0].role, Role::System);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_transcription_is_dropped() {
    let llm = ScriptedLlm::new(vec![text_reply("unused")]);
    let harness = Harness::spawn("", llm.clone(), 8);

    harness.speak_utterance().await;
    harness
        .wait_for(|h| h.stt_calls.load(Ordering::SeqCst) >= 1)
        .await;
    // Let the driver finish the (empty) turn.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(llm.call_count(), 0);
    assert!(harness.sink_played.lock().unwrap().is_empty());
    assert_eq!(harness.state.get(), DriverState::Idle);

    let (result, transcript) = harness.shutdown().await;
    result.unwrap();
    assert_eq!(transcript.len(), 1, "nothing but the system prompt");
}

#[tokio::test(flavor = "multi_thread")]
async fn tool_loop_is_bounded() {
    let llm = ScriptedLlm::repeating(tool_reply("t-again"));
    let harness = Harness::spawn("keep toggling", llm.clone(), 8);

    harness.speak_utterance().await;
    harness
        .wait_for(|h| !h.sink_played.lock().unwrap().is_empty())
        .await;

    let tool_invocations = Arc::clone(&harness.tool_invocations);
    let tts_texts = Arc::clone(&harness.tts_texts);
    let (result, transcript) = harness.shutdown().await;
    result.unwrap();

    assert_eq!(tool_invocations.load(Ordering::SeqCst), 8);
    assert_eq!(llm.call_count(), 8);
    assert_eq!(
        tts_texts.lock().unwrap().as_slice(),
        ["(tool loop exceeded)"]
    );
    // The canned reply lands in the transcript as the final assistant text.
    let last = transcript.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.text_content(), "(tool loop exceeded)");
}

#[tokio::test(flavor = "multi_thread")]
async fn two_turns_accumulate_in_order() {
    let llm = ScriptedLlm::new(vec![text_reply("First."), text_reply("Second.")]);
    let harness = Harness::spawn("hello", llm.clone(), 8);

    harness.speak_utterance().await;
    harness
        .wait_for(|h| h.sink_played.lock().unwrap().len() == 1)
        .await;
    // Outlast the echo guard before the next utterance.
    tokio::time::sleep(Duration::from_millis(600)).await;
    harness.speak_utterance().await;
    harness
        .wait_for(|h| h.sink_played.lock().unwrap().len() == 2)
        .await;

    let (result, transcript) = harness.shutdown().await;
    result.unwrap();

    let texts: Vec<&str> = transcript.iter().map(ChatMessage::text_content).collect();
    assert_eq!(
        texts,
        ["You are Malone.", "hello", "First.", "hello", "Second."]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_stops_the_audio_source() {
    let llm = ScriptedLlm::new(vec![]);
    let harness = Harness::spawn("unused", llm, 8);

    // Cancel while idle, mid-listening would behave the same: the source
    // must be stopped by the time run() resolves.
    let stopped = Arc::clone(&harness.source_stopped);
    let (result, _) = harness.shutdown().await;
    result.unwrap();
    assert!(stopped.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_mid_turn_stops_the_source() {
    // An LLM that never resolves keeps the driver in PROCESSING.
    struct StuckLlm;

    #[async_trait]
    impl LlmClient for StuckLlm {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<LlmResponse> {
            std::future::pending().await
        }
    }

    let source = MockSource::default();
    let stopped = Arc::clone(&source.stopped);
    let state = StateHandle::new();
    let (frame_tx, frame_rx) = mpsc::channel(200);
    let endpointer = Endpointer::new(
        frame_rx,
        Box::new(MarkerVad),
        state.clone(),
        SAMPLE_RATE,
        &VadConfig::default(),
    );
    let stt_calls = Arc::new(AtomicUsize::new(0));
    let mut driver = ConversationDriver::new(
        Box::new(source),
        Arc::new(MockSink::default()),
        endpointer,
        Arc::new(Mutex::new(MockTranscriber {
            text: "hang on this".to_owned(),
            calls: Arc::clone(&stt_calls),
        })),
        Arc::new(StuckLlm),
        Arc::new(MockTts {
            texts: Arc::new(Mutex::new(Vec::new())),
        }),
        ToolExecutor::new(Arc::new(ToolRegistry::new())),
        Transcript::new("sys", 50),
        state.clone(),
        frame_tx.clone(),
        8,
    );

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { driver.run(run_cancel).await });

    for _ in 0..20 {
        frame_tx.send(Bytes::from(vec![1u8; FRAME_BYTES])).await.unwrap();
    }
    for _ in 0..30 {
        frame_tx.send(Bytes::from(vec![0u8; FRAME_BYTES])).await.unwrap();
    }
    // Wait until the turn is stuck inside the LLM call.
    for _ in 0..500 {
        if stt_calls.load(Ordering::SeqCst) >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert!(stopped.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread")]
async fn tts_failure_does_not_kill_the_driver() {
    struct BrokenTts;

    #[async_trait]
    impl Synthesizer for BrokenTts {
        fn sample_rate(&self) -> u32 {
            24_000
        }
        async fn synthesize(&self, _text: &str) -> Result<Bytes> {
            Err(AssistantError::Tts("synthesis backend down".into()))
        }
    }

    let source = MockSource::default();
    let state = StateHandle::new();
    let (frame_tx, frame_rx) = mpsc::channel(200);
    let endpointer = Endpointer::new(
        frame_rx,
        Box::new(MarkerVad),
        state.clone(),
        SAMPLE_RATE,
        &VadConfig::default(),
    );
    let stt_calls = Arc::new(AtomicUsize::new(0));
    let llm = ScriptedLlm::new(vec![text_reply("First."), text_reply("Second.")]);
    let mut driver = ConversationDriver::new(
        Box::new(source),
        Arc::new(MockSink::default()),
        endpointer,
        Arc::new(Mutex::new(MockTranscriber {
            text: "hello".to_owned(),
            calls: Arc::clone(&stt_calls),
        })),
        llm.clone(),
        Arc::new(BrokenTts),
        ToolExecutor::new(Arc::new(ToolRegistry::new())),
        Transcript::new("sys", 50),
        state.clone(),
        frame_tx.clone(),
        8,
    );

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { driver.run(run_cancel).await });

    // Two utterances: the second proves the driver survived the first
    // turn's TTS failure.
    for turn in 0..2 {
        for _ in 0..20 {
            frame_tx.send(Bytes::from(vec![1u8; FRAME_BYTES])).await.unwrap();
        }
        for _ in 0..30 {
            frame_tx.send(Bytes::from(vec![0u8; FRAME_BYTES])).await.unwrap();
        }
        for _ in 0..500 {
            if llm.call_count() > turn {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(600)).await;
    }

    assert_eq!(llm.call_count(), 2);
    cancel.cancel();
    handle.await.unwrap().unwrap();
}
