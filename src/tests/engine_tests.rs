use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::conversation::{
    ByteStream, ChatCompletionRequest, ChatEvent, CompletionTransport, ConversationEngine,
    EngineOptions, Rejection, Role, TurnOutcome, TurnPhase,
};
use crate::error::ChatError;
use crate::settings::{ApiConfig, SettingKey, SettingValue, SettingsStore, SharedSettings};
use crate::storage::MemoryStorage;

/// Transport that replays queued responses and records every request.
struct ScriptedTransport {
    probe_result: Result<bool, ChatError>,
    responses: Mutex<VecDeque<Result<ByteStream, ChatError>>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
    probes: AtomicUsize,
}

impl ScriptedTransport {
    fn new(probe_result: Result<bool, ChatError>) -> Self {
        Self {
            probe_result,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
        }
    }

    fn push(&self, response: Result<ByteStream, ChatError>) {
        self.responses.lock().expect("lock").push_back(response);
    }

    fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn probe(&self, _api: &ApiConfig) -> Result<bool, ChatError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.probe_result.clone()
    }

    async fn open_stream(
        &self,
        _api: &ApiConfig,
        request: &ChatCompletionRequest,
    ) -> Result<ByteStream, ChatError> {
        self.requests.lock().expect("lock").push(request.clone());
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(ChatError::network("no scripted response")))
    }
}

fn delta_line(text: &str) -> Bytes {
    Bytes::from(format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    ))
}

fn sse_reply(fragments: &[&str]) -> Result<ByteStream, ChatError> {
    let mut chunks: Vec<Result<Bytes, ChatError>> =
        fragments.iter().map(|f| Ok(delta_line(f))).collect();
    chunks.push(Ok(Bytes::from_static(b"data: [DONE]\n\n")));
    Ok(stream::iter(chunks).boxed())
}

fn settings_with_key(key: &str) -> SharedSettings {
    let (mut store, _) = SettingsStore::load(Arc::new(MemoryStorage::new()));
    if !key.is_empty() {
        store.set(SettingKey::ApiKey, key).expect("types match");
    }
    store.into_shared()
}

fn build_engine(
    transport: Arc<ScriptedTransport>,
    settings: SharedSettings,
) -> (Arc<ConversationEngine>, mpsc::UnboundedReceiver<ChatEvent>) {
    let (engine, events) = ConversationEngine::new(transport, settings, EngineOptions::default());
    (Arc::new(engine), events)
}

async fn connected_engine() -> (
    Arc<ConversationEngine>,
    Arc<ScriptedTransport>,
    SharedSettings,
    mpsc::UnboundedReceiver<ChatEvent>,
) {
    let transport = Arc::new(ScriptedTransport::new(Ok(true)));
    let settings = settings_with_key("sk-test");
    let (engine, mut events) = build_engine(transport.clone(), settings.clone());
    assert!(engine.probe_connection().await);
    assert_eq!(events.try_recv(), Ok(ChatEvent::ConnectionChanged { connected: true }));
    (engine, transport, settings, events)
}

fn drain(events: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test]
async fn probe_without_api_key_skips_the_network() {
    let transport = Arc::new(ScriptedTransport::new(Ok(true)));
    let (engine, mut events) = build_engine(transport.clone(), settings_with_key(""));

    assert!(!engine.probe_connection().await);
    assert_eq!(transport.probes.load(Ordering::SeqCst), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn connection_change_is_reported_once() {
    let (engine, _transport, _settings, mut events) = connected_engine().await;
    assert!(engine.probe_connection().await);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn failed_probe_means_offline() {
    let transport = Arc::new(ScriptedTransport::new(Err(ChatError::network("refused"))));
    let (engine, _events) = build_engine(transport, settings_with_key("sk-test"));
    assert!(!engine.probe_connection().await);
    assert!(!engine.is_connected().await);
}

#[tokio::test]
async fn sends_are_rejected_when_empty_or_offline() {
    let transport = Arc::new(ScriptedTransport::new(Ok(true)));
    let (engine, mut events) = build_engine(transport.clone(), settings_with_key("sk-test"));

    assert_eq!(
        engine.send_message("   ").await,
        TurnOutcome::Rejected(Rejection::EmptyMessage)
    );
    assert_eq!(
        engine.send_message("hello").await,
        TurnOutcome::Rejected(Rejection::NotConnected)
    );
    assert!(transport.requests().is_empty());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn streamed_reply_is_committed() {
    let (engine, transport, _settings, mut events) = connected_engine().await;
    transport.push(sse_reply(&["A", "B"]));

    let outcome = engine.send_message("  hi  ").await;
    assert!(outcome.is_committed());

    assert_eq!(
        drain(&mut events),
        vec![
            ChatEvent::TurnStarted {
                user_message: "hi".to_string()
            },
            ChatEvent::Fragment {
                delta: "A".to_string(),
                accumulated: "A".to_string()
            },
            ChatEvent::Fragment {
                delta: "B".to_string(),
                accumulated: "AB".to_string()
            },
            ChatEvent::Completed {
                reply: "AB".to_string(),
                committed: true,
                history_len: 2
            },
        ]
    );

    let history = engine.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!((history[0].role(), history[0].content()), (Role::User, "hi"));
    assert_eq!((history[1].role(), history[1].content()), (Role::Assistant, "AB"));
    assert_eq!(engine.phase().await, TurnPhase::Idle);
}

#[tokio::test]
async fn empty_reply_is_not_committed() {
    let (engine, transport, _settings, mut events) = connected_engine().await;
    transport.push(sse_reply(&[]));

    let outcome = engine.send_message("hi").await;
    assert!(matches!(outcome, TurnOutcome::EmptyReply { .. }));
    assert_eq!(engine.history_len().await, 0);
    assert!(drain(&mut events).contains(&ChatEvent::Completed {
        reply: String::new(),
        committed: false,
        history_len: 0
    }));
}

#[tokio::test]
async fn rejected_request_leaves_history_untouched() {
    let (engine, transport, _settings, mut events) = connected_engine().await;
    transport.push(sse_reply(&["first"]));
    engine.send_message("one").await;
    transport.push(Err(ChatError::status(401, "Authentication Fails")));

    let outcome = engine.send_message("two").await;
    let (error, partial) = match outcome {
        TurnOutcome::Failed { error, partial } => (error, partial),
        other => panic!("expected a failed turn, got {:?}", other),
    };
    assert!(error.is_unauthorized());
    assert!(partial.is_empty());
    assert_eq!(engine.history_len().await, 2);
    assert_eq!(engine.phase().await, TurnPhase::Idle);
    assert!(matches!(drain(&mut events).last(), Some(ChatEvent::Failed { .. })));
}

#[tokio::test]
async fn stream_failure_keeps_partial_text_out_of_history() {
    let (engine, transport, _settings, _events) = connected_engine().await;
    let chunks: Vec<Result<Bytes, ChatError>> = vec![
        Ok(delta_line("partial")),
        Err(ChatError::stream_read("connection reset")),
    ];
    transport.push(Ok(stream::iter(chunks).boxed()));

    let outcome = engine.send_message("hi").await;
    assert_eq!(
        outcome,
        TurnOutcome::Failed {
            error: ChatError::stream_read("connection reset"),
            partial: "partial".to_string()
        }
    );
    assert_eq!(engine.history_len().await, 0);

    transport.push(sse_reply(&["recovered"]));
    assert!(engine.send_message("again").await.is_committed());
}

#[tokio::test]
async fn second_send_while_streaming_is_rejected() {
    let (engine, transport, settings, mut events) = connected_engine().await;
    let (body_tx, body_rx) = mpsc::unbounded_channel::<Result<Bytes, ChatError>>();
    transport.push(Ok(UnboundedReceiverStream::new(body_rx).boxed()));

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.send_message("first").await })
    };

    body_tx.send(Ok(delta_line("A"))).expect("body open");
    loop {
        match events.recv().await.expect("engine alive") {
            ChatEvent::Fragment { .. } => break,
            _ => continue,
        }
    }
    assert_eq!(engine.phase().await, TurnPhase::Streaming);

    assert_eq!(
        engine.send_message("second").await,
        TurnOutcome::Rejected(Rejection::Busy)
    );
    settings
        .write()
        .await
        .set(SettingKey::Model, "changed-mid-flight")
        .expect("types match");
    assert_eq!(engine.history_len().await, 0);

    body_tx.send(Ok(delta_line("B"))).expect("body open");
    body_tx
        .send(Ok(Bytes::from_static(b"data: [DONE]\n\n")))
        .expect("body open");
    drop(body_tx);

    let outcome = first.await.expect("task completes");
    assert_eq!(
        outcome,
        TurnOutcome::Committed {
            reply: "AB".to_string(),
            summary: crate::streaming::StreamSummary {
                fragment_count: 2,
                skipped_lines: 0,
                saw_done: true,
                finish_reason: None,
            }
        }
    );

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "deepseek-chat");
    assert_eq!(engine.history_len().await, 2);
}

#[tokio::test]
async fn earlier_exchanges_are_sent_as_context() {
    let (engine, transport, _settings, _events) = connected_engine().await;
    transport.push(sse_reply(&["one"]));
    transport.push(sse_reply(&["two"]));
    engine.send_message("first").await;
    engine.send_message("second").await;

    let requests = transport.requests();
    let last: Vec<(Role, &str)> = requests[1]
        .messages
        .iter()
        .map(|m| (m.role(), m.content()))
        .collect();
    assert_eq!(last.len(), 4);
    assert_eq!(last[0].0, Role::System);
    assert_eq!(
        &last[1..],
        &[
            (Role::User, "first"),
            (Role::Assistant, "one"),
            (Role::User, "second")
        ]
    );
    assert!(requests.iter().all(|r| r.stream));
}

#[tokio::test]
async fn history_is_bounded_by_max_history_length() {
    let (engine, transport, settings, _events) = connected_engine().await;
    settings
        .write()
        .await
        .set(SettingKey::MaxHistoryLength, SettingValue::Integer(2))
        .expect("types match");

    for i in 0..3 {
        transport.push(sse_reply(&["ok"]));
        engine.send_message(&format!("message {}", i)).await;
    }

    let history = engine.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content(), "message 2");
    assert_eq!(engine.turn_count().await, 1);
}

#[tokio::test]
async fn clear_and_export_transcript() {
    let (engine, transport, _settings, _events) = connected_engine().await;
    assert_eq!(engine.export_transcript().await, None);

    transport.push(sse_reply(&["pong"]));
    engine.send_message("ping").await;
    let transcript = engine.export_transcript().await.expect("has history");
    assert!(transcript.contains("**User:** ping"));
    assert!(transcript.contains("**AI:** pong"));

    engine.clear_history().await;
    assert_eq!(engine.history_len().await, 0);
}
