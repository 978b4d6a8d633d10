use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tokio::sync::{RwLock, mpsc};

use crate::constants::{DEFAULT_CONTEXT_ROUNDS, LOG_PREFIX_ERROR, LOG_PREFIX_SUCCESS};
use crate::conversation::{
    ChatCompletionRequest, ChatEvent, CompletionTransport, ConversationHistory, Message,
    Rejection, TurnOutcome, build_chat_request,
};
use crate::error::ChatError;
use crate::logging::log_timed;
use crate::settings::{ApiConfig, SharedSettings};
use crate::streaming::read_completion_stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingResponse,
    Streaming,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Past exchanges replayed with each request (2 messages per round)
    pub context_rounds: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            context_rounds: DEFAULT_CONTEXT_ROUNDS,
        }
    }
}

struct EngineState {
    phase: TurnPhase,
    connected: bool,
    history: ConversationHistory,
}

/// Owns the conversation and runs one turn at a time.
///
/// State lives behind a lock that is released before every network await,
/// so a second `send_message` observes the in-flight phase and is rejected.
pub struct ConversationEngine {
    transport: Arc<dyn CompletionTransport>,
    settings: SharedSettings,
    options: EngineOptions,
    state: RwLock<EngineState>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl ConversationEngine {
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        settings: SharedSettings,
        options: EngineOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            transport,
            settings,
            options,
            state: RwLock::new(EngineState {
                phase: TurnPhase::Idle,
                connected: false,
                history: ConversationHistory::new(),
            }),
            events,
        };
        (engine, rx)
    }

    /// Checks the API with the current settings. Without an API key the
    /// engine is considered offline and no request is made.
    pub async fn probe_connection(&self) -> bool {
        let api = self.settings.read().await.api_config();

        let connected = if api.api_key.is_empty() {
            false
        } else {
            match self.transport.probe(&api).await {
                Ok(connected) => connected,
                Err(e) => {
                    log::warn!("connectivity probe failed: {}", e);
                    false
                }
            }
        };

        let changed = {
            let mut state = self.state.write().await;
            let changed = state.connected != connected;
            state.connected = connected;
            changed
        };
        if changed {
            self.emit(ChatEvent::ConnectionChanged { connected });
        }
        connected
    }

    pub async fn send_message(&self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Rejected(Rejection::EmptyMessage);
        }

        let (api, request, user_message) = {
            let mut state = self.state.write().await;
            if !state.connected {
                return TurnOutcome::Rejected(Rejection::NotConnected);
            }
            if state.phase != TurnPhase::Idle {
                log::debug!("send rejected, turn already {:?}", state.phase);
                return TurnOutcome::Rejected(Rejection::Busy);
            }

            let api = self.settings.read().await.api_config();
            let user_message = Message::user(text);
            let request = build_chat_request(
                &api,
                &state.history,
                self.options.context_rounds,
                &user_message,
            );
            state.phase = TurnPhase::AwaitingResponse;
            (api, request, user_message)
        };

        self.emit(ChatEvent::TurnStarted {
            user_message: text.to_string(),
        });
        self.run_turn(&api, &request, user_message).await
    }

    async fn run_turn(
        &self,
        api: &ApiConfig,
        request: &ChatCompletionRequest,
        user_message: Message,
    ) -> TurnOutcome {
        let start_time = Instant::now();

        let stream = match self.transport.open_stream(api, request).await {
            Ok(stream) => stream,
            Err(error) => return self.fail_turn(error, String::new(), start_time).await,
        };
        self.set_phase(TurnPhase::Streaming).await;

        let mut accumulator = String::new();
        let result = read_completion_stream(stream, |delta| {
            accumulator.push_str(delta);
            self.emit(ChatEvent::Fragment {
                delta: delta.to_string(),
                accumulated: accumulator.clone(),
            });
        })
        .await;

        let summary = match result {
            Ok(summary) => summary,
            Err(error) => return self.fail_turn(error, accumulator, start_time).await,
        };

        let (committed, history_len) = {
            let mut state = self.state.write().await;
            let committed = !accumulator.is_empty();
            if committed {
                let dropped = state.history.commit_turn(
                    user_message,
                    Message::assistant(accumulator.as_str()),
                    api.history_limit(),
                );
                if dropped > 0 {
                    log::debug!("history trimmed by {} messages", dropped);
                }
            }
            state.phase = TurnPhase::Idle;
            (committed, state.history.len())
        };

        log_timed(
            LOG_PREFIX_SUCCESS,
            &format!(
                "turn completed | {} chars | history {}",
                accumulator.chars().count(),
                history_len
            ),
            start_time,
        );
        self.emit(ChatEvent::Completed {
            reply: accumulator.clone(),
            committed,
            history_len,
        });

        if committed {
            TurnOutcome::Committed {
                reply: accumulator,
                summary,
            }
        } else {
            TurnOutcome::EmptyReply { summary }
        }
    }

    /// Returns to idle without touching history. Fragments already emitted
    /// stay with the presentation layer.
    async fn fail_turn(
        &self,
        error: ChatError,
        partial: String,
        start_time: Instant,
    ) -> TurnOutcome {
        self.set_phase(TurnPhase::Idle).await;
        log_timed(
            LOG_PREFIX_ERROR,
            &format!(
                "turn failed{}: {}",
                if error.is_stream_read() { " mid-stream" } else { "" },
                error
            ),
            start_time,
        );
        self.emit(ChatEvent::Failed {
            error: error.clone(),
            partial: partial.clone(),
        });
        TurnOutcome::Failed { error, partial }
    }

    async fn set_phase(&self, phase: TurnPhase) {
        self.state.write().await.phase = phase;
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    pub async fn phase(&self) -> TurnPhase {
        self.state.read().await.phase
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    #[cfg(test)]
    pub async fn history(&self) -> Vec<Message> {
        self.state.read().await.history.messages().to_vec()
    }

    pub async fn history_len(&self) -> usize {
        self.state.read().await.history.len()
    }

    pub async fn turn_count(&self) -> usize {
        self.state.read().await.history.turn_count()
    }

    pub async fn clear_history(&self) {
        self.state.write().await.history.clear();
        log::info!("conversation history cleared");
    }

    /// Markdown transcript of the history, `None` when there is nothing to
    /// export.
    pub async fn export_transcript(&self) -> Option<String> {
        let state = self.state.read().await;
        if state.history.is_empty() {
            return None;
        }
        Some(state.history.to_markdown(Local::now()))
    }
}
