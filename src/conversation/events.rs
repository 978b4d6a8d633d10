use thiserror::Error;

use crate::error::ChatError;
use crate::streaming::StreamSummary;

/// Structured output of the engine, drained by the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TurnStarted {
        user_message: String,
    },
    Fragment {
        delta: String,
        accumulated: String,
    },
    Completed {
        reply: String,
        committed: bool,
        history_len: usize,
    },
    Failed {
        error: ChatError,
        partial: String,
    },
    ConnectionChanged {
        connected: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("message is empty")]
    EmptyMessage,
    #[error("not connected to the chat API")]
    NotConnected,
    #[error("a response is still in progress")]
    Busy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Nothing happened; history and any in-flight turn are untouched
    Rejected(Rejection),
    /// The exchange was appended to history
    Committed {
        reply: String,
        summary: StreamSummary,
    },
    /// The stream ended normally without any text; nothing was committed
    EmptyReply { summary: StreamSummary },
    /// The turn failed; `partial` holds text already emitted as fragments
    Failed { error: ChatError, partial: String },
}

#[cfg(test)]
impl TurnOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TurnOutcome::Committed { .. })
    }
}
