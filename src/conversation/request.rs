use serde::Serialize;

use crate::conversation::{ConversationHistory, Message};
use crate::settings::ApiConfig;

/// Body of `POST {apiUrl}/chat/completions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: i64,
}

/// Assembles `[system prompt] + [last 2 x context_rounds history messages] +
/// [user message]`, keeping history order as-is.
pub fn build_messages(
    system_prompt: &str,
    history: &ConversationHistory,
    context_rounds: usize,
    user_message: &Message,
) -> Vec<Message> {
    let recent = history.recent(context_rounds.saturating_mul(2));
    let mut messages = Vec::with_capacity(recent.len() + 2);

    if !system_prompt.is_empty() {
        messages.push(Message::system(system_prompt));
    }
    messages.extend(recent.iter().cloned());
    messages.push(user_message.clone());
    messages
}

pub fn build_chat_request(
    api: &ApiConfig,
    history: &ConversationHistory,
    context_rounds: usize,
    user_message: &Message,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: api.model.clone(),
        messages: build_messages(&api.system_prompt, history, context_rounds, user_message),
        stream: true,
        temperature: api.temperature,
        max_tokens: api.max_tokens,
    }
}
