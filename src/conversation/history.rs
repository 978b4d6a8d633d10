use chrono::{DateTime, Local};

use crate::conversation::{Message, Role};

/// Ordered message history owned by the engine.
///
/// Trimming drops from the front but never leaves an assistant reply at the
/// head without the user message it answered.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Last `count` messages in order.
    pub fn recent(&self, count: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    /// Appends a finished user/assistant exchange, then trims to `limit`.
    /// Returns how many messages were dropped.
    pub fn commit_turn(&mut self, user: Message, assistant: Message, limit: usize) -> usize {
        self.messages.push(user);
        self.messages.push(assistant);
        self.trim_to(limit)
    }

    pub fn trim_to(&mut self, limit: usize) -> usize {
        let mut excess = self.messages.len().saturating_sub(limit);
        while self
            .messages
            .get(excess)
            .is_some_and(|m| m.role() == Role::Assistant)
        {
            excess += 1;
        }
        self.messages.drain(..excess);
        excess
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Number of complete user/assistant exchanges
    pub fn turn_count(&self) -> usize {
        self.exchanges().count()
    }

    fn exchanges(&self) -> impl Iterator<Item = (&Message, &Message)> {
        self.messages.windows(2).filter_map(|pair| {
            let (user, reply) = (&pair[0], &pair[1]);
            (user.role() == Role::User && reply.role() == Role::Assistant).then_some((user, reply))
        })
    }

    /// Renders the exchanges as a markdown transcript.
    pub fn to_markdown(&self, exported_at: DateTime<Local>) -> String {
        let mut out = String::from("# Conversation transcript\n\n");
        out.push_str(&format!(
            "Exported: {}\n\n---\n\n",
            exported_at.format("%Y-%m-%d %H:%M:%S")
        ));

        for (index, (user, reply)) in self.exchanges().enumerate() {
            out.push_str(&format!("## Exchange {}\n\n", index + 1));
            out.push_str(&format!("**User:** {}\n\n", user.content()));
            out.push_str(&format!("**AI:** {}\n\n", reply.content()));
            out.push_str("---\n\n");
        }
        out
    }
}
