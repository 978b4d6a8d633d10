pub mod engine;
pub mod events;
pub mod history;
pub mod message;
pub mod request;
pub mod transport;

pub use engine::{ConversationEngine, EngineOptions, TurnPhase};
pub use events::{ChatEvent, Rejection, TurnOutcome};
pub use history::ConversationHistory;
pub use message::{Message, Role};
pub use request::{ChatCompletionRequest, build_chat_request};
pub use transport::{ByteStream, CompletionTransport};
