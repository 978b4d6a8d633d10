use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::conversation::ChatCompletionRequest;
use crate::error::ChatError;
use crate::settings::ApiConfig;

/// Raw response body chunks; a failed read surfaces as `ChatError::StreamRead`.
pub type ByteStream = BoxStream<'static, Result<bytes::Bytes, ChatError>>;

/// Network seam between the engine and the completion API.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// `GET {apiUrl}/models`; `Ok(true)` for any success status.
    async fn probe(&self, api: &ApiConfig) -> Result<bool, ChatError>;

    /// `POST {apiUrl}/chat/completions` with `stream: true`. Non-success
    /// statuses are errors; on success the body is handed back unread.
    async fn open_stream(
        &self,
        api: &ApiConfig,
        request: &ChatCompletionRequest,
    ) -> Result<ByteStream, ChatError>;
}
