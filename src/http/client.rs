use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::constants::{
    API_CHAT_COMPLETIONS, API_MODELS, CONTENT_TYPE_JSON, LOG_PREFIX_ERROR, LOG_PREFIX_SUCCESS,
};
use crate::conversation::{ByteStream, ChatCompletionRequest, CompletionTransport};
use crate::error::{ChatError, extract_api_error_message};
use crate::http::error::map_reqwest_error;
use crate::logging::{log_payload, log_request, log_timed};
use crate::settings::ApiConfig;

/// Joins the configured base URL with an API endpoint.
pub fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), endpoint)
}

/// reqwest-backed transport for OpenAI-compatible chat APIs
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `connect_timeout` bounds connection setup only; an established
    /// stream is never timed out.
    pub fn new(connect_timeout: Option<Duration>) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60));
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            ChatError::invalid_request(format!("failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn probe(&self, api: &ApiConfig) -> Result<bool, ChatError> {
        let start_time = Instant::now();
        let url = endpoint_url(&api.api_url, API_MODELS);
        log_request("GET", &url, None);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&api.api_key)
            .header("Content-Type", CONTENT_TYPE_JSON)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let connected = status.is_success();
        log_timed(
            if connected {
                LOG_PREFIX_SUCCESS
            } else {
                LOG_PREFIX_ERROR
            },
            &format!("connectivity probe - HTTP {}", status.as_u16()),
            start_time,
        );
        Ok(connected)
    }

    async fn open_stream(
        &self,
        api: &ApiConfig,
        request: &ChatCompletionRequest,
    ) -> Result<ByteStream, ChatError> {
        let url = endpoint_url(&api.api_url, API_CHAT_COMPLETIONS);
        log_request("POST", &url, Some(&request.model));
        if let Ok(body) = serde_json::to_value(request) {
            log_payload(API_CHAT_COMPLETIONS, &body);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&api.api_key)
            .header("Content-Type", CONTENT_TYPE_JSON)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_api_error_message(status, &body);
            log::error!("chat completion rejected: HTTP {} {}", status.as_u16(), message);
            return Err(ChatError::status(status.as_u16(), message));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::stream_read(e.to_string())))
            .boxed())
    }
}
