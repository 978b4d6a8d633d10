use crate::constants::{ERROR_API_UNAVAILABLE, ERROR_TIMEOUT};
use crate::error::ChatError;

pub fn map_reqwest_error(err: reqwest::Error) -> ChatError {
    if err.is_connect() {
        ChatError::network(format!("{}: {}", ERROR_API_UNAVAILABLE, err))
    } else if err.is_timeout() {
        ChatError::network(ERROR_TIMEOUT)
    } else if err.is_builder() {
        ChatError::invalid_request(err.to_string())
    } else {
        log::error!("HTTP request failed: {}", err);
        ChatError::network(format!("request failed: {}", err))
    }
}
