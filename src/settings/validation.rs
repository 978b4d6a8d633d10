use crate::constants::{
    ERROR_HISTORY_RANGE, ERROR_INVALID_API_URL, ERROR_MAX_TOKENS_RANGE, ERROR_TEMPERATURE_RANGE,
    MAX_HISTORY_LENGTH_RANGE, MAX_TOKENS_RANGE, TEMPERATURE_RANGE,
};
use crate::settings::{SettingKey, Settings, SettingsError, Violation};

/// Resets every out-of-range field to its default and reports all of them
/// as one aggregated error. Valid fields are left untouched.
pub fn validate_settings(settings: &mut Settings) -> Result<(), SettingsError> {
    let defaults = Settings::default();
    let mut violations = Vec::new();

    if !settings.api_url.is_empty() && !is_valid_url(&settings.api_url) {
        violations.push(Violation {
            key: SettingKey::ApiUrl,
            message: ERROR_INVALID_API_URL,
        });
        settings.api_url = defaults.api_url;
    }

    let (temp_min, temp_max) = TEMPERATURE_RANGE;
    if !(temp_min..=temp_max).contains(&settings.temperature) {
        violations.push(Violation {
            key: SettingKey::Temperature,
            message: ERROR_TEMPERATURE_RANGE,
        });
        settings.temperature = defaults.temperature;
    }

    let (tokens_min, tokens_max) = MAX_TOKENS_RANGE;
    if !(tokens_min..=tokens_max).contains(&settings.max_tokens) {
        violations.push(Violation {
            key: SettingKey::MaxTokens,
            message: ERROR_MAX_TOKENS_RANGE,
        });
        settings.max_tokens = defaults.max_tokens;
    }

    let (history_min, history_max) = MAX_HISTORY_LENGTH_RANGE;
    if !(history_min..=history_max).contains(&settings.max_history_length) {
        violations.push(Violation {
            key: SettingKey::MaxHistoryLength,
            message: ERROR_HISTORY_RANGE,
        });
        settings.max_history_length = defaults.max_history_length;
    }

    if violations.is_empty() {
        Ok(())
    } else {
        log::warn!(
            "configuration validation errors: {}",
            violations
                .iter()
                .map(|v| v.key.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Err(SettingsError::Validation(violations))
    }
}

pub fn is_valid_url(candidate: &str) -> bool {
    url::Url::parse(candidate).is_ok()
}
