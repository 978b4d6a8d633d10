use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_API_URL, DEFAULT_LANGUAGE, DEFAULT_MAX_HISTORY_LENGTH, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, DEFAULT_THEME,
};
use crate::settings::SettingsError;

/// User-editable configuration, persisted as a flat camelCase record.
///
/// Missing fields deserialize to their defaults, so a stored or imported
/// record is always merged over the default configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub system_prompt: String,
    pub theme: String,
    pub language: String,
    pub auto_save: bool,
    pub max_history_length: i64,
    pub stream_response: bool,
    pub show_timestamp: bool,
    pub enable_notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            theme: DEFAULT_THEME.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            auto_save: true,
            max_history_length: DEFAULT_MAX_HISTORY_LENGTH,
            stream_response: true,
            show_timestamp: true,
            enable_notifications: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ApiKey,
    ApiUrl,
    Model,
    Temperature,
    MaxTokens,
    SystemPrompt,
    Theme,
    Language,
    AutoSave,
    MaxHistoryLength,
    StreamResponse,
    ShowTimestamp,
    EnableNotifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Number,
    Integer,
    Flag,
}

impl ValueKind {
    fn describe(self) -> &'static str {
        match self {
            ValueKind::Text => "a string",
            ValueKind::Number => "a number",
            ValueKind::Integer => "an integer",
            ValueKind::Flag => "a boolean",
        }
    }
}

impl SettingKey {
    pub const ALL: [SettingKey; 13] = [
        SettingKey::ApiKey,
        SettingKey::ApiUrl,
        SettingKey::Model,
        SettingKey::Temperature,
        SettingKey::MaxTokens,
        SettingKey::SystemPrompt,
        SettingKey::Theme,
        SettingKey::Language,
        SettingKey::AutoSave,
        SettingKey::MaxHistoryLength,
        SettingKey::StreamResponse,
        SettingKey::ShowTimestamp,
        SettingKey::EnableNotifications,
    ];

    /// Name used in the persisted record and in exports
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::ApiKey => "apiKey",
            SettingKey::ApiUrl => "apiUrl",
            SettingKey::Model => "model",
            SettingKey::Temperature => "temperature",
            SettingKey::MaxTokens => "maxTokens",
            SettingKey::SystemPrompt => "systemPrompt",
            SettingKey::Theme => "theme",
            SettingKey::Language => "language",
            SettingKey::AutoSave => "autoSave",
            SettingKey::MaxHistoryLength => "maxHistoryLength",
            SettingKey::StreamResponse => "streamResponse",
            SettingKey::ShowTimestamp => "showTimestamp",
            SettingKey::EnableNotifications => "enableNotifications",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            SettingKey::ApiKey
            | SettingKey::ApiUrl
            | SettingKey::Model
            | SettingKey::SystemPrompt
            | SettingKey::Theme
            | SettingKey::Language => ValueKind::Text,
            SettingKey::Temperature => ValueKind::Number,
            SettingKey::MaxTokens | SettingKey::MaxHistoryLength => ValueKind::Integer,
            SettingKey::AutoSave
            | SettingKey::StreamResponse
            | SettingKey::ShowTimestamp
            | SettingKey::EnableNotifications => ValueKind::Flag,
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(self, SettingKey::ApiKey)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    /// Accepts the camelCase record name as well as snake_case and
    /// kebab-case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str().to_lowercase() == normalized)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl SettingValue {
    /// Parses user-typed text into the value type `key` expects.
    pub fn parse_for(key: SettingKey, raw: &str) -> Result<Self, SettingsError> {
        let trimmed = raw.trim();
        let mismatch = || SettingsError::TypeMismatch {
            key,
            expected: key.kind().describe(),
        };
        match key.kind() {
            ValueKind::Text => Ok(SettingValue::Text(raw.to_string())),
            ValueKind::Number => trimmed
                .parse::<f64>()
                .map(SettingValue::Number)
                .map_err(|_| mismatch()),
            ValueKind::Integer => trimmed
                .parse::<i64>()
                .map(SettingValue::Integer)
                .map_err(|_| mismatch()),
            ValueKind::Flag => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Ok(SettingValue::Flag(true)),
                "false" | "off" | "no" | "0" => Ok(SettingValue::Flag(false)),
                _ => Err(mismatch()),
            },
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Flag(b) => write!(f, "{}", b),
            SettingValue::Integer(i) => write!(f, "{}", i),
            SettingValue::Number(n) => write!(f, "{}", n),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Text(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        SettingValue::Number(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Integer(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Flag(value)
    }
}

impl Settings {
    pub fn get(&self, key: SettingKey) -> SettingValue {
        match key {
            SettingKey::ApiKey => self.api_key.clone().into(),
            SettingKey::ApiUrl => self.api_url.clone().into(),
            SettingKey::Model => self.model.clone().into(),
            SettingKey::Temperature => self.temperature.into(),
            SettingKey::MaxTokens => self.max_tokens.into(),
            SettingKey::SystemPrompt => self.system_prompt.clone().into(),
            SettingKey::Theme => self.theme.clone().into(),
            SettingKey::Language => self.language.clone().into(),
            SettingKey::AutoSave => self.auto_save.into(),
            SettingKey::MaxHistoryLength => self.max_history_length.into(),
            SettingKey::StreamResponse => self.stream_response.into(),
            SettingKey::ShowTimestamp => self.show_timestamp.into(),
            SettingKey::EnableNotifications => self.enable_notifications.into(),
        }
    }

    /// Stores `value` under `key` without range validation. Integers are
    /// accepted for number fields and whole numbers for integer fields.
    pub fn apply(&mut self, key: SettingKey, value: SettingValue) -> Result<(), SettingsError> {
        let mismatch = SettingsError::TypeMismatch {
            key,
            expected: key.kind().describe(),
        };
        match (key.kind(), value) {
            (ValueKind::Text, SettingValue::Text(text)) => {
                let slot = match key {
                    SettingKey::ApiKey => &mut self.api_key,
                    SettingKey::ApiUrl => &mut self.api_url,
                    SettingKey::Model => &mut self.model,
                    SettingKey::SystemPrompt => &mut self.system_prompt,
                    SettingKey::Theme => &mut self.theme,
                    SettingKey::Language => &mut self.language,
                    _ => return Err(mismatch),
                };
                *slot = text;
            }
            (ValueKind::Number, SettingValue::Number(n)) => self.temperature = n,
            (ValueKind::Number, SettingValue::Integer(i)) => self.temperature = i as f64,
            (ValueKind::Integer, value @ (SettingValue::Integer(_) | SettingValue::Number(_))) => {
                let int = match value {
                    SettingValue::Integer(i) => i,
                    SettingValue::Number(n) if n.fract() == 0.0 && n.is_finite() => n as i64,
                    _ => return Err(mismatch),
                };
                match key {
                    SettingKey::MaxTokens => self.max_tokens = int,
                    SettingKey::MaxHistoryLength => self.max_history_length = int,
                    _ => return Err(mismatch),
                }
            }
            (ValueKind::Flag, SettingValue::Flag(flag)) => {
                let slot = match key {
                    SettingKey::AutoSave => &mut self.auto_save,
                    SettingKey::StreamResponse => &mut self.stream_response,
                    SettingKey::ShowTimestamp => &mut self.show_timestamp,
                    SettingKey::EnableNotifications => &mut self.enable_notifications,
                    _ => return Err(mismatch),
                };
                *slot = flag;
            }
            _ => return Err(mismatch),
        }
        Ok(())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            api_key: self.api_key.clone(),
            api_url: self.api_url.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            system_prompt: self.system_prompt.clone(),
            stream_response: self.stream_response,
            max_history_length: self.max_history_length,
        }
    }
}

/// Settings captured when a request is built. Edits made while the request
/// is in flight never reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub system_prompt: String,
    pub stream_response: bool,
    pub max_history_length: i64,
}

impl ApiConfig {
    pub fn history_limit(&self) -> usize {
        usize::try_from(self.max_history_length).unwrap_or(0)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Settings::default().api_config()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Development => f.write_str("development"),
            Mode::Production => f.write_str("production"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Stream,
    Notifications,
    Timestamp,
    AutoSave,
}
