use thiserror::Error;

use crate::settings::SettingKey;
use crate::storage::StorageError;

/// One field that failed validation and was reset to its default
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub key: SettingKey,
    pub message: &'static str,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SettingsError {
    /// Fields were out of range and have been reset to their defaults
    #[error("configuration validation failed: {}", join_violations(.0))]
    Validation(Vec<Violation>),

    /// The configuration could not be written; memory still holds it
    #[error("failed to save configuration: {0}")]
    Persistence(#[from] StorageError),

    /// The stored record was unreadable; defaults are in use
    #[error("failed to load configuration, using defaults: {0}")]
    Load(String),

    /// The import payload was rejected; nothing changed
    #[error("configuration import failed: {0}")]
    ImportFormat(String),

    #[error("unknown setting '{0}'")]
    UnknownKey(String),

    #[error("setting '{key}' expects {expected}")]
    TypeMismatch {
        key: SettingKey,
        expected: &'static str,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialization(String),

    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: SettingKey, message: String },
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.message)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
impl SettingsError {
    pub fn violations(&self) -> &[Violation] {
        match self {
            SettingsError::Validation(violations) => violations,
            _ => &[],
        }
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, SettingsError::Persistence(_))
    }
}
