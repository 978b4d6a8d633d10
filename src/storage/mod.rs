pub mod file;
pub mod memory;

use std::path::PathBuf;

use thiserror::Error;

use crate::constants::APP_DIR_NAME;

pub use file::FileStorage;
pub use memory::MemoryStorage;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read '{key}': {message}")]
    Read { key: String, message: String },

    #[error("failed to write '{key}': {message}")]
    Write { key: String, message: String },

    #[error("storage quota exceeded while writing '{key}'")]
    QuotaExceeded { key: String },
}

/// Flat string key-value area, the local equivalent of a browser's
/// per-origin storage.
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Resolves the per-user directory holding persisted settings.
pub fn default_storage_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config).join(APP_DIR_NAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join(APP_DIR_NAME);
    }

    std::env::temp_dir().join(APP_DIR_NAME)
}
