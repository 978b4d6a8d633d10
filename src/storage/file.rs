use std::path::{Path, PathBuf};

use crate::storage::{KeyValueStorage, StorageError};

/// Stores each key as `<dir>/<key>.json`, replacing files atomically.
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Result<Self, StorageError> {
        let dir = base_dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            StorageError::Unavailable(format!(
                "failed to create storage directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { base_dir: dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn validated_item_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.validated_item_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                key: key.to_string(),
                message: format!("{}: {}", path.display(), e),
            }),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.validated_item_path(key)?;
        let tmp_path = path.with_extension("tmp");

        std::fs::write(&tmp_path, value).map_err(|e| {
            if e.kind() == std::io::ErrorKind::StorageFull {
                StorageError::QuotaExceeded {
                    key: key.to_string(),
                }
            } else {
                StorageError::Write {
                    key: key.to_string(),
                    message: format!("{}: {}", tmp_path.display(), e),
                }
            }
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| StorageError::Write {
            key: key.to_string(),
            message: format!("failed to atomic write {}: {}", path.display(), e),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod file_storage_tests {
    use super::*;

    #[test]
    fn missing_key_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path()).expect("storage");
        assert_eq!(storage.get_item("ai-chat-config").expect("read"), None);
    }

    #[test]
    fn written_value_is_read_back_and_tmp_file_is_gone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("nested")).expect("storage");

        storage
            .set_item("ai-chat-config", r#"{"model":"deepseek-chat"}"#)
            .expect("write");

        assert_eq!(
            storage.get_item("ai-chat-config").expect("read").as_deref(),
            Some(r#"{"model":"deepseek-chat"}"#)
        );
        assert!(storage.base_dir().join("ai-chat-config.json").exists());
        assert!(!storage.base_dir().join("ai-chat-config.tmp").exists());
    }

    #[test]
    fn path_traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path()).expect("storage");

        assert_eq!(
            storage.set_item("../escape", "x"),
            Err(StorageError::InvalidKey("../escape".to_string()))
        );
        assert!(storage.get_item("").is_err());
    }
}
