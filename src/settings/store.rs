use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::constants::{
    ERROR_INVALID_IMPORT, SETTINGS_EXPORT_VERSION, SETTINGS_STORAGE_KEY, SUPPORTED_THEMES,
};
use crate::settings::validation::validate_settings;
use crate::settings::{
    ApiConfig, Feature, Mode, SettingKey, SettingValue, Settings, SettingsError,
};
use crate::storage::KeyValueStorage;

pub type SharedSettings = Arc<RwLock<SettingsStore>>;

pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Listener = Box<dyn Fn(&SettingChange) -> ListenerResult + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A committed change, delivered to every listener
#[derive(Debug, Clone, PartialEq)]
pub struct SettingChange {
    pub key: SettingKey,
    pub new_value: SettingValue,
    pub old_value: SettingValue,
}

/// Outcome of a committing operation. Errors collected here are non-fatal:
/// the change was applied (with invalid fields reset) even when some are
/// present.
#[derive(Debug, Default)]
pub struct CommitReport {
    pub changes: Vec<SettingChange>,
    pub errors: Vec<SettingsError>,
}

impl CommitReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    #[cfg(test)]
    pub fn changed_keys(&self) -> Vec<SettingKey> {
        self.changes.iter().map(|c| c.key).collect()
    }

    #[cfg(test)]
    pub fn validation_error(&self) -> Option<&SettingsError> {
        self.errors
            .iter()
            .find(|e| matches!(e, SettingsError::Validation(_)))
    }
}

/// Export envelope. `config` never carries the API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsExport {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub config: serde_json::Map<String, Value>,
}

pub struct SettingsStore {
    settings: Settings,
    storage: Arc<dyn KeyValueStorage>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: u64,
}

impl SettingsStore {
    /// Reads the persisted record, merges it over the defaults and
    /// validates it. Problems are returned alongside the store; the store
    /// is always usable.
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> (Self, Vec<SettingsError>) {
        let mut errors = Vec::new();

        let settings = match storage.get_item(SETTINGS_STORAGE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Settings>(&raw) {
                Ok(parsed) => {
                    log::info!("configuration loaded from storage");
                    parsed
                }
                Err(e) => {
                    log::error!("failed to parse stored configuration: {}", e);
                    errors.push(SettingsError::Load(e.to_string()));
                    Settings::default()
                }
            },
            Ok(None) => {
                log::info!("no stored configuration, using defaults");
                Settings::default()
            }
            Err(e) => {
                log::error!("failed to read stored configuration: {}", e);
                errors.push(SettingsError::Load(e.to_string()));
                Settings::default()
            }
        };

        let mut store = Self {
            settings,
            storage,
            listeners: Vec::new(),
            next_listener_id: 0,
        };

        if let Err(e) = validate_settings(&mut store.settings) {
            errors.push(e);
            if let Err(e) = store.persist() {
                errors.push(e);
            }
        }

        (store, errors)
    }

    pub fn into_shared(self) -> SharedSettings {
        Arc::new(RwLock::new(self))
    }

    /// Looks a setting up by name; unknown names yield `None`.
    pub fn get(&self, key: &str) -> Option<SettingValue> {
        key.parse::<SettingKey>()
            .ok()
            .map(|k| self.settings.get(k))
    }

    pub fn all(&self) -> &Settings {
        &self.settings
    }

    pub fn set(
        &mut self,
        key: SettingKey,
        value: impl Into<SettingValue>,
    ) -> Result<CommitReport, SettingsError> {
        self.set_multiple([(key, value.into())])
    }

    /// Applies every entry, then validates and persists once. A value of
    /// the wrong type aborts the whole batch before anything changes.
    pub fn set_multiple<I>(&mut self, entries: I) -> Result<CommitReport, SettingsError>
    where
        I: IntoIterator<Item = (SettingKey, SettingValue)>,
    {
        let mut candidate = self.settings.clone();
        let mut touched: Vec<SettingKey> = Vec::new();
        for (key, value) in entries {
            candidate.apply(key, value)?;
            if !touched.contains(&key) {
                touched.push(key);
            }
        }

        let mut report = CommitReport::default();
        if let Err(e) = validate_settings(&mut candidate) {
            report.errors.push(e);
        }

        let old = std::mem::replace(&mut self.settings, candidate);

        if self.settings.auto_save
            && let Err(e) = self.persist()
        {
            report.errors.push(e);
        }

        report.changes = touched
            .into_iter()
            .filter_map(|key| self.diff(&old, key))
            .collect();
        self.notify_listeners(&report.changes);

        Ok(report)
    }

    /// Restores every default and notifies listeners for every key.
    pub fn reset(&mut self) -> CommitReport {
        let old = std::mem::take(&mut self.settings);
        let mut report = CommitReport::default();

        if let Err(e) = self.persist() {
            report.errors.push(e);
        }

        report.changes = SettingKey::ALL
            .into_iter()
            .map(|key| SettingChange {
                key,
                new_value: self.settings.get(key),
                old_value: old.get(key),
            })
            .collect();
        self.notify_listeners(&report.changes);

        log::info!("configuration reset to defaults");
        report
    }

    pub fn export(&self) -> Result<String, SettingsError> {
        let envelope = self.export_envelope()?;
        serde_json::to_string_pretty(&envelope)
            .map_err(|e| SettingsError::Serialization(e.to_string()))
    }

    fn export_envelope(&self) -> Result<SettingsExport, SettingsError> {
        let mut config = match serde_json::to_value(&self.settings) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(SettingsError::Serialization(
                    "configuration is not an object".to_string(),
                ));
            }
            Err(e) => return Err(SettingsError::Serialization(e.to_string())),
        };
        config.remove(SettingKey::ApiKey.as_str());

        Ok(SettingsExport {
            version: SETTINGS_EXPORT_VERSION.to_string(),
            timestamp: Utc::now(),
            config,
        })
    }

    pub fn import(&mut self, data: &str) -> Result<CommitReport, SettingsError> {
        let parsed: Value = serde_json::from_str(data).map_err(|e| {
            log::error!("failed to import configuration: {}", e);
            SettingsError::ImportFormat(e.to_string())
        })?;
        self.import_value(parsed)
    }

    /// Merges `data.config` over the defaults. The API key held right now
    /// always survives; an imported key is ignored.
    pub fn import_value(&mut self, data: Value) -> Result<CommitReport, SettingsError> {
        let config = data
            .get("config")
            .filter(|c| c.is_object())
            .cloned()
            .ok_or_else(|| SettingsError::ImportFormat(ERROR_INVALID_IMPORT.to_string()))?;

        let mut imported: Settings = serde_json::from_value(config).map_err(|e| {
            log::error!("failed to import configuration: {}", e);
            SettingsError::ImportFormat(e.to_string())
        })?;
        imported.api_key = self.settings.api_key.clone();

        let mut report = CommitReport::default();
        if let Err(e) = validate_settings(&mut imported) {
            report.errors.push(e);
        }

        let old = std::mem::replace(&mut self.settings, imported);

        if let Err(e) = self.persist() {
            report.errors.push(e);
        }

        report.changes = SettingKey::ALL
            .into_iter()
            .filter_map(|key| self.diff(&old, key))
            .collect();
        self.notify_listeners(&report.changes);

        log::info!(
            "configuration imported ({} fields changed)",
            report.changes.len()
        );
        Ok(report)
    }

    pub fn is_api_configured(&self) -> bool {
        !self.settings.api_key.is_empty()
            && !self.settings.api_url.is_empty()
            && !self.settings.model.is_empty()
    }

    pub fn api_config(&self) -> ApiConfig {
        self.settings.api_config()
    }

    pub fn mode(&self) -> Mode {
        if self.settings.api_key.contains("test") || self.settings.api_url.contains("localhost") {
            Mode::Development
        } else {
            Mode::Production
        }
    }

    pub fn is_feature_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Stream => self.settings.stream_response,
            Feature::Notifications => self.settings.enable_notifications,
            Feature::Timestamp => self.settings.show_timestamp,
            Feature::AutoSave => self.settings.auto_save,
        }
    }

    pub fn theme(&self) -> &str {
        if self.settings.theme.is_empty() {
            SUPPORTED_THEMES[0]
        } else {
            &self.settings.theme
        }
    }

    pub fn set_theme(&mut self, theme: &str) -> Result<CommitReport, SettingsError> {
        if !SUPPORTED_THEMES.contains(&theme) {
            return Err(SettingsError::InvalidValue {
                key: SettingKey::Theme,
                message: format!("expected one of {}", SUPPORTED_THEMES.join(", ")),
            });
        }
        self.set(SettingKey::Theme, theme)
    }

    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&SettingChange) -> ListenerResult + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn diff(&self, old: &Settings, key: SettingKey) -> Option<SettingChange> {
        let old_value = old.get(key);
        let new_value = self.settings.get(key);
        (old_value != new_value).then_some(SettingChange {
            key,
            new_value,
            old_value,
        })
    }

    fn notify_listeners(&self, changes: &[SettingChange]) {
        for change in changes {
            for (id, listener) in &self.listeners {
                match catch_unwind(AssertUnwindSafe(|| listener(change))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        log::error!("config listener {:?} failed on {}: {}", id, change.key, e)
                    }
                    Err(_) => log::error!("config listener {:?} panicked on {}", id, change.key),
                }
            }
        }
    }

    fn persist(&self) -> Result<(), SettingsError> {
        let record = serde_json::to_string(&self.settings)
            .map_err(|e| SettingsError::Serialization(e.to_string()))?;
        self.storage
            .set_item(SETTINGS_STORAGE_KEY, &record)
            .map_err(|e| {
                log::error!("failed to save configuration: {}", e);
                SettingsError::Persistence(e)
            })
    }
}
