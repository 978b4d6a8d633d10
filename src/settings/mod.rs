pub mod error;
pub mod store;
pub mod types;
pub mod validation;

pub use error::{SettingsError, Violation};
pub use store::{CommitReport, SettingsStore, SharedSettings};
pub use types::{ApiConfig, Feature, Mode, SettingKey, SettingValue, Settings};
pub use validation::is_valid_url;
