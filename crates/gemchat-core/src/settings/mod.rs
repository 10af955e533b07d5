pub mod app_settings;
pub mod settings_json_repository;

pub use app_settings::AppSettings;
pub use settings_json_repository::{
    SettingsError, SettingsJsonRepository, SettingsRepository, SettingsResult,
};
