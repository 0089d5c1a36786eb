//! Persistence module
//!
//! Audio selection save/load using serde and JSON.

pub mod settings;

pub use settings::{
    load_from_file, save_to_file, AudioSettings, SettingsError, SETTINGS_VERSION,
};
