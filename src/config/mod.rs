//! Configuration management for tabload
//!
//! This module provides the two persisted documents:
//! - **settings**: AppSettings singleton (connection defaults, default parameters)
//! - **store**: PresetStore holding named presets, overlaid on built-in defaults

pub mod preset;
pub mod settings;
pub mod store;

// Re-export commonly used types
pub use preset::{builtin_presets, CacheMode, ModelParams, Preset};
pub use settings::{config_dir, AppSettings, SettingsStore};
pub use store::PresetStore;
