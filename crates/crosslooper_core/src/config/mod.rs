//! Configuration for crosslooper.
//!
//! This module provides:
//! - The settings file (`[search]`, `[batch]`, `[logging]`) with defaults for
//!   every key
//! - Atomic file writes (write to temp, then rename)
//! - Per-track presets matched on file names
//!
//! # Example
//!
//! ```no_run
//! use crosslooper_core::config::{ConfigManager, PresetSet};
//! use std::path::Path;
//!
//! let mut config = ConfigManager::new("crosslooper.toml");
//! config.load_or_default().unwrap();
//!
//! let presets = PresetSet::load(Path::new("presets.toml")).unwrap();
//! let track_config = match presets.resolve("boss_theme") {
//!     Some(preset) => config.settings().search.with_overrides(&preset.overrides),
//!     None => config.settings().search.clone(),
//! };
//! ```

mod manager;
mod presets;
mod settings;

pub use manager::{resolve_input_dir, ConfigError, ConfigManager, ConfigResult};
pub use presets::{find_preset_for_title, Preset, PresetOverrides, PresetSet, PRESET_EXTENSIONS};
pub use settings::{BatchSettings, ConfigSection, LoggingSettings, SearchConfig, Settings};
