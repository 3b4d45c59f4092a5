//! Per-track presets.
//!
//! A preset file is a TOML document with one table per preset. The table name
//! is matched case-insensitively against the track's file stem; the first
//! preset (in file order) whose name is contained in the stem wins. Option
//! names are case-insensitive: `normalize`, `denoise`, `lowpass`, `loopstart`,
//! `loopstartmax`, `loopendmin`, `looplenmin`, `loopsearchstep`,
//! `loopsearchlen`, `loopforce` and `skip`.
//!
//! ```toml
//! [boss]
//! loopstart = 10
//! loopsearchlen = 8
//!
//! [title]
//! skip = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::manager::{ConfigError, ConfigResult};

/// File extensions searched by [`find_preset_for_title`].
pub const PRESET_EXTENSIONS: [&str; 2] = ["toml", "conf"];

/// Partial search options: every field a preset can override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetOverrides {
    pub normalize: Option<bool>,
    pub denoise: Option<bool>,
    pub lowpass_hz: Option<f64>,
    pub loop_start_min: Option<f64>,
    pub loop_start_max: Option<f64>,
    pub loop_end_min: Option<f64>,
    pub loop_len_min: Option<f64>,
    pub search_step: Option<f64>,
    pub search_len: Option<f64>,
    pub force_overwrite: Option<bool>,
    pub skip: Option<bool>,
}

impl PresetOverrides {
    /// Whether no option is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Set one option from its preset-file name.
    fn set(&mut self, preset: &str, option: &str, value: &toml::Value) -> ConfigResult<()> {
        let key = option.to_lowercase();
        match key.as_str() {
            "normalize" => self.normalize = Some(as_bool(preset, option, value)?),
            "denoise" => self.denoise = Some(as_bool(preset, option, value)?),
            "loopforce" => self.force_overwrite = Some(as_bool(preset, option, value)?),
            "skip" => self.skip = Some(as_bool(preset, option, value)?),
            "lowpass" => self.lowpass_hz = Some(as_number(preset, option, value)?),
            "loopstart" => self.loop_start_min = Some(as_number(preset, option, value)?),
            "loopstartmax" => self.loop_start_max = Some(as_number(preset, option, value)?),
            "loopendmin" => self.loop_end_min = Some(as_number(preset, option, value)?),
            "looplenmin" => self.loop_len_min = Some(as_number(preset, option, value)?),
            "loopsearchstep" => self.search_step = Some(as_number(preset, option, value)?),
            "loopsearchlen" => self.search_len = Some(as_number(preset, option, value)?),
            _ => {
                return Err(ConfigError::UnknownPresetOption {
                    preset: preset.to_string(),
                    option: option.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn as_bool(preset: &str, option: &str, value: &toml::Value) -> ConfigResult<bool> {
    match value {
        toml::Value::Boolean(b) => Ok(*b),
        toml::Value::Integer(i) => Ok(*i != 0),
        other => Err(invalid_value(preset, option, "a boolean", other)),
    }
}

fn as_number(preset: &str, option: &str, value: &toml::Value) -> ConfigResult<f64> {
    let number = match value {
        toml::Value::Integer(i) => *i as f64,
        toml::Value::Float(f) => *f,
        other => return Err(invalid_value(preset, option, "a number", other)),
    };
    if !number.is_finite() || number < 0.0 {
        return Err(ConfigError::InvalidPresetValue {
            preset: preset.to_string(),
            option: option.to_string(),
            message: format!("expected a non-negative number, got {}", number),
        });
    }
    Ok(number)
}

fn invalid_value(preset: &str, option: &str, expected: &str, got: &toml::Value) -> ConfigError {
    ConfigError::InvalidPresetValue {
        preset: preset.to_string(),
        option: option.to_string(),
        message: format!("expected {}, got {} `{}`", expected, got.type_str(), got),
    }
}

/// A named set of overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    /// Lowercased preset name.
    pub name: String,
    pub overrides: PresetOverrides,
}

/// Ordered collection of presets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetSet {
    presets: Vec<Preset>,
}

impl PresetSet {
    /// Empty set: nothing ever matches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a preset file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let set = Self::parse(&content)?;
        tracing::debug!("Loaded {} presets from {}", set.len(), path.display());
        Ok(set)
    }

    /// Parse and validate preset file content.
    ///
    /// Any unknown option fails the whole file.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let table: toml::Table = toml::from_str(content)?;
        let mut set = Self::new();

        for (name, entries) in &table {
            let entries = entries
                .as_table()
                .ok_or_else(|| ConfigError::PresetNotATable(name.clone()))?;

            let mut overrides = PresetOverrides::default();
            for (option, value) in entries {
                overrides.set(name, option, value)?;
            }
            set.insert(Preset {
                name: name.to_lowercase(),
                overrides,
            });
        }

        Ok(set)
    }

    /// Add a preset. A preset with the same name replaces the earlier one in
    /// place.
    pub fn insert(&mut self, preset: Preset) {
        match self.presets.iter_mut().find(|p| p.name == preset.name) {
            Some(existing) => *existing = preset,
            None => self.presets.push(preset),
        }
    }

    /// First preset whose name is contained in the lowercased `stem`.
    pub fn resolve(&self, stem: &str) -> Option<&Preset> {
        let stem = stem.to_lowercase();
        self.presets.iter().find(|p| stem.contains(&p.name))
    }

    /// [`resolve`](Self::resolve) on the file stem of `path`.
    pub fn resolve_path(&self, path: &Path) -> Option<&Preset> {
        let stem = path.file_stem()?.to_string_lossy();
        self.resolve(&stem)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.iter()
    }
}

/// Find the preset file for a game in a preset library directory.
///
/// Returns the first `*.toml`/`*.conf` file (sorted by name) whose lowercased
/// stem is contained in the lowercased title.
pub fn find_preset_for_title(dir: &Path, title: &str) -> ConfigResult<Option<PathBuf>> {
    if !dir.exists() {
        return Err(ConfigError::DirectoryNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ConfigError::NotADirectory(dir.to_path_buf()));
    }

    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| PRESET_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    let title = title.to_lowercase();
    Ok(candidates.into_iter().find(|p| {
        p.file_stem()
            .map(|s| title.contains(&s.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }))
}
