//! Settings struct with TOML-based sections.
//!
//! `[search]` holds the loop search and decode options, `[batch]` the
//! directory mode options and `[logging]` the log level and optional file.

use serde::{Deserialize, Serialize};

use crate::analysis::DecodeOptions;
use crate::logging::LogLevel;

use super::manager::{ConfigError, ConfigResult};
use super::presets::PresetOverrides;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Loop search and decode options.
    #[serde(default)]
    pub search: SearchConfig,

    /// Directory mode options.
    #[serde(default)]
    pub batch: BatchSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Config sections that map to TOML tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Search,
    Batch,
    Logging,
}

impl ConfigSection {
    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Search => "search",
            ConfigSection::Batch => "batch",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the table in generated files.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Search => "Loop search and audio preprocessing",
            ConfigSection::Batch => "Directory mode",
            ConfigSection::Logging => "Logging configuration",
        }
    }

    /// All sections in file order.
    pub fn all() -> [ConfigSection; 3] {
        [
            ConfigSection::Search,
            ConfigSection::Batch,
            ConfigSection::Logging,
        ]
    }
}

/// Options for one loop search. All durations are in seconds.
///
/// Resolved once per track (defaults, settings file, CLI flags, preset) and
/// never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Earliest loop start.
    #[serde(default = "default_loop_start_min")]
    pub loop_start_min: f64,

    /// Latest loop start; capped at 47% of the track either way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_start_max: Option<f64>,

    /// Earliest loop end.
    #[serde(default = "default_loop_end_min")]
    pub loop_end_min: f64,

    /// Shortest accepted loop.
    #[serde(default)]
    pub loop_len_min: f64,

    /// Distance between tried loop starts.
    #[serde(default = "default_search_step")]
    pub search_step: f64,

    /// Length of the window compared against the rest of the track.
    #[serde(default = "default_search_len")]
    pub search_len: f64,

    /// Search even when loop tags are already present.
    #[serde(default)]
    pub force_overwrite: bool,

    /// Leave the track alone.
    #[serde(default)]
    pub skip: bool,

    /// Loudness-normalize before analysis.
    #[serde(default)]
    pub normalize: bool,

    /// Denoise before analysis.
    #[serde(default)]
    pub denoise: bool,

    /// Low-pass cutoff in Hz, 0 to disable.
    #[serde(default)]
    pub lowpass_hz: f64,

    /// Only analyze the first N seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_seconds: Option<f64>,
}

fn default_loop_start_min() -> f64 {
    5.0
}

fn default_loop_end_min() -> f64 {
    20.0
}

fn default_search_step() -> f64 {
    1.0
}

fn default_search_len() -> f64 {
    5.0
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            loop_start_min: default_loop_start_min(),
            loop_start_max: None,
            loop_end_min: default_loop_end_min(),
            loop_len_min: 0.0,
            search_step: default_search_step(),
            search_len: default_search_len(),
            force_overwrite: false,
            skip: false,
            normalize: false,
            denoise: false,
            lowpass_hz: 0.0,
            take_seconds: None,
        }
    }
}

impl SearchConfig {
    /// Return a copy with every option set in `overrides` replaced.
    pub fn with_overrides(&self, overrides: &PresetOverrides) -> Self {
        let mut out = self.clone();
        if let Some(v) = overrides.normalize {
            out.normalize = v;
        }
        if let Some(v) = overrides.denoise {
            out.denoise = v;
        }
        if let Some(v) = overrides.lowpass_hz {
            out.lowpass_hz = v;
        }
        if let Some(v) = overrides.loop_start_min {
            out.loop_start_min = v;
        }
        if let Some(v) = overrides.loop_start_max {
            out.loop_start_max = Some(v);
        }
        if let Some(v) = overrides.loop_end_min {
            out.loop_end_min = v;
        }
        if let Some(v) = overrides.loop_len_min {
            out.loop_len_min = v;
        }
        if let Some(v) = overrides.search_step {
            out.search_step = v;
        }
        if let Some(v) = overrides.search_len {
            out.search_len = v;
        }
        if let Some(v) = overrides.force_overwrite {
            out.force_overwrite = v;
        }
        if let Some(v) = overrides.skip {
            out.skip = v;
        }
        out
    }

    /// Check value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        let non_negative = [
            ("loop_start_min", self.loop_start_min),
            ("loop_end_min", self.loop_end_min),
            ("loop_len_min", self.loop_len_min),
            ("lowpass_hz", self.lowpass_hz),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be a non-negative number, got {}", value),
                });
            }
        }

        let positive = [
            ("search_step", Some(self.search_step)),
            ("search_len", Some(self.search_len)),
            ("take_seconds", self.take_seconds),
        ];
        for (field, value) in positive {
            if let Some(value) = value {
                if !value.is_finite() || value <= 0.0 {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_string(),
                        message: format!("must be greater than zero, got {}", value),
                    });
                }
            }
        }

        // A maximum below the minimum is an empty search space, not an error
        if let Some(max) = self.loop_start_max {
            if !max.is_finite() || max < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "loop_start_max".to_string(),
                    message: format!("must be a non-negative number, got {}", max),
                });
            }
        }

        Ok(())
    }

    /// The subset of options the preprocessing pipeline needs.
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            take_seconds: self.take_seconds,
            normalize: self.normalize,
            denoise: self.denoise,
            lowpass_hz: self.lowpass_hz,
        }
    }
}

/// Directory mode options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Worker threads; 0 uses every hardware thread.
    #[serde(default)]
    pub threads: usize,

    /// Directory scanned when none is given on the command line.
    #[serde(default = "default_indir")]
    pub indir: String,

    /// Preset file applied when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presetconf: Option<String>,
}

fn default_indir() -> String {
    "Audio/BGM".to_string()
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            threads: 0,
            indir: default_indir(),
            presetconf: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when neither `RUST_LOG` nor a CLI flag sets one.
    #[serde(default)]
    pub level: LogLevel,

    /// Also write logs to this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}
