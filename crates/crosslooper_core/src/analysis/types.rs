//! Core types for audio analysis.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Mono audio decoded from a media file.
///
/// Samples keep the scale of the 16-bit PCM they were decoded from.
/// A signal is produced once per input and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Mono samples.
    pub samples: Vec<f64>,
}

impl Signal {
    /// Create a new signal from samples.
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    /// Get the number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the signal is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Convert seconds to a sample count at this signal's rate (rounded).
    pub fn secs_to_samples(&self, secs: f64) -> i64 {
        (secs * self.sample_rate as f64).round() as i64
    }

    /// Convert a sample index to seconds at this signal's rate.
    pub fn samples_to_secs(&self, samples: usize) -> f64 {
        samples as f64 / self.sample_rate as f64
    }
}

/// Options handed to the preprocessing pipeline for one decode.
///
/// This is the subset of the search configuration that influences decoding.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Only decode the first N seconds.
    pub take_seconds: Option<f64>,
    /// Apply loudness normalization.
    pub normalize: bool,
    /// Apply spectral noise reduction.
    pub denoise: bool,
    /// Low-pass cutoff in Hz; 0 disables the filter.
    pub lowpass_hz: f64,
}

impl DecodeOptions {
    /// Derive options with normalization forced to the given value.
    ///
    /// Used for sample-rate mismatch recovery: the caller's options are left
    /// untouched.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Whether the low-pass transform is enabled.
    pub fn lowpass_enabled(&self) -> bool {
        self.lowpass_hz as i64 != 0
    }
}

/// Error types for analysis operations.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// An external transform exited unsuccessfully.
    #[error("{transform} failed on {path} (exit code {code:?})")]
    TransformFailed {
        transform: String,
        path: PathBuf,
        code: Option<i32>,
    },

    /// An external tool could not be started.
    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Sample rates still differ after forced normalization.
    #[error("Sample rates differ after normalization: {first} Hz vs {second} Hz")]
    SampleRateMismatch { first: u32, second: u32 },

    /// Decoded PCM could not be read.
    #[error("Failed to read decoded PCM: {0}")]
    Wav(#[from] hound::Error),

    /// Probing the source failed.
    #[error("Failed to probe {path}: {message}")]
    Probe { path: PathBuf, message: String },

    /// Decoding produced no samples.
    #[error("No audio samples decoded from {0}")]
    EmptySignal(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source file not found.
    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),
}

/// Type alias for analysis results.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
