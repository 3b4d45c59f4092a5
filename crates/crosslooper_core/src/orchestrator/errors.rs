//! Error types for the orchestrator.
//!
//! Errors carry context that chains through layers:
//! Batch → Track → Operation → Detail

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::config::ConfigError;
use crate::tags::TagError;

/// Failure while processing one track.
///
/// Never aborts a batch: the scheduler records it and moves on.
#[derive(Error, Debug)]
pub enum TrackError {
    /// Decoding or probing the audio failed.
    #[error("{}: {source}", .path.display())]
    Analysis {
        path: PathBuf,
        #[source]
        source: AnalysisError,
    },

    /// Reading or writing loop tags failed.
    #[error("{}: {source}", .path.display())]
    Tags {
        path: PathBuf,
        #[source]
        source: TagError,
    },

    /// The resolved search options are invalid.
    #[error("{}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    /// Processing panicked; caught by the worker.
    #[error("{}: processing panicked: {message}", .path.display())]
    Panicked { path: PathBuf, message: String },
}

impl TrackError {
    /// Create an analysis error.
    pub fn analysis(path: impl Into<PathBuf>, source: AnalysisError) -> Self {
        Self::Analysis {
            path: path.into(),
            source,
        }
    }

    /// Create a tag error.
    pub fn tags(path: impl Into<PathBuf>, source: TagError) -> Self {
        Self::Tags {
            path: path.into(),
            source,
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, source: ConfigError) -> Self {
        Self::Config {
            path: path.into(),
            source,
        }
    }

    /// Create a panicked error.
    pub fn panicked(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Panicked {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Track the error belongs to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Analysis { path, .. }
            | Self::Tags { path, .. }
            | Self::Config { path, .. }
            | Self::Panicked { path, .. } => path,
        }
    }
}

/// Result type for track processing.
pub type TrackResult<T> = Result<T, TrackError>;

/// Failure before any worker starts.
#[derive(Error, Debug)]
pub enum BatchError {
    /// The input directory is missing or not a directory.
    #[error("Invalid input directory: {0}")]
    InputDir(#[source] ConfigError),

    /// The preset file could not be loaded.
    #[error("Failed to load presets: {0}")]
    Presets(#[source] ConfigError),

    /// The base search options are invalid.
    #[error("Invalid search options: {0}")]
    Config(#[source] ConfigError),

    /// Listing the input directory failed.
    #[error("Failed to list {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A worker thread could not be started.
    #[error("Failed to start worker: {0}")]
    Spawn(#[source] io::Error),
}

/// Result type for batch runs.
pub type BatchResult<T> = Result<T, BatchError>;
