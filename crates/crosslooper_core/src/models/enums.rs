//! Core enums used throughout the application.

use serde::{Deserialize, Serialize};

/// What a run does with the correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// Report the sync offset between two recordings.
    Align,
    /// Find a loop point inside one recording and tag it.
    #[default]
    #[serde(rename = "loop")]
    LoopSearch,
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationMode::Align => write!(f, "align"),
            OperationMode::LoopSearch => write!(f, "loop"),
        }
    }
}

/// Unit an alignment offset is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetUnit {
    /// Sample count at the decoded rate.
    Samples,
    /// Seconds.
    #[default]
    Seconds,
}

impl std::fmt::Display for OffsetUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OffsetUnit::Samples => write!(f, "samples"),
            OffsetUnit::Seconds => write!(f, "seconds"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_mode_serializes_short_names() {
        let json = serde_json::to_string(&OperationMode::LoopSearch).unwrap();
        assert_eq!(json, "\"loop\"");
        let mode: OperationMode = serde_json::from_str("\"align\"").unwrap();
        assert_eq!(mode, OperationMode::Align);
    }

    #[test]
    fn offset_unit_display() {
        assert_eq!(OffsetUnit::Samples.to_string(), "samples");
        assert_eq!(OffsetUnit::default().to_string(), "seconds");
    }
}
