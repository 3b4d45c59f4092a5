//! Loop metadata.
//!
//! Loop points are stored as Vorbis comments in two redundant forms: sample
//! counts (`LOOPSTART`, `LOOPLENGTH`) and seconds (`LOOP_START`, `LOOP_END`).
//! Players read one or the other, so both are always written together.
//!
//! [`plan_tags`] decides what a track needs before any audio is decoded: if
//! one form is already present the other can be derived from it without a
//! search.

mod memory;
mod vorbis;

pub use memory::{MemoryTagBackend, MemoryTagStore};
pub use vorbis::{
    has_supported_extension, VorbisCommentBackend, VorbisCommentStore, SUPPORTED_EXTENSIONS,
};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::LoopCandidate;

/// Loop start in samples.
pub const LOOPSTART: &str = "LOOPSTART";
/// Loop length in samples.
pub const LOOPLENGTH: &str = "LOOPLENGTH";
/// Loop start in seconds.
pub const LOOP_START: &str = "LOOP_START";
/// Loop end in seconds.
pub const LOOP_END: &str = "LOOP_END";

/// Error types for tag operations.
#[derive(Debug, thiserror::Error)]
pub enum TagError {
    /// The file can't carry Vorbis comments.
    #[error("Not a Vorbis comment file: {0}")]
    UnsupportedFormat(PathBuf),

    /// Reading or writing the container failed.
    #[error("Tag error: {0}")]
    Lofty(#[from] lofty::error::LoftyError),

    /// A loop tag holds something that isn't a number.
    #[error("Invalid {key} value '{value}'")]
    InvalidValue { key: String, value: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for tag results.
pub type TagResult<T> = Result<T, TagError>;

/// Tags of one open file.
pub trait TagStore: Send {
    /// File the tags belong to.
    fn path(&self) -> &Path;

    /// First value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Replace every value under `key` with `value`. Kept in memory until
    /// [`save`](Self::save).
    fn set(&mut self, key: &str, value: String);

    /// Write pending changes back to the file.
    fn save(&mut self) -> TagResult<()>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Opens tag stores for files.
pub trait TagBackend: Send + Sync {
    /// Open the tags of `path`.
    ///
    /// Fails with [`TagError::UnsupportedFormat`] when the file can't carry
    /// loop tags.
    fn open(&self, path: &Path) -> TagResult<Box<dyn TagStore>>;
}

/// A loop in both tag forms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopTags {
    /// `LOOPSTART`
    pub start: u64,
    /// `LOOPLENGTH`
    pub length: u64,
    /// `LOOP_START`
    pub start_secs: f64,
    /// `LOOP_END`
    pub end_secs: f64,
}

impl LoopTags {
    /// Build from the sample form.
    pub fn from_samples(start: u64, length: u64, sample_rate: u32) -> Self {
        let rate = sample_rate as f64;
        Self {
            start,
            length,
            start_secs: start as f64 / rate,
            end_secs: (start + length) as f64 / rate,
        }
    }

    /// Build from the seconds form. Samples are rounded to the nearest index.
    pub fn from_seconds(start_secs: f64, end_secs: f64, sample_rate: u32) -> Self {
        let rate = sample_rate as f64;
        let start = (start_secs * rate).round().max(0.0) as u64;
        let end = (end_secs * rate).round().max(0.0) as u64;
        Self {
            start,
            length: end.saturating_sub(start),
            start_secs,
            end_secs,
        }
    }

    /// Build from a search result found at `decoded_rate`, expressed at the
    /// file's `native_rate`.
    pub fn from_candidate(candidate: &LoopCandidate, decoded_rate: u32, native_rate: u32) -> Self {
        if decoded_rate == native_rate {
            return Self::from_samples(candidate.start as u64, candidate.length as u64, native_rate);
        }
        let scale = native_rate as f64 / decoded_rate as f64;
        let start = (candidate.start as f64 * scale).round() as u64;
        let end = (candidate.end as f64 * scale).round() as u64;
        Self::from_samples(start, end.saturating_sub(start), native_rate)
    }

    /// Sample index the loop jumps back from.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// Store all four tags (not saved).
    pub fn write_to(&self, store: &mut dyn TagStore) {
        store.set(LOOPSTART, self.start.to_string());
        store.set(LOOPLENGTH, self.length.to_string());
        store.set(LOOP_START, format_seconds(self.start_secs));
        store.set(LOOP_END, format_seconds(self.end_secs));
    }

    /// One-line summary naming the sample tags.
    pub fn summary_line(&self, path: &Path) -> String {
        format!(
            "{} needs tags 'LOOPSTART={} LOOPLENGTH={}'",
            path.display(),
            self.start,
            self.length
        )
    }
}

/// What a track needs, decided from its existing tags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagPlan {
    /// All four tags are present.
    AlreadyTagged,
    /// Only the sample form is present.
    DeriveSeconds { start: f64, length: f64 },
    /// Only the seconds form is present.
    DeriveSamples { start_secs: f64, end_secs: f64 },
    /// Neither form is complete, or overwriting was forced.
    Search,
}

/// Decide what a track needs.
///
/// With `force` every track is searched again.
pub fn plan_tags(store: &dyn TagStore, force: bool) -> TagResult<TagPlan> {
    if force {
        return Ok(TagPlan::Search);
    }

    let has_samples = store.contains(LOOPSTART) && store.contains(LOOPLENGTH);
    let has_seconds = store.contains(LOOP_START) && store.contains(LOOP_END);

    let plan = match (has_samples, has_seconds) {
        (true, true) => TagPlan::AlreadyTagged,
        (true, false) => TagPlan::DeriveSeconds {
            start: require_number(store, LOOPSTART)?,
            length: require_number(store, LOOPLENGTH)?,
        },
        (false, true) => TagPlan::DeriveSamples {
            start_secs: require_number(store, LOOP_START)?,
            end_secs: require_number(store, LOOP_END)?,
        },
        (false, false) => TagPlan::Search,
    };
    Ok(plan)
}

/// Format seconds with at least one fractional digit (`1.0`, `2.5`).
pub fn format_seconds(secs: f64) -> String {
    let text = secs.to_string();
    if !secs.is_finite() || text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn read_number(store: &dyn TagStore, key: &str) -> TagResult<Option<f64>> {
    match store.get(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(Some)
            .ok_or(TagError::InvalidValue {
                key: key.to_string(),
                value,
            }),
    }
}

fn require_number(store: &dyn TagStore, key: &str) -> TagResult<f64> {
    read_number(store, key)?.ok_or_else(|| TagError::InvalidValue {
        key: key.to_string(),
        value: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(entries: &[(&str, &str)]) -> MemoryTagStore {
        let mut store = MemoryTagStore::new("track.ogg");
        for (k, v) in entries {
            store.set(k, v.to_string());
        }
        store
    }

    #[test]
    fn samples_to_seconds_round_trip() {
        let tags = LoopTags::from_samples(44100, 88200, 44100);
        assert_eq!(format_seconds(tags.start_secs), "1.0");
        assert_eq!(format_seconds(tags.end_secs), "3.0");

        let back = LoopTags::from_seconds(tags.start_secs, tags.end_secs, 44100);
        assert_eq!(back.start, 44100);
        assert_eq!(back.length, 88200);
    }

    #[test]
    fn seconds_to_samples_rounds() {
        // 1.1 * 44100 = 48510.000000000004
        let tags = LoopTags::from_seconds(1.1, 2.2, 44100);
        assert_eq!(tags.start, 48510);
        assert_eq!(tags.end(), 97020);
    }

    #[test]
    fn candidate_is_rescaled_to_native_rate() {
        let candidate = LoopCandidate {
            start: 192_000,
            end: 576_000,
            length: 384_000,
            confidence: 1.0,
            normalized_confidence: 1.0,
        };
        let tags = LoopTags::from_candidate(&candidate, 192_000, 48_000);
        assert_eq!(tags.start, 48_000);
        assert_eq!(tags.length, 96_000);
        assert_eq!(format_seconds(tags.end_secs), "3.0");

        let same = LoopTags::from_candidate(&candidate, 192_000, 192_000);
        assert_eq!(same.start, 192_000);
        assert_eq!(same.length, 384_000);
    }

    #[test]
    fn format_seconds_keeps_fraction() {
        assert_eq!(format_seconds(0.0), "0.0");
        assert_eq!(format_seconds(2.5), "2.5");
        assert_eq!(format_seconds(12.0), "12.0");
    }

    #[test]
    fn plan_detects_complete_tags() {
        let s = store(&[
            (LOOPSTART, "44100"),
            (LOOPLENGTH, "88200"),
            (LOOP_START, "1.0"),
            (LOOP_END, "3.0"),
        ]);
        assert_eq!(plan_tags(&s, false).unwrap(), TagPlan::AlreadyTagged);
        assert_eq!(plan_tags(&s, true).unwrap(), TagPlan::Search);
    }

    #[test]
    fn plan_derives_missing_form() {
        let samples_only = store(&[(LOOPSTART, "44100"), (LOOPLENGTH, "88200")]);
        assert_eq!(
            plan_tags(&samples_only, false).unwrap(),
            TagPlan::DeriveSeconds {
                start: 44100.0,
                length: 88200.0
            }
        );

        let seconds_only = store(&[(LOOP_START, "1.0"), (LOOP_END, "3.0")]);
        assert_eq!(
            plan_tags(&seconds_only, false).unwrap(),
            TagPlan::DeriveSamples {
                start_secs: 1.0,
                end_secs: 3.0
            }
        );
    }

    #[test]
    fn plan_searches_when_pairs_are_incomplete() {
        let partial = store(&[(LOOPSTART, "44100"), (LOOP_END, "3.0")]);
        assert_eq!(plan_tags(&partial, false).unwrap(), TagPlan::Search);
        assert_eq!(plan_tags(&store(&[]), false).unwrap(), TagPlan::Search);
    }

    #[test]
    fn plan_rejects_garbage_values() {
        let s = store(&[(LOOPSTART, "soon"), (LOOPLENGTH, "88200")]);
        assert!(matches!(
            plan_tags(&s, false),
            Err(TagError::InvalidValue { ref key, .. }) if key == LOOPSTART
        ));
    }

    #[test]
    fn written_tags_read_back() {
        let mut s = store(&[]);
        let tags = LoopTags::from_samples(44100, 88200, 44100);
        tags.write_to(&mut s);

        assert_eq!(s.get(LOOPSTART).as_deref(), Some("44100"));
        assert_eq!(s.get(LOOP_END).as_deref(), Some("3.0"));
        assert_eq!(s.get(LOOP_START).as_deref(), Some("1.0"));
        assert_eq!(s.get(LOOPLENGTH).as_deref(), Some("88200"));
        assert_eq!(plan_tags(&s, false).unwrap(), TagPlan::AlreadyTagged);
    }

    #[test]
    fn summary_line_names_sample_tags() {
        let tags = LoopTags::from_samples(1000, 2000, 44100);
        assert_eq!(
            tags.summary_line(Path::new("bgm/town.ogg")),
            "bgm/town.ogg needs tags 'LOOPSTART=1000 LOOPLENGTH=2000'"
        );
    }
}
