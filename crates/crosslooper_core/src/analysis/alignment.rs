//! Two-file alignment.
//!
//! Correlates two recordings of the same material and reports which one has
//! to be trimmed, and by how much, for them to start in sync.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::OffsetUnit;

use super::correlation::{cross_correlate, Shift};
use super::ffmpeg::Preprocessor;
use super::types::{AnalysisError, AnalysisResult, DecodeOptions, Signal};

/// Which input has to be trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimTarget {
    First,
    Second,
}

/// Offset between two signals, independent of any file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalOffset {
    pub target: TrimTarget,
    /// Samples to drop from the start of the target.
    pub samples: usize,
    /// Peak index the offset was derived from.
    pub peak_index: usize,
    pub pad_size: usize,
}

/// Result of aligning two files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    /// File that needs the cut.
    pub file: PathBuf,
    pub target: TrimTarget,
    /// Cut length in samples at `sample_rate`.
    pub offset_samples: usize,
    /// Rate both signals were decoded at.
    pub sample_rate: u32,
    /// Whether normalization had to be forced to match sample rates.
    pub forced_normalize: bool,
}

impl AlignmentReport {
    /// Cut length in seconds.
    pub fn offset_secs(&self) -> f64 {
        self.offset_samples as f64 / self.sample_rate as f64
    }

    /// Human-readable cut instruction.
    pub fn instruction(&self, unit: OffsetUnit) -> String {
        match unit {
            OffsetUnit::Samples => format!(
                "{} needs 'ffmpeg -af atrim=start_sample={}' cut to get in sync",
                self.file.display(),
                self.offset_samples
            ),
            OffsetUnit::Seconds => format!(
                "{} needs 'ffmpeg -ss {}' cut to get in sync",
                self.file.display(),
                self.offset_secs()
            ),
        }
    }
}

/// Compute the trim that aligns `s2` with `s1`.
pub fn align_signals(s1: &Signal, s2: &Signal) -> AnalysisResult<SignalOffset> {
    if s1.sample_rate != s2.sample_rate {
        return Err(AnalysisError::SampleRateMismatch {
            first: s1.sample_rate,
            second: s2.sample_rate,
        });
    }

    let corr = cross_correlate(&s1.samples, &s2.samples);
    tracing::debug!("{:?}", corr);

    let (target, samples) = match corr.shift() {
        Shift::Backward(n) => (TrimTarget::Second, n),
        Shift::Forward(n) => (TrimTarget::First, n),
    };

    Ok(SignalOffset {
        target,
        samples,
        peak_index: corr.peak_index,
        pad_size: corr.pad_size,
    })
}

/// Decode two files at a common sample rate.
///
/// When the rates differ both files are decoded again with normalization
/// forced on, which resamples them to the same rate. Returns whether that
/// retry happened.
pub fn decode_pair(
    preprocessor: &dyn Preprocessor,
    in1: &Path,
    in2: &Path,
    options: &DecodeOptions,
) -> AnalysisResult<(Signal, Signal, bool)> {
    let decode_both = |opts: &DecodeOptions| -> AnalysisResult<(Signal, Signal)> {
        let s1 = preprocessor.decode(in1, opts)?;
        let s2 = if in1 == in2 {
            s1.clone()
        } else {
            preprocessor.decode(in2, opts)?
        };
        Ok((s1, s2))
    };

    let (s1, s2) = decode_both(options)?;
    if s1.sample_rate == s2.sample_rate {
        return Ok((s1, s2, false));
    }

    tracing::warn!(
        "Sample rates differ ({} Hz vs {} Hz), decoding again with normalization",
        s1.sample_rate,
        s2.sample_rate
    );
    let forced = options.with_normalize(true);
    let (s1, s2) = decode_both(&forced)?;
    if s1.sample_rate != s2.sample_rate {
        return Err(AnalysisError::SampleRateMismatch {
            first: s1.sample_rate,
            second: s2.sample_rate,
        });
    }
    Ok((s1, s2, true))
}

/// Align two files and report the cut that brings them in sync.
pub fn align_files(
    preprocessor: &dyn Preprocessor,
    in1: &Path,
    in2: &Path,
    options: &DecodeOptions,
) -> AnalysisResult<AlignmentReport> {
    let (s1, s2, forced_normalize) = decode_pair(preprocessor, in1, in2, options)?;
    let offset = align_signals(&s1, &s2)?;

    let file = match offset.target {
        TrimTarget::First => in1,
        TrimTarget::Second => in2,
    };

    let report = AlignmentReport {
        file: file.to_path_buf(),
        target: offset.target,
        offset_samples: offset.samples,
        sample_rate: s1.sample_rate,
        forced_normalize,
    };
    tracing::info!(
        "{}: trim {} samples ({:.4}s)",
        report.file.display(),
        report.offset_samples,
        report.offset_secs()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Noise has one unambiguous alignment; periodic material doesn't.
    fn material(len: usize) -> Vec<f64> {
        let mut x: u64 = 0x2545_f491;
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                ((x % 20001) as f64) - 10000.0
            })
            .collect()
    }

    /// Serves fixed signals; normalized decodes come back at `normalized_rate`.
    struct FakePreprocessor {
        signals: HashMap<PathBuf, Signal>,
        normalized_rate: Option<u32>,
        decodes: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl FakePreprocessor {
        fn new(signals: Vec<(&str, Signal)>, normalized_rate: Option<u32>) -> Self {
            Self {
                signals: signals
                    .into_iter()
                    .map(|(p, s)| (PathBuf::from(p), s))
                    .collect(),
                normalized_rate,
                decodes: Mutex::new(Vec::new()),
            }
        }
    }

    impl Preprocessor for FakePreprocessor {
        fn decode(&self, path: &Path, options: &DecodeOptions) -> AnalysisResult<Signal> {
            self.decodes.lock().push((path.to_path_buf(), options.normalize));
            let mut signal = self
                .signals
                .get(path)
                .cloned()
                .ok_or_else(|| AnalysisError::SourceNotFound(path.to_path_buf()))?;
            if options.normalize {
                if let Some(rate) = self.normalized_rate {
                    signal.sample_rate = rate;
                }
            }
            Ok(signal)
        }

        fn native_sample_rate(&self, path: &Path) -> AnalysisResult<u32> {
            self.signals
                .get(path)
                .map(|s| s.sample_rate)
                .ok_or_else(|| AnalysisError::SourceNotFound(path.to_path_buf()))
        }
    }

    #[test]
    fn later_start_in_second_trims_first() {
        let m = material(3000);
        let s1 = Signal::new(m[..2000].to_vec(), 1000);
        let s2 = Signal::new(m[120..2120].to_vec(), 1000);

        let offset = align_signals(&s1, &s2).unwrap();
        assert_eq!(offset.target, TrimTarget::First);
        assert_eq!(offset.samples, 120);
    }

    #[test]
    fn later_start_in_first_trims_second() {
        let m = material(3000);
        let s1 = Signal::new(m[64..2064].to_vec(), 1000);
        let s2 = Signal::new(m[..2000].to_vec(), 1000);

        let offset = align_signals(&s1, &s2).unwrap();
        assert_eq!(offset.target, TrimTarget::Second);
        assert_eq!(offset.samples, 64);
    }

    #[test]
    fn align_signals_rejects_rate_mismatch() {
        let s1 = Signal::new(material(100), 44100);
        let s2 = Signal::new(material(100), 48000);
        assert!(matches!(
            align_signals(&s1, &s2),
            Err(AnalysisError::SampleRateMismatch {
                first: 44100,
                second: 48000
            })
        ));
    }

    #[test]
    fn same_path_is_decoded_once() {
        let pre = FakePreprocessor::new(vec![("a.ogg", Signal::new(material(500), 1000))], None);
        let report = align_files(
            &pre,
            Path::new("a.ogg"),
            Path::new("a.ogg"),
            &DecodeOptions::default(),
        )
        .unwrap();

        assert_eq!(pre.decodes.lock().len(), 1);
        assert_eq!(report.offset_samples, 0);
        assert!(!report.forced_normalize);
    }

    #[test]
    fn rate_mismatch_retries_with_normalization() {
        let m = material(3000);
        let pre = FakePreprocessor::new(
            vec![
                ("a.ogg", Signal::new(m[..2000].to_vec(), 44100)),
                ("b.ogg", Signal::new(m[50..2050].to_vec(), 48000)),
            ],
            Some(192000),
        );
        let options = DecodeOptions::default();

        let report = align_files(&pre, Path::new("a.ogg"), Path::new("b.ogg"), &options).unwrap();

        assert!(report.forced_normalize);
        assert_eq!(report.sample_rate, 192000);
        assert_eq!(report.file, PathBuf::from("a.ogg"));
        assert_eq!(report.offset_samples, 50);
        // The caller's options are untouched
        assert!(!options.normalize);
        let decodes = pre.decodes.lock();
        assert_eq!(decodes.len(), 4);
        assert!(decodes[2].1 && decodes[3].1);
    }

    #[test]
    fn persistent_mismatch_is_fatal() {
        let pre = FakePreprocessor::new(
            vec![
                ("a.ogg", Signal::new(material(100), 44100)),
                ("b.ogg", Signal::new(material(100), 48000)),
            ],
            None,
        );
        let result = align_files(
            &pre,
            Path::new("a.ogg"),
            Path::new("b.ogg"),
            &DecodeOptions::default(),
        );
        assert!(matches!(
            result,
            Err(AnalysisError::SampleRateMismatch { .. })
        ));
    }

    #[test]
    fn instruction_lines_use_requested_unit() {
        let report = AlignmentReport {
            file: PathBuf::from("b.ogg"),
            target: TrimTarget::Second,
            offset_samples: 22050,
            sample_rate: 44100,
            forced_normalize: false,
        };
        assert_eq!(
            report.instruction(OffsetUnit::Samples),
            "b.ogg needs 'ffmpeg -af atrim=start_sample=22050' cut to get in sync"
        );
        assert_eq!(
            report.instruction(OffsetUnit::Seconds),
            "b.ogg needs 'ffmpeg -ss 0.5' cut to get in sync"
        );
    }
}
