//! Audio analysis: correlation, preprocessing and the two engines.
//!
//! # Architecture
//!
//! 1. **Preprocessing** (`ffmpeg`): decode a media file to a mono [`Signal`]
//!    through a chain of FFmpeg transforms.
//!
//! 2. **Correlation** (`correlation`): FFT cross-correlation of two sample
//!    sequences.
//!
//! 3. **Alignment** (`alignment`): sync offset between two recordings.
//!
//! 4. **Loop search** (`loop_search`): best self-similar cut point inside one
//!    recording.
//!
//! # Usage
//!
//! ```ignore
//! use crosslooper_core::analysis::{find_loop, FfmpegPreprocessor, Preprocessor};
//!
//! let pre = FfmpegPreprocessor::new(false);
//! let signal = pre.decode(path, &config.decode_options())?;
//! let result = find_loop(&signal, &config, None);
//! ```

pub mod alignment;
pub mod correlation;
pub mod ffmpeg;
pub mod loop_search;
mod types;

pub use alignment::{align_files, align_signals, decode_pair, AlignmentReport, TrimTarget};
pub use correlation::{cross_correlate, pad_size_for, Correlation, Correlator, Shift};
pub use ffmpeg::{FfmpegPreprocessor, Preprocessor, Transform, DENOISE_PASSES};
pub use loop_search::{
    find_loop, normalized_confidence, LoopCandidate, LoopResult, LoopSearch, SearchSpace,
    LOOP_START_MAX_FRACTION,
};
pub use types::{AnalysisError, AnalysisResult, DecodeOptions, Signal};
