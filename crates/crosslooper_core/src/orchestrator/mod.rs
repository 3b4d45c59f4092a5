//! Track and batch orchestration.
//!
//! # Architecture
//!
//! ```text
//! BatchScheduler
//!     ├── work queue: Track(path) ... Done × workers
//!     ├── worker 0 ── TrackProcessor ──┐
//!     ├── worker 1 ── TrackProcessor ──┼── progress channel ── scheduler (single consumer)
//!     └── worker N ── TrackProcessor ──┘
//! ```
//!
//! Each [`TrackProcessor`] run reads the file's tags, decides whether a
//! search is needed, and writes the loop tags. Failures and panics become a
//! [`TrackError`] for that track only.
//!
//! # Example
//!
//! ```ignore
//! use crosslooper_core::analysis::FfmpegPreprocessor;
//! use crosslooper_core::orchestrator::BatchScheduler;
//! use crosslooper_core::tags::VorbisCommentBackend;
//!
//! let pre = FfmpegPreprocessor::new(false);
//! let summary = BatchScheduler::new(&pre, &VorbisCommentBackend, settings.search.clone())
//!     .with_threads(4)
//!     .run(Path::new("Audio/BGM"), None)?;
//! println!("{}", summary.summary_line());
//! ```

mod batch;
mod errors;
mod track;

pub use batch::{BatchEvent, BatchScheduler, BatchSummary, TrackReport, WorkItem, WorkerStats};
pub use errors::{BatchError, BatchResult, TrackError, TrackResult};
pub use track::{Track, TrackOutcome, TrackProcessor};
