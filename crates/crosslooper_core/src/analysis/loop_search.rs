//! Loop point search.
//!
//! Slides a short window over the start of a track and correlates it against
//! the remainder of the same track. The offset whose window best matches a
//! later passage gives the loop `[start, end)`: playing `end` onwards sounds
//! like playing `start` onwards, so jumping back from `end` to `start` is
//! seamless.
//!
//! Raw correlation peaks grow with the amount of overlapping material, which
//! shrinks as the window moves right. Every score is therefore divided by
//! `search_len * tail_len` before candidates are compared.

use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;

use super::correlation::Correlator;
use super::types::Signal;

/// Loop starts are confined to the first 47% of a track.
pub const LOOP_START_MAX_FRACTION: f64 = 0.47;

/// One scored loop candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopCandidate {
    /// First sample of the loop.
    pub start: usize,
    /// Sample the loop jumps back from (exclusive end).
    pub end: usize,
    /// `end - start` in samples.
    pub length: usize,
    /// Peak correlation magnitude.
    pub confidence: f64,
    /// Confidence divided by the compared window sizes.
    pub normalized_confidence: f64,
}

impl LoopCandidate {
    /// Loop start in seconds.
    pub fn start_secs(&self, sample_rate: u32) -> f64 {
        self.start as f64 / sample_rate as f64
    }

    /// Loop end in seconds.
    pub fn end_secs(&self, sample_rate: u32) -> f64 {
        self.end as f64 / sample_rate as f64
    }
}

/// Outcome of a full search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    /// Best candidate, if any offset satisfied the constraints.
    pub best: Option<LoopCandidate>,
    /// Number of offsets correlated.
    pub evaluated: usize,
    /// Number of offsets rejected by the length/position constraints.
    pub rejected: usize,
}

impl LoopResult {
    /// Whether a usable loop was found.
    pub fn found(&self) -> bool {
        self.best.is_some()
    }
}

/// Progress callback for the search: `(steps_done, steps_total)`.
pub type SearchProgressCallback<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Search space in samples, derived from a config and a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSpace {
    /// Total samples in the signal.
    pub total: usize,
    /// Window start at offset 0.
    pub init_start: usize,
    /// Earliest loop end at offset 0.
    pub init_end_min: usize,
    /// Window length.
    pub search_len: usize,
    /// Offset increment.
    pub step: usize,
    /// Exclusive upper bound of the offset range (may be <= 0).
    pub offset_max: i64,
    /// Shortest accepted loop.
    pub min_length: usize,
}

impl SearchSpace {
    /// Build the search space for a signal.
    pub fn new(config: &SearchConfig, signal: &Signal) -> Self {
        let total = signal.len();
        let to_samples = |secs: f64| signal.secs_to_samples(secs).max(0) as usize;

        let init_start = to_samples(config.loop_start_min);
        let init_end_min = to_samples(config.loop_end_min);
        let search_len = to_samples(config.search_len);
        let step = to_samples(config.search_step).max(1);
        let min_length = (config.loop_len_min * signal.sample_rate as f64).ceil().max(0.0) as usize;

        // We don't want to only loop a tiny piece at the end of the file.
        let cap = total as f64 * LOOP_START_MAX_FRACTION;
        let start_max = match config.loop_start_max {
            Some(secs) => (secs * signal.sample_rate as f64).min(cap),
            None => cap,
        };
        let start_max = start_max.floor() as i64;

        let offset_max =
            (total as i64 - search_len as i64).min(start_max - init_start as i64);

        Self {
            total,
            init_start,
            init_end_min,
            search_len,
            step,
            offset_max,
            min_length,
        }
    }

    /// Whether no offset will be evaluated.
    pub fn is_empty(&self) -> bool {
        self.offset_max <= 0
    }

    /// Number of offsets in the range.
    pub fn steps(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.offset_max as usize).div_ceil(self.step)
        }
    }

    /// Offsets to evaluate, in increasing order.
    pub fn offsets(&self) -> impl Iterator<Item = usize> {
        let max = self.offset_max.max(0) as usize;
        (0..max).step_by(self.step)
    }
}

/// Normalize a correlation peak by the size of the compared windows.
///
/// Returns 0 when the tail is empty.
pub fn normalized_confidence(confidence: f64, search_len: usize, tail_len: usize) -> f64 {
    let magnitude = search_len as f64 * tail_len as f64;
    if magnitude <= 0.0 {
        return 0.0;
    }
    confidence / magnitude
}

/// Loop search over a single signal.
pub struct LoopSearch<'a> {
    signal: &'a Signal,
    space: SearchSpace,
    correlator: Correlator,
}

impl<'a> LoopSearch<'a> {
    /// Prepare a search over `signal` with `config`.
    pub fn new(signal: &'a Signal, config: &SearchConfig) -> Self {
        Self {
            signal,
            space: SearchSpace::new(config, signal),
            correlator: Correlator::new(),
        }
    }

    /// The search space this search walks.
    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Score the window at one offset.
    ///
    /// Returns `None` when the window or the tail is empty.
    pub fn evaluate(&mut self, offset: usize) -> Option<LoopCandidate> {
        let space = self.space;
        let samples = &self.signal.samples;

        let start = space.init_start + offset;
        let end_min = space.init_end_min + offset;
        if start >= space.total || end_min >= space.total {
            return None;
        }

        let window_end = (start + space.search_len).min(space.total);
        let window = &samples[start..window_end];
        let tail = &samples[end_min..];
        if window.is_empty() {
            return None;
        }

        let corr = self.correlator.correlate(window, tail);
        let confidence = corr.peak();
        let end = end_min + (corr.pad_size - corr.peak_index);

        Some(LoopCandidate {
            start,
            end,
            length: end.saturating_sub(start),
            confidence,
            normalized_confidence: normalized_confidence(
                confidence,
                space.search_len,
                space.total - end_min,
            ),
        })
    }

    /// Whether a candidate satisfies the position and length constraints.
    pub fn accepts(&self, candidate: &LoopCandidate) -> bool {
        candidate.end <= self.space.total
            && candidate.end > candidate.start
            && candidate.length >= self.space.min_length
    }

    /// Walk every offset and keep the best accepted candidate.
    ///
    /// A candidate replaces the best only if its normalized confidence is
    /// strictly greater, so the earliest offset wins ties.
    pub fn run(mut self, progress: Option<SearchProgressCallback<'_>>) -> LoopResult {
        let total_steps = self.space.steps();
        let offsets: Vec<usize> = self.space.offsets().collect();

        let mut best = BestCandidate::default();
        let mut evaluated = 0;
        let mut rejected = 0;

        tracing::debug!(
            "Loop search: {} samples @ {} Hz, {} offsets (step {} samples, window {} samples)",
            self.space.total,
            self.signal.sample_rate,
            total_steps,
            self.space.step,
            self.space.search_len
        );

        for (i, offset) in offsets.into_iter().enumerate() {
            let candidate = self.evaluate(offset);
            evaluated += 1;

            match candidate {
                Some(c) if self.accepts(&c) => {
                    best.offer(c);
                    tracing::debug!(
                        "offset {} start {} end {} length {} confidence {:.3} normalized_confidence {:.6e}",
                        offset,
                        c.start,
                        c.end,
                        c.length,
                        c.confidence,
                        c.normalized_confidence
                    );
                }
                _ => rejected += 1,
            }

            if let Some(callback) = progress {
                callback(i + 1, total_steps);
            }
        }

        let best = best.into_inner();
        match &best {
            Some(b) => tracing::info!(
                "best start {} end {} length {} confidence {:.3} normalized_confidence {:.6e}",
                b.start,
                b.end,
                b.length,
                b.confidence,
                b.normalized_confidence
            ),
            None => tracing::debug!("No loop candidate satisfied the constraints"),
        }

        LoopResult {
            best,
            evaluated,
            rejected,
        }
    }
}

/// Running maximum over candidates.
///
/// A candidate replaces the current best only when its normalized confidence
/// is strictly greater, so the first of equal scores is kept and a score of
/// zero never wins.
#[derive(Debug, Default)]
struct BestCandidate {
    best: Option<LoopCandidate>,
    score: f64,
}

impl BestCandidate {
    fn offer(&mut self, candidate: LoopCandidate) {
        if candidate.normalized_confidence > self.score {
            self.score = candidate.normalized_confidence;
            self.best = Some(candidate);
        }
    }

    fn into_inner(self) -> Option<LoopCandidate> {
        self.best
    }
}

/// Search `signal` for the best loop with `config`.
pub fn find_loop(
    signal: &Signal,
    config: &SearchConfig,
    progress: Option<SearchProgressCallback<'_>>,
) -> LoopResult {
    LoopSearch::new(signal, config).run(progress)
}
