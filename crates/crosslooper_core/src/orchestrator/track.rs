//! Single-track loop tagging.
//!
//! Order of checks per track:
//! 1. the file must carry Vorbis comments, else it is skipped as unsupported
//! 2. complete loop tags short-circuit (unless overwriting is forced)
//! 3. a `skip` option short-circuits
//! 4. the resolved options are validated
//! 5. a half-tagged file gets the missing form derived, no search
//! 6. otherwise decode, search, and write all four tags

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::loop_search::SearchProgressCallback;
use crate::analysis::{find_loop, LoopCandidate, Preprocessor};
use crate::config::{PresetSet, SearchConfig};
use crate::tags::{plan_tags, LoopTags, TagBackend, TagError, TagPlan, TagStore};

use super::errors::{TrackError, TrackResult};

/// One file with its fully resolved options.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub path: PathBuf,
    pub config: SearchConfig,
    /// Name of the preset applied, if any.
    pub preset: Option<String>,
}

impl Track {
    /// Track with `base` options and no preset.
    pub fn new(path: impl Into<PathBuf>, base: &SearchConfig) -> Self {
        Self {
            path: path.into(),
            config: base.clone(),
            preset: None,
        }
    }

    /// Apply the first preset matching the file stem on top of `base`.
    pub fn resolve(path: impl Into<PathBuf>, base: &SearchConfig, presets: &PresetSet) -> Self {
        let path = path.into();
        match presets.resolve_path(&path) {
            Some(preset) => {
                tracing::debug!("{}: using preset '{}'", path.display(), preset.name);
                Self {
                    config: base.with_overrides(&preset.overrides),
                    preset: Some(preset.name.clone()),
                    path,
                }
            }
            None => Self::new(path, base),
        }
    }
}

/// What happened to a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrackOutcome {
    /// A loop was found and tagged.
    Tagged {
        tags: LoopTags,
        candidate: LoopCandidate,
        /// False on dry runs.
        saved: bool,
    },
    /// One tag form was derived from the other.
    Converted { tags: LoopTags, saved: bool },
    /// All loop tags were already present.
    AlreadyTagged,
    /// The `skip` option was set.
    Skipped,
    /// The file can't carry loop tags.
    Unsupported,
    /// No offset satisfied the search constraints. Nothing was written.
    NoLoopCandidate,
}

impl TrackOutcome {
    /// Short label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            TrackOutcome::Tagged { .. } => "tagged",
            TrackOutcome::Converted { .. } => "converted",
            TrackOutcome::AlreadyTagged => "already tagged",
            TrackOutcome::Skipped => "skipped",
            TrackOutcome::Unsupported => "unsupported",
            TrackOutcome::NoLoopCandidate => "no loop found",
        }
    }

    /// Loop tags the track ended up with, if this run produced any.
    pub fn tags(&self) -> Option<&LoopTags> {
        match self {
            TrackOutcome::Tagged { tags, .. } | TrackOutcome::Converted { tags, .. } => Some(tags),
            _ => None,
        }
    }
}

/// Runs the single-track pipeline against a preprocessor and tag backend.
pub struct TrackProcessor<'a> {
    preprocessor: &'a dyn Preprocessor,
    tags: &'a dyn TagBackend,
    dry_run: bool,
}

impl<'a> TrackProcessor<'a> {
    pub fn new(preprocessor: &'a dyn Preprocessor, tags: &'a dyn TagBackend) -> Self {
        Self {
            preprocessor,
            tags,
            dry_run: false,
        }
    }

    /// Compute tags without writing them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Process one track.
    pub fn process(
        &self,
        track: &Track,
        progress: Option<SearchProgressCallback<'_>>,
    ) -> TrackResult<TrackOutcome> {
        let path = track.path.as_path();
        let config = &track.config;

        let mut store = match self.tags.open(path) {
            Ok(store) => store,
            Err(TagError::UnsupportedFormat(_)) => {
                tracing::info!("{}: not a Vorbis comment file, skipping", path.display());
                return Ok(TrackOutcome::Unsupported);
            }
            Err(e) => return Err(TrackError::tags(path, e)),
        };

        let plan = plan_tags(store.as_ref(), config.force_overwrite)
            .map_err(|e| TrackError::tags(path, e))?;

        if plan == TagPlan::AlreadyTagged {
            tracing::info!("{}: loop tags already present, skipping", path.display());
            return Ok(TrackOutcome::AlreadyTagged);
        }

        if config.skip {
            tracing::info!("{}: skipping", path.display());
            return Ok(TrackOutcome::Skipped);
        }

        config
            .validate()
            .map_err(|e| TrackError::config(path, e))?;

        let outcome = match plan {
            TagPlan::DeriveSeconds { start, length } => {
                tracing::info!(
                    "{}: converting samples loop tags to seconds loop tags",
                    path.display()
                );
                let rate = self.native_rate(path)?;
                let tags = LoopTags::from_samples(
                    start.round() as u64,
                    length.round() as u64,
                    rate,
                );
                self.write(store.as_mut(), &tags, path)?;
                TrackOutcome::Converted {
                    tags,
                    saved: !self.dry_run,
                }
            }
            TagPlan::DeriveSamples {
                start_secs,
                end_secs,
            } => {
                tracing::info!(
                    "{}: converting seconds loop tags to samples loop tags",
                    path.display()
                );
                let rate = self.native_rate(path)?;
                let tags = LoopTags::from_seconds(start_secs, end_secs, rate);
                self.write(store.as_mut(), &tags, path)?;
                TrackOutcome::Converted {
                    tags,
                    saved: !self.dry_run,
                }
            }
            TagPlan::Search => {
                let signal = self
                    .preprocessor
                    .decode(path, &config.decode_options())
                    .map_err(|e| TrackError::analysis(path, e))?;

                let result = find_loop(&signal, config, progress);
                let Some(candidate) = result.best else {
                    tracing::warn!(
                        "{}: no loop candidate ({} offsets tried, {} rejected)",
                        path.display(),
                        result.evaluated,
                        result.rejected
                    );
                    return Ok(TrackOutcome::NoLoopCandidate);
                };

                // Normalization resamples, tags must use the file's own rate
                let native = if config.normalize {
                    self.native_rate(path)?
                } else {
                    signal.sample_rate
                };
                let tags = LoopTags::from_candidate(&candidate, signal.sample_rate, native);
                self.write(store.as_mut(), &tags, path)?;
                tracing::info!("{}", tags.summary_line(path));
                TrackOutcome::Tagged {
                    tags,
                    candidate,
                    saved: !self.dry_run,
                }
            }
            TagPlan::AlreadyTagged => TrackOutcome::AlreadyTagged,
        };

        Ok(outcome)
    }

    /// Process one track, turning a panic into [`TrackError::Panicked`].
    pub fn process_catching(
        &self,
        track: &Track,
        progress: Option<SearchProgressCallback<'_>>,
    ) -> TrackResult<TrackOutcome> {
        panic::catch_unwind(AssertUnwindSafe(|| self.process(track, progress))).unwrap_or_else(
            |payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(TrackError::panicked(&track.path, message))
            },
        )
    }

    fn native_rate(&self, path: &Path) -> TrackResult<u32> {
        self.preprocessor
            .native_sample_rate(path)
            .map_err(|e| TrackError::analysis(path, e))
    }

    fn write(
        &self,
        store: &mut dyn TagStore,
        tags: &LoopTags,
        path: &Path,
    ) -> TrackResult<()> {
        tags.write_to(store);
        if self.dry_run {
            tracing::debug!("{}: dry run, not saving tags", path.display());
            return Ok(());
        }
        store.save().map_err(|e| TrackError::tags(path, e))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, AnalysisResult, DecodeOptions, Signal};
    use crate::config::PresetSet;
    use crate::tags::{MemoryTagBackend, LOOPLENGTH, LOOPSTART, LOOP_END, LOOP_START};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) const RATE: u32 = 100;

    pub(crate) fn noise(len: usize, seed: u64) -> Vec<f64> {
        let mut x = seed.max(1);
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                ((x % 20001) as f64) - 10000.0
            })
            .collect()
    }

    /// 3 s intro, an 8 s body played twice, 2 s outro at 100 Hz.
    pub(crate) fn looping_signal() -> Signal {
        let mut samples = noise(300, 7);
        let body = noise(800, 99);
        samples.extend_from_slice(&body);
        samples.extend_from_slice(&body);
        samples.extend(noise(200, 1234));
        Signal::new(samples, RATE)
    }

    pub(crate) fn search_config() -> SearchConfig {
        SearchConfig {
            loop_start_min: 1.0,
            loop_end_min: 5.0,
            search_len: 2.0,
            ..SearchConfig::default()
        }
    }

    /// Serves the same looping signal for every path. Paths containing
    /// "panic" panic, paths containing "broken" fail to decode.
    pub(crate) struct FakePreprocessor {
        pub native_rate: u32,
        pub decoded_rate: u32,
        pub decodes: AtomicUsize,
    }

    impl FakePreprocessor {
        pub(crate) fn new() -> Self {
            Self {
                native_rate: RATE,
                decoded_rate: RATE,
                decodes: AtomicUsize::new(0),
            }
        }
    }

    impl Preprocessor for FakePreprocessor {
        fn decode(&self, path: &Path, _options: &DecodeOptions) -> AnalysisResult<Signal> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            let name = path.to_string_lossy();
            if name.contains("panic") {
                panic!("decoder exploded");
            }
            if name.contains("broken") {
                return Err(AnalysisError::TransformFailed {
                    transform: "decode".to_string(),
                    path: path.to_path_buf(),
                    code: Some(1),
                });
            }
            let mut signal = looping_signal();
            signal.sample_rate = self.decoded_rate;
            Ok(signal)
        }

        fn native_sample_rate(&self, _path: &Path) -> AnalysisResult<u32> {
            Ok(self.native_rate)
        }
    }

    fn run(
        pre: &FakePreprocessor,
        backend: &MemoryTagBackend,
        track: &Track,
    ) -> TrackResult<TrackOutcome> {
        TrackProcessor::new(pre, backend).process(track, None)
    }

    #[test]
    fn searches_and_tags_untagged_track() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        backend.insert("town.ogg", &[]);

        let outcome = run(&pre, &backend, &Track::new("town.ogg", &search_config())).unwrap();

        let TrackOutcome::Tagged { tags, saved, .. } = outcome else {
            panic!("expected Tagged, got {:?}", outcome);
        };
        assert!(saved);
        assert_eq!(tags.length, 800);
        let stored = backend.tags(Path::new("town.ogg")).unwrap();
        assert_eq!(stored[LOOPSTART], tags.start.to_string());
        assert_eq!(stored[LOOPLENGTH], "800");
        assert!(stored.contains_key(LOOP_START) && stored.contains_key(LOOP_END));
    }

    #[test]
    fn tagged_track_is_left_alone() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        backend.insert("town.ogg", &[]);
        let track = Track::new("town.ogg", &search_config());

        run(&pre, &backend, &track).unwrap();
        let second = run(&pre, &backend, &track).unwrap();

        assert_eq!(second, TrackOutcome::AlreadyTagged);
        assert_eq!(pre.decodes.load(Ordering::SeqCst), 1);
        assert_eq!(backend.save_count(), 1);
    }

    #[test]
    fn force_searches_again() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        backend.insert(
            "town.ogg",
            &[
                (LOOPSTART, "1"),
                (LOOPLENGTH, "2"),
                (LOOP_START, "0.01"),
                (LOOP_END, "0.03"),
            ],
        );
        let mut config = search_config();
        config.force_overwrite = true;

        let outcome = run(&pre, &backend, &Track::new("town.ogg", &config)).unwrap();
        assert!(matches!(outcome, TrackOutcome::Tagged { .. }));
        assert_eq!(pre.decodes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn skip_is_idempotent_and_never_decodes() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        backend.insert("title.ogg", &[("TITLE", "Title")]);
        let mut config = search_config();
        config.skip = true;
        let track = Track::new("title.ogg", &config);

        let before = backend.tags(Path::new("title.ogg"));
        assert_eq!(run(&pre, &backend, &track).unwrap(), TrackOutcome::Skipped);
        assert_eq!(run(&pre, &backend, &track).unwrap(), TrackOutcome::Skipped);

        assert_eq!(pre.decodes.load(Ordering::SeqCst), 0);
        assert_eq!(backend.save_count(), 0);
        assert_eq!(backend.tags(Path::new("title.ogg")), before);
    }

    #[test]
    fn derives_seconds_from_samples_without_decoding() {
        let pre = FakePreprocessor {
            native_rate: 44100,
            ..FakePreprocessor::new()
        };
        let backend = MemoryTagBackend::new();
        backend.insert("a.flac", &[(LOOPSTART, "44100"), (LOOPLENGTH, "88200")]);

        let outcome = run(&pre, &backend, &Track::new("a.flac", &search_config())).unwrap();

        assert!(matches!(outcome, TrackOutcome::Converted { saved: true, .. }));
        assert_eq!(pre.decodes.load(Ordering::SeqCst), 0);
        let stored = backend.tags(Path::new("a.flac")).unwrap();
        assert_eq!(stored[LOOP_START], "1.0");
        assert_eq!(stored[LOOP_END], "3.0");
    }

    #[test]
    fn derives_samples_from_seconds() {
        let pre = FakePreprocessor {
            native_rate: 44100,
            ..FakePreprocessor::new()
        };
        let backend = MemoryTagBackend::new();
        backend.insert("a.ogg", &[(LOOP_START, "1.0"), (LOOP_END, "3.0")]);

        run(&pre, &backend, &Track::new("a.ogg", &search_config())).unwrap();

        let stored = backend.tags(Path::new("a.ogg")).unwrap();
        assert_eq!(stored[LOOPSTART], "44100");
        assert_eq!(stored[LOOPLENGTH], "88200");
    }

    #[test]
    fn unsupported_file_is_skipped() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        let outcome = run(&pre, &backend, &Track::new("cover.jpg", &search_config())).unwrap();
        assert_eq!(outcome, TrackOutcome::Unsupported);
        assert_eq!(pre.decodes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn no_candidate_writes_nothing() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        backend.insert("short.ogg", &[]);
        let mut config = search_config();
        // Past 47% of the 21 s signal
        config.loop_start_min = 15.0;
        config.loop_end_min = 16.0;

        let outcome = run(&pre, &backend, &Track::new("short.ogg", &config)).unwrap();

        assert_eq!(outcome, TrackOutcome::NoLoopCandidate);
        assert_eq!(backend.save_count(), 0);
        assert!(backend.tags(Path::new("short.ogg")).unwrap().is_empty());
    }

    #[test]
    fn dry_run_does_not_save() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        backend.insert("town.ogg", &[]);

        let outcome = TrackProcessor::new(&pre, &backend)
            .with_dry_run(true)
            .process(&Track::new("town.ogg", &search_config()), None)
            .unwrap();

        assert!(matches!(outcome, TrackOutcome::Tagged { saved: false, .. }));
        assert_eq!(backend.save_count(), 0);
    }

    #[test]
    fn normalized_search_is_rescaled_to_native_rate() {
        let pre = FakePreprocessor {
            native_rate: 50,
            decoded_rate: 100,
            ..FakePreprocessor::new()
        };
        let backend = MemoryTagBackend::new();
        backend.insert("town.ogg", &[]);
        let mut config = search_config();
        config.normalize = true;

        let outcome = run(&pre, &backend, &Track::new("town.ogg", &config)).unwrap();

        let tags = outcome.tags().copied().unwrap();
        assert_eq!(tags.length, 400);
    }

    #[test]
    fn decode_failure_is_a_track_error() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        backend.insert("broken.ogg", &[]);

        let err = run(&pre, &backend, &Track::new("broken.ogg", &search_config())).unwrap_err();
        assert!(matches!(err, TrackError::Analysis { .. }));
        assert_eq!(err.path(), Path::new("broken.ogg"));
    }

    #[test]
    fn panic_is_caught() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        backend.insert("panic.ogg", &[]);

        let err = TrackProcessor::new(&pre, &backend)
            .process_catching(&Track::new("panic.ogg", &search_config()), None)
            .unwrap_err();
        assert!(matches!(err, TrackError::Panicked { ref message, .. } if message == "decoder exploded"));
    }

    #[test]
    fn preset_start_past_global_max_finds_no_loop() {
        let presets = PresetSet::parse("[boss]\nloopstart = 6\n").unwrap();
        let base = SearchConfig {
            loop_start_max: Some(5.0),
            ..search_config()
        };
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        backend.insert("boss_theme.ogg", &[]);

        let track = Track::resolve("boss_theme.ogg", &base, &presets);
        assert_eq!(track.config.loop_start_min, 6.0);
        let outcome = run(&pre, &backend, &track).unwrap();

        assert_eq!(outcome, TrackOutcome::NoLoopCandidate);
        assert_eq!(backend.save_count(), 0);
    }

    #[test]
    fn invalid_options_only_fail_tracks_that_need_work() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        backend.insert(
            "done.ogg",
            &[
                (LOOPSTART, "1"),
                (LOOPLENGTH, "2"),
                (LOOP_START, "0.01"),
                (LOOP_END, "0.03"),
            ],
        );
        backend.insert("todo.ogg", &[]);
        let config = SearchConfig {
            search_step: 0.0,
            ..search_config()
        };

        let unsupported = run(&pre, &backend, &Track::new("cover.jpg", &config)).unwrap();
        assert_eq!(unsupported, TrackOutcome::Unsupported);
        let tagged = run(&pre, &backend, &Track::new("done.ogg", &config)).unwrap();
        assert_eq!(tagged, TrackOutcome::AlreadyTagged);

        let err = run(&pre, &backend, &Track::new("todo.ogg", &config)).unwrap_err();
        assert!(matches!(err, TrackError::Config { .. }));
        assert_eq!(pre.decodes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn preset_is_applied_by_stem() {
        let presets = PresetSet::parse("[title]\nskip = true\n").unwrap();
        let base = search_config();

        let title = Track::resolve("bgm/01_Title.ogg", &base, &presets);
        assert_eq!(title.preset.as_deref(), Some("title"));
        assert!(title.config.skip);

        let field = Track::resolve("bgm/02_Field.ogg", &base, &presets);
        assert_eq!(field.preset, None);
        assert_eq!(field.config, base);
    }
}
