//! Directory mode: loop-tag every file under a folder with a worker pool.
//!
//! The scheduler fills a work queue with one [`WorkItem::Track`] per file,
//! then one [`WorkItem::Done`] per worker. Each worker takes items until it
//! sees a `Done`. Workers report every dequeued file on a progress channel;
//! the scheduler thread is the only consumer of that channel and the only
//! place that counts completions.
//!
//! A track that hangs inside an external transform hangs its worker: there is
//! no timeout or cancellation.

use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::analysis::Preprocessor;
use crate::config::{resolve_input_dir, PresetSet, SearchConfig};
use crate::tags::TagBackend;

use super::errors::{BatchError, BatchResult, TrackResult};
use super::track::{Track, TrackOutcome, TrackProcessor};

/// Entry in the work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// A file to process.
    Track(PathBuf),
    /// Sentinel: the receiving worker exits.
    Done,
}

/// Result of one dequeued file.
#[derive(Debug)]
pub struct TrackReport {
    /// Worker that processed the file.
    pub worker: usize,
    pub path: PathBuf,
    /// Preset applied, if any.
    pub preset: Option<String>,
    pub result: TrackResult<TrackOutcome>,
}

/// What the scheduler forwards to an observer.
#[derive(Debug)]
pub enum BatchEvent {
    /// Workers are about to start.
    Started { total: usize, workers: usize },
    /// A worker took a file from the queue.
    TrackStarted {
        worker: usize,
        path: PathBuf,
        preset: Option<String>,
    },
    /// Loop search progress of a worker's current file.
    SearchProgress {
        worker: usize,
        done: usize,
        total: usize,
    },
    /// A file is finished. `completed` counts finished files so far.
    TrackFinished {
        report: TrackReport,
        completed: usize,
        total: usize,
    },
}

/// Per-worker statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker: usize,
    /// Files processed.
    pub processed: usize,
    /// Sentinels received (1 for a worker that exited normally).
    pub sentinels_seen: usize,
}

/// Totals for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Files found.
    pub total: usize,
    /// Files reported back by workers.
    pub completed: usize,
    pub tagged: usize,
    pub converted: usize,
    pub already_tagged: usize,
    pub skipped: usize,
    pub unsupported: usize,
    pub no_candidate: usize,
    pub failed: usize,
    pub workers: Vec<WorkerStats>,
}

impl BatchSummary {
    fn record(&mut self, result: &TrackResult<TrackOutcome>) {
        self.completed += 1;
        match result {
            Ok(TrackOutcome::Tagged { .. }) => self.tagged += 1,
            Ok(TrackOutcome::Converted { .. }) => self.converted += 1,
            Ok(TrackOutcome::AlreadyTagged) => self.already_tagged += 1,
            Ok(TrackOutcome::Skipped) => self.skipped += 1,
            Ok(TrackOutcome::Unsupported) => self.unsupported += 1,
            Ok(TrackOutcome::NoLoopCandidate) => self.no_candidate += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// One-line summary.
    pub fn summary_line(&self) -> String {
        format!(
            "{} files: {} tagged, {} converted, {} already tagged, {} skipped, \
             {} unsupported, {} without loop, {} failed",
            self.total,
            self.tagged,
            self.converted,
            self.already_tagged,
            self.skipped,
            self.unsupported,
            self.no_candidate,
            self.failed
        )
    }
}

/// Messages from workers to the scheduler.
enum WorkerMessage {
    Started {
        worker: usize,
        path: PathBuf,
        preset: Option<String>,
    },
    Progress {
        worker: usize,
        done: usize,
        total: usize,
    },
    Finished(TrackReport),
}

/// Fixed-size worker pool over a directory.
pub struct BatchScheduler<'a> {
    preprocessor: &'a dyn Preprocessor,
    tags: &'a dyn TagBackend,
    base: SearchConfig,
    presets: PresetSet,
    threads: usize,
    dry_run: bool,
}

impl<'a> BatchScheduler<'a> {
    /// Create a scheduler with `base` options for every file.
    pub fn new(
        preprocessor: &'a dyn Preprocessor,
        tags: &'a dyn TagBackend,
        base: SearchConfig,
    ) -> Self {
        Self {
            preprocessor,
            tags,
            base,
            presets: PresetSet::new(),
            threads: 0,
            dry_run: false,
        }
    }

    /// Per-file presets.
    pub fn with_presets(mut self, presets: PresetSet) -> Self {
        self.presets = presets;
        self
    }

    /// Worker count; 0 uses every hardware thread.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Compute tags without writing them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Workers used for `file_count` files.
    pub fn worker_count(&self, file_count: usize) -> usize {
        if file_count == 0 {
            return 0;
        }
        let wanted = if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        };
        wanted.clamp(1, file_count)
    }

    /// List every file under `dir`, sorted.
    pub fn collect_files(dir: &Path) -> BatchResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|source| BatchError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Process every file under `dir`.
    ///
    /// Fails only before any work starts: missing directory, file instead of
    /// a directory, invalid base options, unreadable listing.
    pub fn run(
        &self,
        dir: &Path,
        observer: Option<&Sender<BatchEvent>>,
    ) -> BatchResult<BatchSummary> {
        let dir = resolve_input_dir(dir).map_err(BatchError::InputDir)?;
        self.base.validate().map_err(BatchError::Config)?;
        let files = Self::collect_files(&dir)?;
        tracing::info!("Found {} files under {}", files.len(), dir.display());
        self.run_files(files, observer)
    }

    /// Process an explicit list of files.
    pub fn run_files(
        &self,
        files: Vec<PathBuf>,
        observer: Option<&Sender<BatchEvent>>,
    ) -> BatchResult<BatchSummary> {
        let total = files.len();
        let workers = self.worker_count(total);
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };

        let notify = |event: BatchEvent| {
            if let Some(tx) = observer {
                // Observer may have gone away; the batch carries on
                let _ = tx.send(event);
            }
        };
        notify(BatchEvent::Started { total, workers });

        if workers == 0 {
            return Ok(summary);
        }

        let (work_tx, work_rx) = crossbeam_channel::unbounded::<WorkItem>();
        let (progress_tx, progress_rx) = crossbeam_channel::unbounded::<WorkerMessage>();

        // The queue is unbounded and we hold a receiver, so sends can't fail
        for path in files {
            let _ = work_tx.send(WorkItem::Track(path));
        }
        for _ in 0..workers {
            let _ = work_tx.send(WorkItem::Done);
        }
        drop(work_tx);

        tracing::debug!("Starting {} workers for {} files", workers, total);

        let stats = std::thread::scope(|scope| -> BatchResult<Vec<WorkerStats>> {
            let mut handles = Vec::with_capacity(workers);
            for worker in 0..workers {
                let rx = work_rx.clone();
                let tx = progress_tx.clone();
                let handle = std::thread::Builder::new()
                    .name(format!("crosslooper-worker-{}", worker))
                    .spawn_scoped(scope, move || self.worker_loop(worker, rx, tx))
                    .map_err(BatchError::Spawn)?;
                handles.push(handle);
            }
            drop(progress_tx);

            // Single consumer: ends when every worker has dropped its sender
            for message in progress_rx.iter() {
                match message {
                    WorkerMessage::Started {
                        worker,
                        path,
                        preset,
                    } => notify(BatchEvent::TrackStarted {
                        worker,
                        path,
                        preset,
                    }),
                    WorkerMessage::Progress {
                        worker,
                        done,
                        total,
                    } => notify(BatchEvent::SearchProgress {
                        worker,
                        done,
                        total,
                    }),
                    WorkerMessage::Finished(report) => {
                        summary.record(&report.result);
                        if let Err(e) = &report.result {
                            tracing::error!("{}", e);
                        }
                        notify(BatchEvent::TrackFinished {
                            report,
                            completed: summary.completed,
                            total,
                        });
                    }
                }
            }

            Ok(handles
                .into_iter()
                .enumerate()
                .map(|(worker, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        tracing::error!("Worker {} panicked", worker);
                        WorkerStats {
                            worker,
                            ..Default::default()
                        }
                    })
                })
                .collect())
        })?;

        summary.workers = stats;
        tracing::info!("{}", summary.summary_line());
        Ok(summary)
    }

    fn worker_loop(
        &self,
        worker: usize,
        queue: Receiver<WorkItem>,
        progress: Sender<WorkerMessage>,
    ) -> WorkerStats {
        let processor = TrackProcessor::new(self.preprocessor, self.tags).with_dry_run(self.dry_run);
        let mut stats = WorkerStats {
            worker,
            ..Default::default()
        };

        while let Ok(item) = queue.recv() {
            let path = match item {
                WorkItem::Track(path) => path,
                WorkItem::Done => {
                    stats.sentinels_seen += 1;
                    break;
                }
            };

            let track = Track::resolve(path, &self.base, &self.presets);
            let _ = progress.send(WorkerMessage::Started {
                worker,
                path: track.path.clone(),
                preset: track.preset.clone(),
            });

            let on_progress = |done: usize, total: usize| {
                let _ = progress.send(WorkerMessage::Progress {
                    worker,
                    done,
                    total,
                });
            };
            let result = processor.process_catching(&track, Some(&on_progress));
            stats.processed += 1;

            let _ = progress.send(WorkerMessage::Finished(TrackReport {
                worker,
                path: track.path,
                preset: track.preset,
                result,
            }));
        }

        tracing::debug!("Worker {} exiting after {} files", worker, stats.processed);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_tracing;
    use crate::orchestrator::track::tests::{search_config, FakePreprocessor};
    use crate::orchestrator::TrackError;
    use crate::tags::{MemoryTagBackend, LOOPSTART};
    use std::fs;
    use tempfile::tempdir;

    fn backend_with(paths: &[&str]) -> MemoryTagBackend {
        let backend = MemoryTagBackend::new();
        for p in paths {
            backend.insert(*p, &[]);
        }
        backend
    }

    fn files(paths: &[&str]) -> Vec<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn worker_count_is_clamped() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        let scheduler = BatchScheduler::new(&pre, &backend, search_config()).with_threads(8);

        assert_eq!(scheduler.worker_count(0), 0);
        assert_eq!(scheduler.worker_count(3), 3);
        assert_eq!(scheduler.worker_count(100), 8);

        let auto = BatchScheduler::new(&pre, &backend, search_config());
        assert!(auto.worker_count(1000) >= 1);
        assert_eq!(auto.worker_count(1), 1);
    }

    #[test]
    fn every_file_is_reported_once() {
        init_test_tracing();
        let names = ["a.ogg", "b.ogg", "c.ogg", "d.ogg", "e.ogg", "f.ogg", "g.ogg"];
        let pre = FakePreprocessor::new();
        let backend = backend_with(&names);
        let (tx, rx) = crossbeam_channel::unbounded();

        let summary = BatchScheduler::new(&pre, &backend, search_config())
            .with_threads(3)
            .run_files(files(&names), Some(&tx))
            .unwrap();
        drop(tx);

        assert_eq!(summary.total, 7);
        assert_eq!(summary.completed, 7);
        assert_eq!(summary.tagged, 7);

        let mut finished = Vec::new();
        let mut counts = Vec::new();
        for event in rx.iter() {
            if let BatchEvent::TrackFinished {
                report, completed, ..
            } = event
            {
                finished.push(report.path);
                counts.push(completed);
            }
        }
        finished.sort();
        assert_eq!(finished, files(&names));
        // Strictly increasing up to the total
        assert_eq!(counts, (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn every_worker_sees_exactly_one_sentinel() {
        let names = ["a.ogg", "b.ogg", "c.ogg", "d.ogg", "e.ogg"];
        let pre = FakePreprocessor::new();
        let backend = backend_with(&names);

        let summary = BatchScheduler::new(&pre, &backend, search_config())
            .with_threads(4)
            .run_files(files(&names), None)
            .unwrap();

        assert_eq!(summary.workers.len(), 4);
        assert!(summary.workers.iter().all(|w| w.sentinels_seen == 1));
        let processed: usize = summary.workers.iter().map(|w| w.processed).sum();
        assert_eq!(processed, 5);
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let names = ["a.ogg", "broken.ogg", "panic.ogg", "cover.jpg", "z.ogg"];
        let pre = FakePreprocessor::new();
        // cover.jpg is not registered: unsupported
        let backend = backend_with(&["a.ogg", "broken.ogg", "panic.ogg", "z.ogg"]);
        let (tx, rx) = crossbeam_channel::unbounded();

        let summary = BatchScheduler::new(&pre, &backend, search_config())
            .with_threads(2)
            .run_files(files(&names), Some(&tx))
            .unwrap();
        drop(tx);

        assert_eq!(summary.completed, 5);
        assert_eq!(summary.tagged, 2);
        assert_eq!(summary.unsupported, 1);
        assert_eq!(summary.failed, 2);

        let panicked = rx.iter().any(|e| {
            matches!(
                e,
                BatchEvent::TrackFinished {
                    report: TrackReport {
                        result: Err(TrackError::Panicked { .. }),
                        ..
                    },
                    ..
                }
            )
        });
        assert!(panicked);
    }

    #[test]
    fn presets_apply_per_file() {
        let names = ["bgm/01_title.ogg", "bgm/02_town.ogg"];
        let pre = FakePreprocessor::new();
        let backend = backend_with(&names);
        let presets = PresetSet::parse("[title]\nskip = true\n").unwrap();

        let summary = BatchScheduler::new(&pre, &backend, search_config())
            .with_presets(presets)
            .with_threads(2)
            .run_files(files(&names), None)
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.tagged, 1);
        assert!(backend.tags(Path::new("bgm/01_title.ogg")).unwrap().is_empty());
        assert!(backend
            .tags(Path::new("bgm/02_town.ogg"))
            .unwrap()
            .contains_key(LOOPSTART));
    }

    #[test]
    fn empty_list_starts_no_workers() {
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        let summary = BatchScheduler::new(&pre, &backend, search_config())
            .run_files(Vec::new(), None)
            .unwrap();
        assert_eq!(summary.completed, 0);
        assert!(summary.workers.is_empty());
    }

    #[test]
    fn collects_files_recursively_in_order() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.ogg"), b"").unwrap();
        fs::write(dir.path().join("a.ogg"), b"").unwrap();
        fs::write(dir.path().join("sub").join("c.flac"), b"").unwrap();

        let found = BatchScheduler::collect_files(dir.path()).unwrap();

        assert_eq!(
            found,
            vec![
                dir.path().join("a.ogg"),
                dir.path().join("b.ogg"),
                dir.path().join("sub").join("c.flac"),
            ]
        );
    }

    #[test]
    fn run_rejects_bad_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("track.ogg");
        fs::write(&file, b"").unwrap();
        let pre = FakePreprocessor::new();
        let backend = MemoryTagBackend::new();
        let scheduler = BatchScheduler::new(&pre, &backend, search_config());

        assert!(matches!(
            scheduler.run(&file, None),
            Err(BatchError::InputDir(_))
        ));
        assert!(matches!(
            scheduler.run(&dir.path().join("missing"), None),
            Err(BatchError::InputDir(_))
        ));
    }
}
