//! Terminal progress bars.
//!
//! Batch runs show a folder bar counting tracks plus one bar per worker
//! counting search steps. Bars are only driven from [`BatchEvent`]s, so the
//! scheduler's progress consumer stays the single owner of the counts.

use crossbeam_channel::Receiver;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crosslooper_core::orchestrator::{BatchEvent, TrackOutcome, TrackReport};

use crate::describe_outcome;

const FOLDER_TEMPLATE: &str =
    "{prefix:>8} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";
const SEARCH_TEMPLATE: &str = "{prefix:>8} [{bar:40.green/white}] {pos}/{len} {wide_msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Bar for a single-file loop search.
pub fn search_bar(hidden: bool) -> ProgressBar {
    let bar = if hidden {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    bar.set_style(style(SEARCH_TEMPLATE));
    bar.set_prefix("search");
    bar
}

/// Line printed above the bars when a track finishes.
///
/// Only new tags are shown. Failures are already logged by the scheduler.
fn finished_line(report: &TrackReport) -> Option<String> {
    match &report.result {
        Ok(outcome @ (TrackOutcome::Tagged { .. } | TrackOutcome::Converted { .. })) => {
            Some(describe_outcome(&report.path, outcome))
        }
        Ok(_) | Err(_) => None,
    }
}

/// Bars for a batch run.
pub struct BatchProgress {
    multi: MultiProgress,
    folder: ProgressBar,
    workers: Vec<ProgressBar>,
}

impl BatchProgress {
    pub fn new(hidden: bool) -> Self {
        let multi = if hidden {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        let folder = multi.add(ProgressBar::new(0));
        folder.set_style(style(FOLDER_TEMPLATE));
        folder.set_prefix("folder");
        Self {
            multi,
            folder,
            workers: Vec::new(),
        }
    }

    /// Consume events until the scheduler drops its sender.
    pub fn drive(mut self, events: Receiver<BatchEvent>) {
        for event in events.iter() {
            self.handle(event);
        }
        self.finish();
    }

    fn handle(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::Started { total, workers } => {
                self.folder.set_length(total as u64);
                for worker in 0..workers {
                    let bar = self.multi.add(ProgressBar::new(0));
                    bar.set_style(style(SEARCH_TEMPLATE));
                    bar.set_prefix(format!("#{}", worker));
                    self.workers.push(bar);
                }
            }
            BatchEvent::TrackStarted { worker, path, .. } => {
                if let Some(bar) = self.workers.get(worker) {
                    bar.reset();
                    bar.set_length(0);
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    bar.set_message(name);
                }
            }
            BatchEvent::SearchProgress {
                worker,
                done,
                total,
            } => {
                if let Some(bar) = self.workers.get(worker) {
                    bar.set_length(total as u64);
                    bar.set_position(done as u64);
                }
            }
            BatchEvent::TrackFinished {
                report, completed, ..
            } => {
                self.folder.set_position(completed as u64);
                if let Some(line) = finished_line(&report) {
                    // Printing above the bars keeps them intact
                    let _ = self.multi.println(line);
                }
            }
        }
    }

    fn finish(&self) {
        for bar in &self.workers {
            bar.finish_and_clear();
        }
        self.folder.finish();
    }
}
