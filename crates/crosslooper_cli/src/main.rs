//! crosslooper command-line tool.
//!
//! Usage:
//!   crosslooper loop track.ogg
//!   crosslooper align a.flac b.flac --samples
//!   crosslooper batch --indir Audio/BGM --presetconf presets.toml
//!   crosslooper config init crosslooper.toml

mod args;
mod progress;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crosslooper_core::analysis::{align_files, FfmpegPreprocessor};
use crosslooper_core::config::{find_preset_for_title, ConfigManager, PresetSet, Settings};
use crosslooper_core::logging::{init_tracing_with_file, LogLevel, MessagePrefix};
use crosslooper_core::orchestrator::{BatchError, BatchScheduler, Track, TrackOutcome, TrackProcessor};
use crosslooper_core::tags::VorbisCommentBackend;

use args::{AlignArgs, BatchArgs, Cli, Command, ConfigCommand, LoopArgs};
use progress::{search_bar, BatchProgress};

const DEFAULT_CONFIG_FILE: &str = "crosslooper.toml";

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", MessagePrefix::Error.format(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Command::Config(ConfigCommand::Init { path, force }) = &cli.command {
        return init_config(path, *force);
    }

    let settings = load_settings(cli.config.as_deref())?;

    let level = LogLevel::from_flags(cli.verbose, cli.quiet, settings.logging.level);
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| settings.logging.file.as_ref().map(PathBuf::from));
    let _guard = init_tracing_with_file(level, log_file.as_deref())
        .context("Failed to open log file")?;

    if let Some(mode) = cli.command.mode() {
        tracing::debug!("crosslooper {} ({} mode)", crosslooper_core::version(), mode);
    }

    let preprocessor = FfmpegPreprocessor::new(cli.verbose);
    match &cli.command {
        Command::Loop(args) => run_loop(args, &settings, &preprocessor, cli.quiet),
        Command::Align(args) => run_align(args, &settings, &preprocessor),
        Command::Batch(args) => run_batch(args, &settings, &preprocessor, cli.quiet),
        Command::Config(_) => Ok(ExitCode::SUCCESS),
    }
}

/// Explicit `--config` must exist; the default file is optional.
fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => {
            let mut manager = ConfigManager::new(path);
            manager
                .load()
                .with_context(|| format!("Failed to load settings from {}", path.display()))?;
            Ok(manager.into_settings())
        }
        None => {
            let mut manager = ConfigManager::new(DEFAULT_CONFIG_FILE);
            manager
                .load_or_default()
                .with_context(|| format!("Failed to load settings from {}", DEFAULT_CONFIG_FILE))?;
            Ok(manager.into_settings())
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<ExitCode> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let manager = ConfigManager::new(path);
    manager
        .save()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{}", MessagePrefix::Success.format(&format!("Wrote {}", path.display())));
    Ok(ExitCode::SUCCESS)
}

/// Human-readable line for a track outcome.
pub(crate) fn describe_outcome(path: &Path, outcome: &TrackOutcome) -> String {
    match outcome {
        TrackOutcome::Tagged { tags, .. } | TrackOutcome::Converted { tags, .. } => {
            tags.summary_line(path)
        }
        TrackOutcome::AlreadyTagged => format!("{} already has loop tags", path.display()),
        TrackOutcome::Skipped => format!("{} skipped", path.display()),
        TrackOutcome::Unsupported => {
            format!("{} can't carry loop tags, skipped", path.display())
        }
        TrackOutcome::NoLoopCandidate => format!("{} has no loop candidate", path.display()),
    }
}

fn run_loop(
    args: &LoopArgs,
    settings: &Settings,
    preprocessor: &FfmpegPreprocessor,
    quiet: bool,
) -> Result<ExitCode> {
    let config = args.search.apply(&settings.search);
    config.validate().context("Invalid search options")?;

    let track = Track::new(&args.file, &config);
    let bar = search_bar(quiet || args.json);
    let on_progress = |done: usize, total: usize| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    };

    let result = TrackProcessor::new(preprocessor, &VorbisCommentBackend)
        .with_dry_run(args.dry_run)
        .process(&track, Some(&on_progress));
    bar.finish_and_clear();
    let outcome = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", describe_outcome(&track.path, &outcome));
        if args.dry_run && outcome.tags().is_some() {
            println!("{}", MessagePrefix::Warning.format("Dry run, tags not written"));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_align(
    args: &AlignArgs,
    settings: &Settings,
    preprocessor: &FfmpegPreprocessor,
) -> Result<ExitCode> {
    let config = args.apply(&settings.search);
    config.validate().context("Invalid options")?;

    let in2 = args.in2.as_deref().unwrap_or(&args.in1);
    let report = align_files(preprocessor, &args.in1, in2, &config.decode_options())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.instruction(args.unit()));
    }
    Ok(ExitCode::SUCCESS)
}

fn load_presets(args: &BatchArgs, settings: &Settings) -> Result<PresetSet, BatchError> {
    if let (Some(dir), Some(title)) = (&args.preset_dir, &args.game_title) {
        return match find_preset_for_title(dir, title).map_err(BatchError::Presets)? {
            Some(path) => {
                tracing::info!("Using presets from {}", path.display());
                PresetSet::load(&path).map_err(BatchError::Presets)
            }
            None => {
                tracing::warn!("No preset file for '{}' in {}", title, dir.display());
                Ok(PresetSet::new())
            }
        };
    }

    let presetconf = args
        .presetconf
        .clone()
        .or_else(|| settings.batch.presetconf.as_ref().map(PathBuf::from));
    match presetconf {
        Some(path) => PresetSet::load(&path).map_err(BatchError::Presets),
        None => Ok(PresetSet::new()),
    }
}

fn run_batch(
    args: &BatchArgs,
    settings: &Settings,
    preprocessor: &FfmpegPreprocessor,
    quiet: bool,
) -> Result<ExitCode> {
    let config = args.search.apply(&settings.search);
    let presets = load_presets(args, settings)?;
    let indir = args
        .indir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.batch.indir));
    let threads = args.threads.unwrap_or(settings.batch.threads);

    let scheduler = BatchScheduler::new(preprocessor, &VorbisCommentBackend, config)
        .with_presets(presets)
        .with_threads(threads)
        .with_dry_run(args.dry_run);

    let (tx, rx) = crossbeam_channel::unbounded();
    let bars = BatchProgress::new(quiet || args.json);
    let summary = std::thread::scope(|scope| {
        let ui = scope.spawn(move || bars.drive(rx));
        let summary = scheduler.run(&indir, Some(&tx));
        // Closing the channel ends the UI loop
        drop(tx);
        let _ = ui.join();
        summary
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !quiet {
        println!("{}", MessagePrefix::Success.format(&summary.summary_line()));
    }

    Ok(if summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
