//! Command-line arguments.
//!
//! Flags left unset fall back to the settings file, which falls back to the
//! built-in defaults.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use crosslooper_core::config::SearchConfig;
use crosslooper_core::models::{OffsetUnit, OperationMode};

#[derive(Parser, Debug)]
#[command(name = "crosslooper", version)]
#[command(about = "Calculate loop metadata and sync offsets of audio files. ffmpeg needs to be available.")]
pub struct Cli {
    /// Settings file (default: crosslooper.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output: transform command lines and per-candidate scores
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write the log to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find the loop point of one file and write loop tags
    Loop(LoopArgs),
    /// Report the cut that brings two recordings in sync
    Align(AlignArgs),
    /// Loop-tag every file under a directory
    Batch(BatchArgs),
    /// Settings file helpers
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Command {
    /// Correlation mode of the command, if it runs one.
    pub fn mode(&self) -> Option<OperationMode> {
        match self {
            Command::Loop(_) | Command::Batch(_) => Some(OperationMode::LoopSearch),
            Command::Align(_) => Some(OperationMode::Align),
            Command::Config(_) => None,
        }
    }
}

/// Preprocessing flags shared by every mode.
#[derive(Args, Debug, Default)]
pub struct DecodeArgs {
    /// Only look at the first X seconds of the input
    #[arg(short, long, value_name = "SECONDS")]
    pub take: Option<f64>,

    /// Loudness-normalize before analysis (forced on when sample rates differ)
    #[arg(short, long)]
    pub normalize: bool,

    /// Denoise before analysis, in case of failure
    #[arg(short, long)]
    pub denoise: bool,

    /// Low-pass cutoff in Hz; 0 is off
    #[arg(short, long, value_name = "HZ")]
    pub lowpass: Option<f64>,
}

impl DecodeArgs {
    fn apply(&self, config: &mut SearchConfig) {
        if self.take.is_some() {
            config.take_seconds = self.take;
        }
        if self.normalize {
            config.normalize = true;
        }
        if self.denoise {
            config.denoise = true;
        }
        if let Some(hz) = self.lowpass {
            config.lowpass_hz = hz;
        }
    }
}

/// Loop search flags.
#[derive(Args, Debug, Default)]
pub struct SearchArgs {
    #[command(flatten)]
    pub decode: DecodeArgs,

    /// Minimum loop start position in seconds
    #[arg(long, value_name = "SECONDS")]
    pub loop_start_min: Option<f64>,

    /// Maximum loop start position in seconds
    #[arg(long, value_name = "SECONDS")]
    pub loop_start_max: Option<f64>,

    /// Minimum loop end position in seconds
    #[arg(long, value_name = "SECONDS")]
    pub loop_end_min: Option<f64>,

    /// Minimum loop length in seconds
    #[arg(long, value_name = "SECONDS")]
    pub loop_len_min: Option<f64>,

    /// Resolution of the loop search in seconds
    #[arg(long, value_name = "SECONDS")]
    pub loop_search_step: Option<f64>,

    /// Snippet length for the loop search in seconds
    #[arg(long, value_name = "SECONDS")]
    pub loop_search_len: Option<f64>,

    /// Overwrite existing loop tags
    #[arg(long)]
    pub loop_force: bool,

    /// Skip the file(s)
    #[arg(long)]
    pub skip: bool,
}

impl SearchArgs {
    /// Layer these flags over `base`.
    pub fn apply(&self, base: &SearchConfig) -> SearchConfig {
        let mut config = base.clone();
        self.decode.apply(&mut config);

        let numbers = [
            (self.loop_start_min, &mut config.loop_start_min),
            (self.loop_end_min, &mut config.loop_end_min),
            (self.loop_len_min, &mut config.loop_len_min),
            (self.loop_search_step, &mut config.search_step),
            (self.loop_search_len, &mut config.search_len),
        ];
        for (flag, field) in numbers {
            if let Some(value) = flag {
                *field = value;
            }
        }
        if self.loop_start_max.is_some() {
            config.loop_start_max = self.loop_start_max;
        }
        if self.loop_force {
            config.force_overwrite = true;
        }
        if self.skip {
            config.skip = true;
        }
        config
    }
}

#[derive(Args, Debug)]
pub struct LoopArgs {
    /// Media file to loop
    pub file: PathBuf,

    #[command(flatten)]
    pub search: SearchArgs,

    /// Print the result without writing tags
    #[arg(long)]
    pub dry_run: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AlignArgs {
    /// First media file
    pub in1: PathBuf,

    /// Second media file (default: the first one)
    pub in2: Option<PathBuf>,

    #[command(flatten)]
    pub decode: DecodeArgs,

    /// Show the offset in samples instead of seconds
    #[arg(long)]
    pub samples: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl AlignArgs {
    pub fn unit(&self) -> OffsetUnit {
        if self.samples {
            OffsetUnit::Samples
        } else {
            OffsetUnit::Seconds
        }
    }

    /// Layer the decode flags over `base`.
    pub fn apply(&self, base: &SearchConfig) -> SearchConfig {
        let mut config = base.clone();
        self.decode.apply(&mut config);
        config
    }
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Directory containing audio files to loop (default: Audio/BGM)
    #[arg(long)]
    pub indir: Option<PathBuf>,

    /// TOML file with per-track presets
    #[arg(long, conflicts_with = "preset_dir")]
    pub presetconf: Option<PathBuf>,

    /// Preset library to pick a file from by game title
    #[arg(long, requires = "game_title")]
    pub preset_dir: Option<PathBuf>,

    /// Game title used to pick a preset file from --preset-dir
    #[arg(long, requires = "preset_dir")]
    pub game_title: Option<String>,

    /// Number of worker threads (default: all hardware threads)
    #[arg(long)]
    pub threads: Option<usize>,

    #[command(flatten)]
    pub search: SearchArgs,

    /// Compute tags without writing them
    #[arg(long)]
    pub dry_run: bool,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a commented default settings file
    Init {
        /// Where to write the file
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
