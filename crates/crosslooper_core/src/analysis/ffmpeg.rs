//! Preprocessing pipeline.
//!
//! Turns a media file into a mono [`Signal`] by running a chain of FFmpeg
//! transforms inside a scratch directory and reading the final WAV back.
//! The chain is: decode to 16-bit PCM (optionally truncated), loudness
//! normalization, two denoise passes, low-pass. Only the decode is always on.
//!
//! The [`Preprocessor`] trait is the seam the engines depend on, so tests can
//! hand them synthetic signals without FFmpeg installed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::analysis::types::{AnalysisError, AnalysisResult, DecodeOptions, Signal};
use crate::logging::MessagePrefix;

/// Loudness normalization filter (EBU R128 target, linear mode).
pub const LOUDNORM_FILTER: &str =
    "[0:0]loudnorm=i=-23.0:lra=7.0:tp=-2.0:offset=4.45:linear=true:print_format=json[norm0]";

/// Spectral denoise filter.
pub const DENOISE_FILTER: &str = "afftdn=nf=-25";

/// The denoise filter is applied this many times in a row.
pub const DENOISE_PASSES: usize = 2;

/// Produces analysis signals from media files.
pub trait Preprocessor: Send + Sync {
    /// Decode `path` into a mono signal, applying the transforms in `options`.
    fn decode(&self, path: &Path, options: &DecodeOptions) -> AnalysisResult<Signal>;

    /// Sample rate of the first audio stream as stored in the file.
    ///
    /// May differ from the decoded rate: loudness normalization resamples.
    fn native_sample_rate(&self, path: &Path) -> AnalysisResult<u32>;
}

/// One external transform in the chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// Decode the first audio stream to 16-bit PCM.
    Decode { take_seconds: Option<f64> },
    /// Loudness normalization.
    Normalize,
    /// One denoise pass.
    Denoise,
    /// Low-pass at the given cutoff in Hz.
    Lowpass(f64),
}

impl Transform {
    /// Short name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Decode { .. } => "decode",
            Transform::Normalize => "loudnorm",
            Transform::Denoise => "afftdn",
            Transform::Lowpass(_) => "lowpass",
        }
    }

    /// FFmpeg arguments reading `input` and writing `output`.
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-nostdin".into(), "-i".into()];
        args.push(input.as_os_str().to_owned());

        match self {
            Transform::Decode { take_seconds } => {
                if let Some(take) = take_seconds {
                    args.push("-t".into());
                    args.push(take.to_string().into());
                }
                args.extend(["-c:a", "pcm_s16le", "-map", "0:a"].map(OsString::from));
            }
            Transform::Normalize => {
                args.extend(
                    [
                        "-filter_complex",
                        LOUDNORM_FILTER,
                        "-map_metadata",
                        "0",
                        "-map_metadata:s:a:0",
                        "0:s:a:0",
                        "-map_chapters",
                        "0",
                        "-map",
                        "[norm0]",
                        "-c:a:0",
                        "pcm_s16le",
                    ]
                    .map(OsString::from),
                );
            }
            Transform::Denoise => {
                args.extend(["-af", DENOISE_FILTER].map(OsString::from));
            }
            Transform::Lowpass(hz) => {
                args.push("-af".into());
                args.push(format!("lowpass=f={}", hz).into());
            }
        }

        args.push(output.as_os_str().to_owned());
        args
    }
}

/// Build the transform chain for `options`, in execution order.
pub fn transform_chain(options: &DecodeOptions) -> Vec<Transform> {
    let mut chain = vec![Transform::Decode {
        take_seconds: options.take_seconds,
    }];
    if options.normalize {
        chain.push(Transform::Normalize);
    }
    if options.denoise {
        chain.extend(std::iter::repeat(Transform::Denoise).take(DENOISE_PASSES));
    }
    if options.lowpass_enabled() {
        chain.push(Transform::Lowpass(options.lowpass_hz));
    }
    chain
}

/// [`Preprocessor`] backed by the `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone, Default)]
pub struct FfmpegPreprocessor {
    verbose: bool,
}

impl FfmpegPreprocessor {
    /// Create a preprocessor. In verbose mode the tools' own output is shown.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn run(&self, transform: Transform, input: &Path, output: &Path) -> AnalysisResult<()> {
        let args = transform.args(input, output);
        let line = std::iter::once("ffmpeg".to_string())
            .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ");

        if self.verbose {
            tracing::info!("{}", MessagePrefix::Command.format(&line));
        } else {
            tracing::debug!("{}", MessagePrefix::Command.format(&line));
        }

        let (stdout, stderr) = if self.verbose {
            (Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::null())
        };

        let status = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|e| AnalysisError::Spawn {
                tool: "ffmpeg".to_string(),
                source: e,
            })?;

        if !status.success() {
            return Err(AnalysisError::TransformFailed {
                transform: transform.name().to_string(),
                path: input.to_path_buf(),
                code: status.code(),
            });
        }
        Ok(())
    }
}

impl Preprocessor for FfmpegPreprocessor {
    fn decode(&self, path: &Path, options: &DecodeOptions) -> AnalysisResult<Signal> {
        if !path.exists() {
            return Err(AnalysisError::SourceNotFound(path.to_path_buf()));
        }

        // Removed when dropped, on every return path
        let scratch = tempfile::Builder::new().prefix("crosslooper").tempdir()?;
        let stem = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());

        let mut input: PathBuf = path.to_path_buf();
        for (i, transform) in transform_chain(options).into_iter().enumerate() {
            let output = scratch.path().join(format!("{}.{}.wav", stem, i));
            self.run(transform, &input, &output)?;
            input = output;
        }

        let signal = read_first_channel(&input)?;
        if signal.is_empty() {
            return Err(AnalysisError::EmptySignal(path.to_path_buf()));
        }

        tracing::debug!(
            "Decoded {} samples ({:.2}s @ {} Hz) from {}",
            signal.len(),
            signal.duration_secs(),
            signal.sample_rate,
            path.display()
        );

        Ok(signal)
    }

    fn native_sample_rate(&self, path: &Path) -> AnalysisResult<u32> {
        if !path.exists() {
            return Err(AnalysisError::SourceNotFound(path.to_path_buf()));
        }

        let output = Command::new("ffprobe")
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("a:0")
            .arg("-show_entries")
            .arg("stream=sample_rate")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(path)
            .output()
            .map_err(|e| AnalysisError::Spawn {
                tool: "ffprobe".to_string(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(AnalysisError::Probe {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_sample_rate(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            AnalysisError::Probe {
                path: path.to_path_buf(),
                message: "no audio stream sample rate reported".to_string(),
            }
        })
    }
}

/// Parse the first non-empty line of ffprobe output as a sample rate.
fn parse_sample_rate(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<u32>().ok())
        .filter(|&rate| rate > 0)
}

/// Read a WAV file and keep only its first channel.
///
/// Integer samples keep their native scale; no downmix is done.
pub fn read_first_channel(path: &Path) -> AnalysisResult<Signal> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .into_samples::<i32>()
            .step_by(channels)
            .map(|s| s.map(|v| v as f64))
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .step_by(channels)
            .map(|s| s.map(|v| v as f64))
            .collect::<Result<_, _>>()?,
    };

    Ok(Signal::new(samples, spec.sample_rate))
}
