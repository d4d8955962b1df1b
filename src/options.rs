use std::path::{Path, PathBuf};

use clap::builder::TypedValueParser;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::archivelogics::ArchiveFormat;
use crate::classifier::ClassificationBands;
use crate::error::Error;
use crate::extractionlogics::DecodeStrategy;
use crate::geometry::FrameGeometry;
use crate::transcoder::{BackendKind, DEFAULT_FFMPEG};

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_BLOCK: u32 = 8;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_CODEC: &str = "libx264";

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    Encode,
    Decode,
}

impl std::fmt::Display for AppMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Encode => "encode",
            Self::Decode => "decode",
        };
        s.fmt(f)
    }
}

impl std::str::FromStr for AppMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "encode" => Ok(Self::Encode),
            "decode" => Ok(Self::Decode),
            _ => Err(format!("Unknown mode: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("mode is required (encode or decode)")]
    MissingMode,
    #[error("at least one input path is required")]
    MissingInput,
    #[error("decoding takes exactly one video, got {0} inputs")]
    DecodeNeedsOneInput(usize),
    #[error("framerate must be greater than 0")]
    InvalidFramerate,
    #[error("codec name must not be empty")]
    EmptyCodec,
    #[error("failed to read job file {path}: {reason}")]
    FileRead { path: PathBuf, reason: String },
    #[error("failed to parse job file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// CLI arguments
///
/// Every option can also come from a TOML job file given with `--job`.
/// Values on the command line win over the file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
pub struct CliData {
    /// Files or directories to encode, or the single video to decode
    #[arg(short, long = "input", num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Where the video (encode) or the extracted files (decode) are written
    #[arg(short, long)]
    pub output_directory: Option<PathBuf>,

    /// Possible values:
    /// "encode" = store the files into a video.
    /// "decode" = extract the files from a video.
    #[arg(short = 'm', long, value_parser = clap::builder::PossibleValuesParser::new(["encode", "decode"])
    .map(|s| s.parse::<AppMode>().unwrap()),)]
    pub mode: Option<AppMode>,

    /// Physical frame width in pixels
    #[arg(short, long)]
    pub width: Option<u32>,

    /// Physical frame height in pixels
    #[arg(short = 'g', long)]
    pub height: Option<u32>,

    /// Number of pixels (width and height) used for each bit.
    ///
    /// # Examples
    /// E.g. A size of 1 means each bit is colored into 1 pixel
    /// E.g. A size of 8 means each bit is colored into a 8x8 pixel block (64 pixels)
    #[arg(short, long)]
    pub size: Option<u32>,

    /// Block width, overrides `size` horizontally
    #[arg(long)]
    pub block_width: Option<u32>,

    /// Block height, overrides `size` vertically
    #[arg(long)]
    pub block_height: Option<u32>,

    #[arg(short, long)]
    pub fps: Option<u32>,

    /// Codec name handed to the backend (e.g. libx264, ffv1, mp4v)
    #[arg(short, long)]
    pub codec: Option<String>,

    #[arg(short, long, value_parser = clap::builder::PossibleValuesParser::new(["ffmpeg", "raw", "opencv"])
    .map(|s| s.parse::<BackendKind>().unwrap()),)]
    pub backend: Option<BackendKind>,

    /// How bits are read back when decoding
    #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(["averaged", "sampled"])
    .map(|s| s.parse::<DecodeStrategy>().unwrap()),)]
    pub strategy: Option<DecodeStrategy>,

    #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(["zip", "stored"])
    .map(|s| s.parse::<ArchiveFormat>().unwrap()),)]
    pub archive: Option<ArchiveFormat>,

    /// Highest block average read as a 0 by the sampled strategy
    #[arg(long)]
    pub low_band: Option<u8>,

    /// Lowest block average read as a 1 by the sampled strategy
    #[arg(long)]
    pub high_band: Option<u8>,

    /// File name of the encoded video
    #[arg(short, long)]
    pub name: Option<String>,

    /// ffmpeg executable
    #[arg(long)]
    pub ffmpeg: Option<String>,

    /// TOML job file
    #[arg(short, long)]
    pub job: Option<PathBuf>,

    /// Never draw progress bars
    #[arg(long)]
    pub no_progress: bool,
}

/// A job as written in a TOML file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobDescription {
    pub input_paths: Vec<PathBuf>,
    pub output_directory: Option<PathBuf>,
    pub mode: Option<AppMode>,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
    pub block_width: Option<u32>,
    pub block_height: Option<u32>,
    pub framerate: Option<u32>,
    pub codec_name: Option<String>,
    pub backend: Option<BackendKind>,
    pub decode_strategy: Option<DecodeStrategy>,
    pub archive_format: Option<ArchiveFormat>,
    pub bands: Option<ClassificationBands>,
    pub output_name: Option<String>,
    pub ffmpeg_path: Option<String>,
}

/// Validated, immutable description of one encode or decode run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input_paths: Vec<PathBuf>,
    pub output_directory: PathBuf,
    pub mode: AppMode,
    pub geometry: FrameGeometry,
    pub framerate: u32,
    pub codec: String,
    pub backend: BackendKind,
    pub decode_strategy: DecodeStrategy,
    pub archive_format: ArchiveFormat,
    pub bands: ClassificationBands,
    pub output_name: Option<String>,
    pub ffmpeg_path: String,
}

impl JobDescription {
    /// Loads a job description from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| OptionsError::FileRead {
                path: path.as_ref().to_path_buf(),
                reason: e.to_string(),
            })?;
        toml::from_str(&content).map_err(|e| OptionsError::Parse {
            path: path.as_ref().to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Overlay the values given on the command line
    pub fn apply_cli(mut self, args: &CliData) -> Self {
        if !args.input.is_empty() {
            self.input_paths = args.input.clone();
        }
        let block_width = args.block_width.or(args.size);
        let block_height = args.block_height.or(args.size);
        self.output_directory = args.output_directory.clone().or(self.output_directory);
        self.mode = args.mode.or(self.mode);
        self.frame_width = args.width.or(self.frame_width);
        self.frame_height = args.height.or(self.frame_height);
        self.block_width = block_width.or(self.block_width);
        self.block_height = block_height.or(self.block_height);
        self.framerate = args.fps.or(self.framerate);
        self.codec_name = args.codec.clone().or(self.codec_name);
        self.backend = args.backend.or(self.backend);
        self.decode_strategy = args.strategy.or(self.decode_strategy);
        self.archive_format = args.archive.or(self.archive_format);
        self.output_name = args.name.clone().or(self.output_name);
        self.ffmpeg_path = args.ffmpeg.clone().or(self.ffmpeg_path);
        if args.low_band.is_some() || args.high_band.is_some() {
            let bands = self.bands.unwrap_or_default();
            self.bands = Some(ClassificationBands {
                low_max: args.low_band.unwrap_or(bands.low_max),
                high_min: args.high_band.unwrap_or(bands.high_min),
            });
        }
        self
    }

    /// Fill defaults and validate. Geometry is derived here so a bad
    /// resolution fails before any file is touched.
    pub fn into_job(self) -> Result<Job, Error> {
        let mode = self.mode.ok_or(OptionsError::MissingMode)?;
        match (mode, self.input_paths.len()) {
            (_, 0) => return Err(OptionsError::MissingInput.into()),
            (AppMode::Decode, 1) | (AppMode::Encode, _) => {}
            (AppMode::Decode, n) => return Err(OptionsError::DecodeNeedsOneInput(n).into()),
        }
        let geometry = FrameGeometry::derive(
            self.frame_width.unwrap_or(DEFAULT_WIDTH),
            self.frame_height.unwrap_or(DEFAULT_HEIGHT),
            self.block_width.unwrap_or(DEFAULT_BLOCK),
            self.block_height.unwrap_or(DEFAULT_BLOCK),
        )?;
        let framerate = self.framerate.unwrap_or(DEFAULT_FPS);
        if framerate == 0 {
            return Err(OptionsError::InvalidFramerate.into());
        }
        let codec = self
            .codec_name
            .unwrap_or_else(|| DEFAULT_CODEC.to_string());
        if codec.trim().is_empty() {
            return Err(OptionsError::EmptyCodec.into());
        }
        let bands = self.bands.unwrap_or_default();
        bands.validate()?;

        Ok(Job {
            input_paths: self.input_paths,
            output_directory: self.output_directory.unwrap_or_else(|| PathBuf::from(".")),
            mode,
            geometry,
            framerate,
            codec,
            backend: self.backend.unwrap_or(BackendKind::Ffmpeg),
            decode_strategy: self.decode_strategy.unwrap_or_default(),
            archive_format: self.archive_format.unwrap_or_default(),
            bands,
            output_name: self.output_name,
            ffmpeg_path: self
                .ffmpeg_path
                .unwrap_or_else(|| DEFAULT_FFMPEG.to_string()),
        })
    }
}

/// Extract from the command line (CLI) argument the job to run.
///
/// # Arguments
/// args - The command line argument, possibly pointing to a job file
///
/// # Returns
/// Return a validated job or the reason the options cannot form one
pub fn extract_options(args: &CliData) -> Result<Job, Error> {
    let description = match &args.job {
        Some(path) => JobDescription::from_file(path)?,
        None => JobDescription::default(),
    };
    description.apply_cli(args).into_job()
}
