//! Push a known pattern through a backend and report how well the blocks
//! survive compression. Useful to pick a block size and classification
//! bands for a codec.
use std::path::PathBuf;

use bitreel::classifier::{average, BlockClass};
use bitreel::transcoder::DEFAULT_FFMPEG;
use bitreel::{
    frames_to_video, BackendKind, CancelToken, ClassificationBands, FrameGeometry, LogicalBitmap,
    SampleScale, VideoFrame, VideoSettings,
};
use clap::Parser;
use tracing::{error, info};

#[derive(Copy, Clone, PartialEq, Eq, Debug, clap::ValueEnum)]
enum Pattern {
    /// Alternating light and dark blocks
    Checker,
    /// Dark diagonals from each corner on a light background
    Diagonal,
}

#[derive(Parser, Debug)]
#[command(about = "Measure block classification for a codec", long_about = None)]
struct CalibrateArgs {
    #[arg(short, long, default_value_t = 1920)]
    width: u32,
    #[arg(short = 'g', long, default_value_t = 1080)]
    height: u32,
    #[arg(short, long, default_value_t = 8)]
    size: u32,
    #[arg(short, long, default_value_t = 30)]
    frames: usize,
    #[arg(short, long, default_value = "libx264")]
    codec: String,
    #[arg(short, long, default_value = "ffmpeg")]
    backend: String,
    #[arg(long, value_enum, default_value_t = Pattern::Checker)]
    pattern: Pattern,
    #[arg(short, long, default_value = "outputs")]
    output_directory: PathBuf,
    #[arg(long, default_value = DEFAULT_FFMPEG)]
    ffmpeg: String,
}

/// Expected bit of every block, true for light
fn pattern_bitmap(pattern: Pattern, geometry: &FrameGeometry) -> LogicalBitmap {
    let mut bitmap = LogicalBitmap::blank(geometry);
    let width = geometry.logical_width();
    let height = geometry.logical_height();
    let diagonal_length = width.min(height) / 4;
    for y in 0..height {
        for x in 0..width {
            let bit = match pattern {
                Pattern::Checker => (x + y) % 2 == 0,
                Pattern::Diagonal => {
                    let right = width - 1 - x;
                    let bottom = height - 1 - y;
                    let near_corner = (x < diagonal_length || right < diagonal_length)
                        && (y < diagonal_length || bottom < diagonal_length);
                    let on_diagonal = x == y || right == y || x == bottom || right == bottom;
                    !(near_corner && on_diagonal)
                }
            };
            bitmap.set(x, y, bit);
        }
    }
    bitmap
}

#[derive(Debug, Default)]
struct Report {
    correct: u64,
    flipped: u64,
    undecidable: u64,
    darkest_light: Option<u8>,
    brightest_dark: Option<u8>,
}

impl Report {
    fn record(&mut self, expected: bool, samples: &[u8], bands: &ClassificationBands) {
        let Some(avg) = average(samples) else {
            self.undecidable += 1;
            return;
        };
        if expected {
            self.darkest_light = Some(self.darkest_light.map_or(avg, |d| d.min(avg)));
        } else {
            self.brightest_dark = Some(self.brightest_dark.map_or(avg, |b| b.max(avg)));
        }
        match bands.classify_average(avg) {
            BlockClass::Bit(bit) if bit == expected => self.correct += 1,
            BlockClass::Bit(_) => self.flipped += 1,
            BlockClass::Undecidable => self.undecidable += 1,
        }
    }
}

fn run(args: CalibrateArgs) -> bitreel::Result<Report> {
    let geometry = FrameGeometry::derive(args.width, args.height, args.size, args.size)?;
    let backend: BackendKind = args
        .backend
        .parse()
        .map_err(|reason: String| bitreel::transcoder::BackendError::Format {
            path: PathBuf::from(&args.backend),
            reason,
        })?;
    let transcoder = backend.transcoder(&args.ffmpeg)?;
    let settings = VideoSettings {
        geometry,
        framerate: 30,
        codec: args.codec.clone(),
    };
    std::fs::create_dir_all(&args.output_directory).map_err(|source| bitreel::Error::Io {
        path: args.output_directory.clone(),
        source,
    })?;
    let video = args
        .output_directory
        .join(format!("calibrate.{}", transcoder.extension()));
    info!("Creating {:?} pattern frames: {}", args.pattern, geometry);

    let bitmap = pattern_bitmap(args.pattern, &geometry);
    let payload: Vec<u8> = bitmap.as_bytes().repeat(args.frames);
    let padded = bitreel::pad(payload, geometry.bytes_per_frame())?;
    let sink = transcoder.encode(&settings, &video)?;
    frames_to_video(
        bitreel::to_frame_stream(&padded, &geometry),
        sink,
        &CancelToken::new(),
        |_, _| {},
    )?;
    info!("Pattern video saved: {}", video.display());

    let bands = ClassificationBands::default();
    let mut report = Report::default();
    let mut source = transcoder.decode(&settings, &video, SampleScale::Physical)?;
    while let Some(samples) = source.next_frame()? {
        let frame = VideoFrame::from_raw(&geometry, samples)
            .map_err(bitreel::transcoder::BackendError::from)?;
        for by in 0..geometry.logical_height() {
            for bx in 0..geometry.logical_width() {
                let block = frame.read_block(bx, by, &geometry);
                report.record(bitmap.get(bx, by), &block, &bands);
            }
        }
    }
    Ok(report)
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(CalibrateArgs::parse()) {
        Ok(report) => {
            println!("correct:     {}", report.correct);
            println!("flipped:     {}", report.flipped);
            println!("undecidable: {}", report.undecidable);
            if let Some(light) = report.darkest_light {
                println!("darkest light block average: {}", light);
            }
            if let Some(dark) = report.brightest_dark {
                println!("brightest dark block average: {}", dark);
            }
        }
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    }
}
