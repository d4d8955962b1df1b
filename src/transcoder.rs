//! External video backends.
//!
//! The kernel never compresses video itself. A [`Transcoder`] accepts raw
//! 1-bit frames at logical resolution and is responsible for scaling them
//! to physical blocks, compressing and muxing. On the way back it yields
//! 8-bit gray frames, either averaged down to one sample per block or at
//! full physical resolution for the direct-sample path.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bitmap::LogicalBitmap;
use crate::geometry::FrameGeometry;
use crate::videoframe::{FrameError, VideoFrame};

/// Path to ffmpeg executable when none is configured
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

const RAW_MAGIC: &[u8; 4] = b"BRAW";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("video stream ended inside a frame ({actual} of {expected} bytes)")]
    PartialFrame { expected: usize, actual: usize },
    #[error("{path} is not a raw bit stream: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("backend {0} is not available in this build")]
    Unavailable(&'static str),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(feature = "opencv")]
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

/// Resolution at which decoded frames are handed back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleScale {
    /// One averaged sample per block
    Logical,
    /// Every physical pixel
    Physical,
}

/// Everything a backend needs to know about the video of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub geometry: FrameGeometry,
    pub framerate: u32,
    pub codec: String,
}

impl VideoSettings {
    /// Bytes of one decoded 8-bit frame at the given scale
    pub fn sample_frame_len(&self, scale: SampleScale) -> usize {
        match scale {
            SampleScale::Logical => self.geometry.bits_per_frame() as usize,
            SampleScale::Physical => {
                self.geometry.frame_width() as usize * self.geometry.frame_height() as usize
            }
        }
    }
}

/// Receives whole frames for an encoder
pub trait FrameSink {
    fn write_frame(&mut self, bitmap: &LogicalBitmap) -> Result<(), BackendError>;

    /// Flush and wait for the video to be complete
    fn finish(self: Box<Self>) -> Result<(), BackendError>;

    /// Stop without completing the video. The caller removes the output.
    fn abort(self: Box<Self>);
}

/// Yields decoded gray frames, row-major, one byte per sample
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, BackendError>;
}

pub trait Transcoder {
    fn encode(
        &self,
        settings: &VideoSettings,
        output: &Path,
    ) -> Result<Box<dyn FrameSink>, BackendError>;

    fn decode(
        &self,
        settings: &VideoSettings,
        input: &Path,
        scale: SampleScale,
    ) -> Result<Box<dyn FrameSource>, BackendError>;

    /// File extension of the videos this backend writes
    fn extension(&self) -> &'static str;
}

/// Supported backends
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ffmpeg,
    Raw,
    OpenCv,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ffmpeg => "ffmpeg",
            Self::Raw => "raw",
            Self::OpenCv => "opencv",
        };
        s.fmt(f)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ffmpeg" => Ok(Self::Ffmpeg),
            "raw" => Ok(Self::Raw),
            "opencv" => Ok(Self::OpenCv),
            _ => Err(format!("Unknown backend: {s}")),
        }
    }
}

impl BackendKind {
    /// Build the backend. `ffmpeg` is the executable used by the ffmpeg backend.
    pub fn transcoder(&self, ffmpeg: &str) -> Result<Box<dyn Transcoder>, BackendError> {
        match self {
            Self::Ffmpeg => Ok(Box::new(FfmpegTranscoder::new(ffmpeg))),
            Self::Raw => Ok(Box::new(RawTranscoder)),
            #[cfg(feature = "opencv")]
            Self::OpenCv => Ok(Box::new(crate::opencvbackend::OpenCvTranscoder)),
            #[cfg(not(feature = "opencv"))]
            Self::OpenCv => Err(BackendError::Unavailable("opencv")),
        }
    }
}

/// Drives an `ffmpeg` process through pipes
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    executable: String,
}

impl FfmpegTranscoder {
    pub fn new(executable: impl Into<String>) -> FfmpegTranscoder {
        FfmpegTranscoder {
            executable: executable.into(),
        }
    }

    /// Arguments for encoding raw 1-bit frames read from stdin
    pub fn encode_args(&self, settings: &VideoSettings, output: &Path) -> Vec<String> {
        let geometry = &settings.geometry;
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "monob".into(),
            "-s".into(),
            format!("{}x{}", geometry.logical_width(), geometry.logical_height()),
            "-framerate".into(),
            settings.framerate.to_string(),
            "-i".into(),
            "-".into(),
            "-vf".into(),
            // Blocks must stay sharp squares, any interpolation would smear bits
            format!(
                "scale={}:{}:flags=neighbor,format=yuv420p",
                geometry.frame_width(),
                geometry.frame_height()
            ),
            "-c:v".into(),
            settings.codec.clone(),
            "-y".into(), // Overwrite if exists
            output.to_string_lossy().into_owned(),
        ]
    }

    /// Arguments for decoding to raw 8-bit gray frames on stdout
    pub fn decode_args(&self, settings: &VideoSettings, input: &Path, scale: SampleScale) -> Vec<String> {
        let geometry = &settings.geometry;
        let filter = match scale {
            SampleScale::Logical => format!(
                "scale={}:{}:flags=area",
                geometry.logical_width(),
                geometry.logical_height()
            ),
            SampleScale::Physical => format!(
                "scale={}:{}:flags=neighbor",
                geometry.frame_width(),
                geometry.frame_height()
            ),
        };
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-vf".into(),
            filter,
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "gray".into(),
            "-".into(),
        ]
    }

    fn spawn(&self, args: Vec<String>, stdin: Stdio, stdout: Stdio) -> Result<Child, BackendError> {
        debug!("Running {} {}", self.executable, args.join(" "));
        Command::new(&self.executable)
            .args(&args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: self.executable.clone(),
                source,
            })
    }
}

impl Transcoder for FfmpegTranscoder {
    fn encode(
        &self,
        settings: &VideoSettings,
        output: &Path,
    ) -> Result<Box<dyn FrameSink>, BackendError> {
        let mut child = self.spawn(
            self.encode_args(settings, output),
            Stdio::piped(),
            Stdio::null(),
        )?;
        let stderr = drain_stderr(&mut child);
        let stdin = child.stdin.take().map(BufWriter::new);
        Ok(Box::new(FfmpegSink {
            program: self.executable.clone(),
            child: Some(child),
            stdin,
            stderr,
        }))
    }

    fn decode(
        &self,
        settings: &VideoSettings,
        input: &Path,
        scale: SampleScale,
    ) -> Result<Box<dyn FrameSource>, BackendError> {
        let mut child = self.spawn(
            self.decode_args(settings, input, scale),
            Stdio::null(),
            Stdio::piped(),
        )?;
        let stderr = drain_stderr(&mut child);
        let stdout = child.stdout.take().map(BufReader::new);
        Ok(Box::new(FfmpegSource {
            program: self.executable.clone(),
            child: Some(child),
            stdout,
            stderr,
            frame_len: settings.sample_frame_len(scale),
        }))
    }

    fn extension(&self) -> &'static str {
        "mp4"
    }
}

/// Read stderr on its own thread so a chatty process never blocks on a full pipe
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    child.stderr.take().map(|mut stderr| {
        std::thread::spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            text
        })
    })
}

fn wait_for(
    program: &str,
    mut child: Child,
    stderr: Option<JoinHandle<String>>,
) -> Result<(), BackendError> {
    let status = child.wait()?;
    let stderr = stderr
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    if !status.success() {
        return Err(BackendError::ProcessFailed {
            program: program.to_string(),
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(())
}

fn kill(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!("Video process already stopped: {}", err);
    }
    let _ = child.wait();
}

struct FfmpegSink {
    program: String,
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, bitmap: &LogicalBitmap) -> Result<(), BackendError> {
        match self.stdin.as_mut() {
            Some(stdin) => Ok(stdin.write_all(&bitmap.to_monob())?),
            None => Err(BackendError::Io(std::io::ErrorKind::BrokenPipe.into())),
        }
    }

    fn finish(mut self: Box<Self>) -> Result<(), BackendError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        } // Dropping stdin closes the pipe and lets the encoder finish
        match self.child.take() {
            Some(child) => wait_for(&self.program, child, self.stderr.take()),
            None => Ok(()),
        }
    }

    fn abort(mut self: Box<Self>) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            kill(&mut child);
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("Encoder dropped before completion, stopping {}", self.program);
            kill(&mut child);
        }
    }
}

struct FfmpegSource {
    program: String,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    frame_len: usize,
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, BackendError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let mut frame = vec![0u8; self.frame_len];
        let read = read_full(stdout, &mut frame)?;
        if read == self.frame_len {
            return Ok(Some(frame));
        }
        self.stdout.take();
        if let Some(child) = self.child.take() {
            wait_for(&self.program, child, self.stderr.take())?;
        }
        if read == 0 {
            Ok(None)
        } else {
            Err(BackendError::PartialFrame {
                expected: self.frame_len,
                actual: read,
            })
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stdout.take();
        if let Some(mut child) = self.child.take() {
            kill(&mut child);
        }
    }
}

/// Fill `buf` unless the reader ends first. Returns the number of bytes read.
pub fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Lossless backend storing the 1-bit frames as they are.
///
/// File layout: `BRAW`, logical width and height as little-endian `u32`,
/// then one packed `monob` frame after another.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawTranscoder;

impl Transcoder for RawTranscoder {
    fn encode(
        &self,
        settings: &VideoSettings,
        output: &Path,
    ) -> Result<Box<dyn FrameSink>, BackendError> {
        let mut writer = BufWriter::new(File::create(output)?);
        writer.write_all(RAW_MAGIC)?;
        writer.write_all(&settings.geometry.logical_width().to_le_bytes())?;
        writer.write_all(&settings.geometry.logical_height().to_le_bytes())?;
        Ok(Box::new(RawSink { writer }))
    }

    fn decode(
        &self,
        settings: &VideoSettings,
        input: &Path,
        scale: SampleScale,
    ) -> Result<Box<dyn FrameSource>, BackendError> {
        let mut reader = BufReader::new(File::open(input)?);
        let mut header = [0u8; 12];
        if read_full(&mut reader, &mut header)? != header.len() || &header[..4] != RAW_MAGIC {
            return Err(BackendError::Format {
                path: input.to_path_buf(),
                reason: "missing header".to_string(),
            });
        }
        let width = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let height = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let geometry = settings.geometry;
        if width != geometry.logical_width() || height != geometry.logical_height() {
            return Err(BackendError::Format {
                path: input.to_path_buf(),
                reason: format!(
                    "stream is {}x{}, expected {}x{}",
                    width,
                    height,
                    geometry.logical_width(),
                    geometry.logical_height()
                ),
            });
        }
        Ok(Box::new(RawSource {
            reader,
            geometry,
            scale,
        }))
    }

    fn extension(&self) -> &'static str {
        "braw"
    }
}

struct RawSink {
    writer: BufWriter<File>,
}

impl FrameSink for RawSink {
    fn write_frame(&mut self, bitmap: &LogicalBitmap) -> Result<(), BackendError> {
        Ok(self.writer.write_all(&bitmap.to_monob())?)
    }

    fn finish(mut self: Box<Self>) -> Result<(), BackendError> {
        self.writer.flush()?;
        Ok(())
    }

    fn abort(self: Box<Self>) {}
}

struct RawSource {
    reader: BufReader<File>,
    geometry: FrameGeometry,
    scale: SampleScale,
}

impl FrameSource for RawSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, BackendError> {
        let expected = self.geometry.monob_frame_len();
        let mut data = vec![0u8; expected];
        let read = read_full(&mut self.reader, &mut data)?;
        if read == 0 {
            return Ok(None);
        }
        if read != expected {
            return Err(BackendError::PartialFrame {
                expected,
                actual: read,
            });
        }
        let bitmap = LogicalBitmap::from_monob(&self.geometry, &data);
        let samples = match self.scale {
            SampleScale::Logical => {
                let mut samples = Vec::with_capacity(self.geometry.bits_per_frame() as usize);
                for y in 0..bitmap.height() {
                    for x in 0..bitmap.width() {
                        samples.push(bitmap.intensity(x, y));
                    }
                }
                samples
            }
            SampleScale::Physical => VideoFrame::render(&bitmap, &self.geometry)
                .image
                .into_raw(),
        };
        Ok(Some(samples))
    }
}

#[cfg(test)]
mod transcoder_tests {
    use super::*;

    fn settings() -> VideoSettings {
        VideoSettings {
            geometry: FrameGeometry::derive(64, 32, 8, 8).unwrap(),
            framerate: 24,
            codec: "libx264".to_string(),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bitreel-transcoder-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("raw".parse::<BackendKind>().unwrap(), BackendKind::Raw);
        assert_eq!("ffmpeg".parse::<BackendKind>().unwrap(), BackendKind::Ffmpeg);
        assert!("vlc".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::OpenCv.to_string(), "opencv");
    }

    #[test]
    fn test_ffmpeg_encode_args_use_neighbor_scaling() {
        let transcoder = FfmpegTranscoder::new("ffmpeg");
        let args = transcoder.encode_args(&settings(), Path::new("out.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-pix_fmt monob"));
        assert!(joined.contains("-s 8x4"));
        assert!(joined.contains("-framerate 24"));
        assert!(joined.contains("scale=64:32:flags=neighbor"));
        assert!(joined.contains("-c:v libx264"));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_ffmpeg_decode_args_use_area_for_logical() {
        let transcoder = FfmpegTranscoder::new("ffmpeg");
        let logical = transcoder
            .decode_args(&settings(), Path::new("in.mp4"), SampleScale::Logical)
            .join(" ");
        assert!(logical.contains("scale=8:4:flags=area"));
        assert!(logical.contains("-pix_fmt gray"));
        let physical = transcoder
            .decode_args(&settings(), Path::new("in.mp4"), SampleScale::Physical)
            .join(" ");
        assert!(physical.contains("scale=64:32:flags=neighbor"));
    }

    #[test]
    fn test_ffmpeg_missing_executable() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/ffmpeg-for-tests");
        let result = transcoder.encode(&settings(), &temp_path("never.mp4"));
        assert!(matches!(result, Err(BackendError::Spawn { .. })));
    }

    #[test]
    fn test_raw_round_trip_both_scales() {
        let settings = settings();
        let path = temp_path("round_trip.braw");
        let bitmap = LogicalBitmap::from_frame_bytes(&settings.geometry, &[0x81, 0x00, 0xFF, 0x01]);
        let mut sink = RawTranscoder.encode(&settings, &path).unwrap();
        sink.write_frame(&bitmap).unwrap();
        sink.write_frame(&bitmap).unwrap();
        sink.finish().unwrap();

        let mut logical = RawTranscoder
            .decode(&settings, &path, SampleScale::Logical)
            .unwrap();
        let first = logical.next_frame().unwrap().unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(first[0], 255);
        assert_eq!(first[1], 0);
        assert_eq!(first[7], 255);
        assert!(logical.next_frame().unwrap().is_some());
        assert!(logical.next_frame().unwrap().is_none());

        let mut physical = RawTranscoder
            .decode(&settings, &path, SampleScale::Physical)
            .unwrap();
        let frame = physical.next_frame().unwrap().unwrap();
        assert_eq!(frame.len(), 64 * 32);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_raw_rejects_other_geometry() {
        let settings = settings();
        let path = temp_path("other_geometry.braw");
        RawTranscoder.encode(&settings, &path).unwrap().finish().unwrap();
        let other = VideoSettings {
            geometry: FrameGeometry::derive(64, 64, 8, 8).unwrap(),
            ..settings
        };
        let result = RawTranscoder.decode(&other, &path, SampleScale::Logical);
        assert!(matches!(result, Err(BackendError::Format { .. })));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_raw_partial_frame() {
        let settings = settings();
        let path = temp_path("partial.braw");
        let mut file = File::create(&path).unwrap();
        file.write_all(RAW_MAGIC).unwrap();
        file.write_all(&8u32.to_le_bytes()).unwrap();
        file.write_all(&4u32.to_le_bytes()).unwrap();
        file.write_all(&[0xAA, 0xBB]).unwrap();
        drop(file);
        let mut source = RawTranscoder
            .decode(&settings, &path, SampleScale::Logical)
            .unwrap();
        assert!(matches!(
            source.next_frame(),
            Err(BackendError::PartialFrame {
                expected: 4,
                actual: 2
            })
        ));
        std::fs::remove_file(path).unwrap();
    }
}
