//! Runs one encode or decode job from start to finish.
//!
//! Each job runs on its own thread. Progress travels over a channel and the
//! result comes back through [`JobHandle::join`]. Outputs are removed again
//! when a job fails or is cancelled.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver, Sender};
use pretty_bytes_rust::pretty_bytes;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::extractionlogics::{video_to_data, ClassificationAmbiguity};
use crate::geometry::FrameGeometry;
use crate::injectionlogics::{frames_to_video, to_frame_stream};
use crate::manifest::Manifest;
use crate::options::{AppMode, Job};
use crate::padlogics::{pad, unpad};
use crate::transcoder::{Transcoder, VideoSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Packing,
    Encoding,
    Decoding,
    Unpacking,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started {
        mode: AppMode,
        geometry: FrameGeometry,
    },
    Stage(JobStage),
    /// The archive is ready and padded to whole frames
    Packed {
        original: usize,
        padded: usize,
        frames: usize,
    },
    Frame {
        done: usize,
        total: Option<usize>,
    },
    Warning(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Encoded {
        video: PathBuf,
        manifest: PathBuf,
        frames: usize,
        archive_bytes: usize,
    },
    Decoded {
        files: Vec<PathBuf>,
        frames: usize,
        /// Set when the sampled strategy met an undecidable block
        ambiguity: Option<ClassificationAmbiguity>,
    },
}

/// What a running job reports to and listens from
#[derive(Debug, Clone, Default)]
pub struct JobMonitor {
    events: Option<Sender<JobEvent>>,
    cancel: CancelToken,
}

impl JobMonitor {
    pub fn new(cancel: CancelToken) -> JobMonitor {
        JobMonitor {
            events: None,
            cancel,
        }
    }

    pub fn with_events(events: Sender<JobEvent>, cancel: CancelToken) -> JobMonitor {
        JobMonitor {
            events: Some(events),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Send an event. A caller that stopped listening is not an error.
    pub fn emit(&self, event: JobEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// A job running on a worker thread
pub struct JobHandle {
    events: Receiver<JobEvent>,
    cancel: CancelToken,
    worker: JoinHandle<Result<JobOutcome>>,
}

impl JobHandle {
    /// Events of the job. The channel closes when the job ends.
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the job to end
    pub fn join(self) -> Result<JobOutcome> {
        match self.worker.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Start a job on its own thread
pub fn spawn_job(job: Job) -> JobHandle {
    let (sender, events) = unbounded();
    let cancel = CancelToken::new();
    let monitor = JobMonitor::with_events(sender, cancel.clone());
    let worker = std::thread::spawn(move || run_job(&job, &monitor));
    JobHandle {
        events,
        cancel,
        worker,
    }
}

/// Run a job on the current thread with the backend it names
pub fn run_job(job: &Job, monitor: &JobMonitor) -> Result<JobOutcome> {
    let transcoder = job.backend.transcoder(&job.ffmpeg_path)?;
    run_job_with(job, transcoder.as_ref(), monitor)
}

/// Run a job on the current thread through the given backend
pub fn run_job_with(
    job: &Job,
    transcoder: &dyn Transcoder,
    monitor: &JobMonitor,
) -> Result<JobOutcome> {
    monitor.emit(JobEvent::Started {
        mode: job.mode,
        geometry: job.geometry,
    });
    info!("Starting {} job: {}", job.mode, job.geometry);
    match job.mode {
        AppMode::Encode => encode_job(job, transcoder, monitor),
        AppMode::Decode => decode_job(job, transcoder, monitor),
    }
}

/// Deletes the listed files when dropped, unless disarmed
struct CleanupGuard {
    paths: Vec<PathBuf>,
    armed: bool,
}

impl CleanupGuard {
    fn new(paths: Vec<PathBuf>) -> CleanupGuard {
        CleanupGuard { paths, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for path in &self.paths {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed partial output {}", path.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!("Could not remove {}: {}", path.display(), err),
            }
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Name of the encoded video: the configured one, or the first input's stem
fn video_name(job: &Job, extension: &str) -> String {
    if let Some(name) = &job.output_name {
        return name.clone();
    }
    let stem = job
        .input_paths
        .first()
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bitreel".to_string());
    format!("{stem}.{extension}")
}

fn encode_job(job: &Job, transcoder: &dyn Transcoder, monitor: &JobMonitor) -> Result<JobOutcome> {
    let geometry = job.geometry;
    monitor.emit(JobEvent::Stage(JobStage::Packing));
    let archive = job.archive_format.pack(&job.input_paths)?;
    let archive_bytes = archive.len();
    let payload = pad(archive, geometry.bytes_per_frame())?;
    let frame_count = geometry.frame_count(payload.padded_byte_length());
    info!(
        "Archived {} input(s) into {}, {} frame(s)",
        job.input_paths.len(),
        pretty_bytes(archive_bytes as u64, None),
        frame_count
    );
    monitor.emit(JobEvent::Packed {
        original: payload.original_byte_length(),
        padded: payload.padded_byte_length(),
        frames: frame_count,
    });
    monitor.check_cancelled()?;

    let manifest = Manifest::new(
        &payload,
        &geometry,
        job.archive_format,
        job.framerate,
        &job.codec,
    );
    fs::create_dir_all(&job.output_directory).map_err(io_error(&job.output_directory))?;
    let video = job
        .output_directory
        .join(video_name(job, transcoder.extension()));
    let manifest_path = Manifest::path_for(&video);
    // The guard may only ever remove files this job created
    for path in [&video, &manifest_path] {
        if path.exists() {
            return Err(Error::OutputExists(path.clone()));
        }
    }
    let mut guard = CleanupGuard::new(vec![video.clone(), manifest_path.clone()]);

    let settings = VideoSettings {
        geometry,
        framerate: job.framerate,
        codec: job.codec.clone(),
    };
    monitor.emit(JobEvent::Stage(JobStage::Encoding));
    let sink = transcoder.encode(&settings, &video)?;
    let frames = frames_to_video(
        to_frame_stream(&payload, &geometry),
        sink,
        monitor.cancel_token(),
        |done, total| {
            monitor.emit(JobEvent::Frame {
                done,
                total: Some(total),
            })
        },
    )?;
    manifest.write(&manifest_path)?;
    guard.disarm();

    info!("Video saved: {}", video.display());
    Ok(JobOutcome::Encoded {
        video,
        manifest: manifest_path,
        frames,
        archive_bytes,
    })
}

fn decode_job(job: &Job, transcoder: &dyn Transcoder, monitor: &JobMonitor) -> Result<JobOutcome> {
    let video = job
        .input_paths
        .first()
        .ok_or(crate::options::OptionsError::MissingInput)?;
    let manifest = Manifest::read(&Manifest::path_for(video))?;
    let geometry = manifest.geometry;
    if geometry != job.geometry {
        info!("Using geometry from manifest: {}", geometry);
    }
    let original = manifest.original_byte_length as usize;
    let padded = manifest.padded_byte_length as usize;
    let expected_frames = manifest.frame_count() as usize;
    debug!(
        "Manifest: {} of archive in {} frame(s)",
        pretty_bytes(manifest.original_byte_length, None),
        expected_frames
    );

    let settings = VideoSettings {
        geometry,
        framerate: manifest.framerate,
        codec: manifest.codec.clone(),
    };
    monitor.emit(JobEvent::Stage(JobStage::Decoding));
    let mut source = transcoder.decode(&settings, video, job.decode_strategy.scale())?;
    let stream = video_to_data(
        source.as_mut(),
        &geometry,
        job.decode_strategy,
        job.bands,
        monitor.cancel_token(),
        |done| {
            monitor.emit(JobEvent::Frame {
                done,
                total: Some(expected_frames),
            })
        },
    )?;
    drop(source);

    if let Some(ambiguity) = &stream.ambiguity {
        if stream.bytes.len() < original {
            let message = format!(
                "decode may be truncated: {} after {} of {} bytes",
                ambiguity,
                stream.bytes.len(),
                original
            );
            warn!("{}", message);
            monitor.emit(JobEvent::Warning(message));
        } else {
            debug!("Data ended cleanly before {}", ambiguity);
        }
    }
    if stream.bytes.len() > padded {
        debug!(
            "Dropping {} bytes of trailing frames",
            stream.bytes.len() - padded
        );
    }
    let archive = unpad(stream.bytes, original)?;
    let actual = crc32fast::hash(&archive);
    if actual != manifest.crc32 {
        return Err(Error::ChecksumMismatch {
            expected: manifest.crc32,
            actual,
        });
    }
    monitor.check_cancelled()?;

    monitor.emit(JobEvent::Stage(JobStage::Unpacking));
    let files = manifest.archive.unpack(&archive, &job.output_directory)?;
    info!(
        "Extracted {} file(s) into {}",
        files.len(),
        job.output_directory.display()
    );
    Ok(JobOutcome::Decoded {
        files,
        frames: stream.frames,
        ambiguity: stream.ambiguity,
    })
}
