//! Store files as a monochrome block video and get them back byte for byte.
//!
//! Inputs are packed into one archive, padded to whole frames and drawn one
//! bit per block. Decoding classifies each block back into a bit using the
//! geometry and lengths recorded in a manifest next to the video.
pub mod archivelogics;
pub mod bitlogics;
pub mod bitmap;
pub mod cancel;
pub mod classifier;
pub mod error;
pub mod extractionlogics;
pub mod geometry;
pub mod injectionlogics;
pub mod jobrunner;
pub mod manifest;
#[cfg(feature = "opencv")]
pub mod opencvbackend;
pub mod options;
pub mod padlogics;
pub mod transcoder;
pub mod videoframe;

// Re-export for external access (main.rs, calibrate.rs)
pub use crate::archivelogics::{ArchiveError, ArchiveFormat};
pub use crate::bitmap::LogicalBitmap;
pub use crate::cancel::CancelToken;
pub use crate::classifier::{BlockClass, ClassificationBands};
pub use crate::error::{Error, Result};
pub use crate::extractionlogics::{video_to_data, DecodeStrategy, DecodedStream};
pub use crate::geometry::FrameGeometry;
pub use crate::injectionlogics::{frames_to_video, to_frame_stream};
pub use crate::jobrunner::{run_job, run_job_with, spawn_job, JobEvent, JobHandle, JobMonitor, JobOutcome, JobStage};
pub use crate::manifest::Manifest;
pub use crate::options::{extract_options, AppMode, CliData, Job, JobDescription};
pub use crate::padlogics::{pad, unpad, PaddedPayload};
pub use crate::transcoder::{BackendKind, SampleScale, Transcoder, VideoSettings};
pub use crate::videoframe::VideoFrame;
