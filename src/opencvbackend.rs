//! Backend built on OpenCV's `VideoWriter` and `VideoCapture`.
//!
//! Frames are written as 3-channel BGR images. The codec name is turned into
//! a FourCC code from its first four characters (`mp4v`, `avc1`, `png `...).
use std::path::Path;

use opencv::core::{Mat, Scalar, Size, Vec3b, CV_8UC3};
use opencv::prelude::*;
use opencv::videoio::{VideoCapture, VideoWriter, CAP_ANY};
use tracing::debug;

use crate::bitlogics::luma;
use crate::bitmap::LogicalBitmap;
use crate::geometry::FrameGeometry;
use crate::transcoder::{BackendError, FrameSink, FrameSource, SampleScale, Transcoder, VideoSettings};
use crate::videoframe::VideoFrame;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvTranscoder;

fn fourcc(codec: &str) -> Result<i32, BackendError> {
    let mut chars = codec.chars().chain(std::iter::repeat(' '));
    let mut next = || chars.next().unwrap_or(' ');
    Ok(VideoWriter::fourcc(next(), next(), next(), next())?)
}

fn invalid(path: &Path, reason: &str) -> BackendError {
    BackendError::Format {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

impl Transcoder for OpenCvTranscoder {
    fn encode(
        &self,
        settings: &VideoSettings,
        output: &Path,
    ) -> Result<Box<dyn FrameSink>, BackendError> {
        let geometry = settings.geometry;
        let frame_size = Size {
            width: geometry.frame_width() as i32,
            height: geometry.frame_height() as i32,
        };
        let path = output
            .to_str()
            .ok_or_else(|| invalid(output, "path is not valid UTF-8"))?;
        let writer = VideoWriter::new(
            path,
            fourcc(&settings.codec)?,
            settings.framerate.into(),
            frame_size,
            true,
        )?;
        if !writer.is_opened()? {
            return Err(invalid(output, "video writer could not open the file"));
        }
        Ok(Box::new(OpenCvSink {
            writer: Some(writer),
            geometry,
        }))
    }

    fn decode(
        &self,
        settings: &VideoSettings,
        input: &Path,
        scale: SampleScale,
    ) -> Result<Box<dyn FrameSource>, BackendError> {
        let path = input
            .to_str()
            .ok_or_else(|| invalid(input, "path is not valid UTF-8"))?;
        let capture = VideoCapture::from_file(path, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(invalid(input, "video capture could not open the file"));
        }
        Ok(Box::new(OpenCvSource {
            capture,
            geometry: settings.geometry,
            scale,
        }))
    }

    fn extension(&self) -> &'static str {
        "mp4"
    }
}

struct OpenCvSink {
    writer: Option<VideoWriter>,
    geometry: FrameGeometry,
}

impl FrameSink for OpenCvSink {
    fn write_frame(&mut self, bitmap: &LogicalBitmap) -> Result<(), BackendError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(BackendError::Io(std::io::ErrorKind::BrokenPipe.into()));
        };
        let geometry = &self.geometry;
        let mut image = Mat::new_rows_cols_with_default(
            geometry.frame_height() as i32,
            geometry.frame_width() as i32,
            CV_8UC3,
            Scalar::all(0.0),
        )?;
        for by in 0..geometry.logical_height() {
            for bx in 0..geometry.logical_width() {
                let value = bitmap.intensity(bx, by);
                for i in 0..geometry.block_height() {
                    for j in 0..geometry.block_width() {
                        let bgr = image.at_2d_mut::<Vec3b>(
                            (by * geometry.block_height() + i) as i32,
                            (bx * geometry.block_width() + j) as i32,
                        )?;
                        bgr[0] = value;
                        bgr[1] = value;
                        bgr[2] = value;
                    }
                }
            }
        }
        writer.write(&image)?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), BackendError> {
        if let Some(mut writer) = self.writer.take() {
            writer.release()?;
        }
        Ok(())
    }

    fn abort(mut self: Box<Self>) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.release() {
                debug!("Video writer release failed: {}", err);
            }
        }
    }
}

struct OpenCvSource {
    capture: VideoCapture,
    geometry: FrameGeometry,
    scale: SampleScale,
}

impl FrameSource for OpenCvSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, BackendError> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.cols() == 0 {
            return Ok(None);
        }
        let width = self.geometry.frame_width();
        let height = self.geometry.frame_height();
        if frame.cols() as u32 != width || frame.rows() as u32 != height {
            return Err(BackendError::Frame(crate::videoframe::FrameError::SizeMismatch {
                expected_width: width,
                expected_height: height,
                actual_width: frame.cols() as u32,
                actual_height: frame.rows() as u32,
            }));
        }
        let mut gray = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let bgr = frame.at_2d::<Vec3b>(y, x)?;
                gray.push(luma(bgr[2], bgr[1], bgr[0]));
            }
        }
        match self.scale {
            SampleScale::Physical => Ok(Some(gray)),
            SampleScale::Logical => {
                let frame = VideoFrame::from_raw(&self.geometry, gray)?;
                Ok(Some(frame.downsample(&self.geometry)))
            }
        }
    }
}
