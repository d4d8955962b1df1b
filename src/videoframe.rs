use image::{GrayImage, Luma};

use crate::bitmap::LogicalBitmap;
use crate::geometry::FrameGeometry;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    SizeMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("raw frame holds {actual} bytes, expected {expected}")]
    BufferLength { expected: usize, actual: usize },
}

/// A single physical frame of the video, one intensity per pixel.
/// E.g. on a 30fps video, there will be 30 VideoFrame every second
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub image: GrayImage,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32) -> VideoFrame {
        VideoFrame {
            image: GrayImage::new(width, height),
        }
    }

    /// Paint a `block_width × block_height` square starting at (x, y)
    pub fn write(&mut self, intensity: u8, x: u32, y: u32, block_width: u32, block_height: u32) {
        for i in 0..block_height {
            for j in 0..block_width {
                self.image.put_pixel(x + j, y + i, Luma([intensity]));
            }
        }
    }

    /// Wrap a raw 8-bit gray buffer of the geometry's physical size
    pub fn from_raw(geometry: &FrameGeometry, data: Vec<u8>) -> Result<VideoFrame, FrameError> {
        let expected = geometry.frame_width() as usize * geometry.frame_height() as usize;
        let actual = data.len();
        match GrayImage::from_raw(geometry.frame_width(), geometry.frame_height(), data) {
            Some(image) => Ok(VideoFrame { image }),
            None => Err(FrameError::BufferLength { expected, actual }),
        }
    }

    /// Replicate every logical pixel into its physical block (nearest neighbor)
    pub fn render(bitmap: &LogicalBitmap, geometry: &FrameGeometry) -> VideoFrame {
        let mut frame = VideoFrame::new(geometry.frame_width(), geometry.frame_height());
        for y in 0..geometry.logical_height() {
            for x in 0..geometry.logical_width() {
                frame.write(
                    bitmap.intensity(x, y),
                    x * geometry.block_width(),
                    y * geometry.block_height(),
                    geometry.block_width(),
                    geometry.block_height(),
                );
            }
        }
        frame
    }

    /// All physical samples of the block at logical position (block_x, block_y)
    pub fn read_block(&self, block_x: u32, block_y: u32, geometry: &FrameGeometry) -> Vec<u8> {
        let x0 = block_x * geometry.block_width();
        let y0 = block_y * geometry.block_height();
        let mut samples = Vec::with_capacity(geometry.block_pixel_count() as usize);
        for i in 0..geometry.block_height() {
            for j in 0..geometry.block_width() {
                samples.push(self.image.get_pixel(x0 + j, y0 + i).0[0]);
            }
        }
        samples
    }

    /// Area down-sampling: one averaged sample per block, row-major
    pub fn downsample(&self, geometry: &FrameGeometry) -> Vec<u8> {
        let mut samples = Vec::with_capacity(geometry.bits_per_frame() as usize);
        for y in 0..geometry.logical_height() {
            for x in 0..geometry.logical_width() {
                let block = self.read_block(x, y, geometry);
                let sum: u64 = block.iter().map(|v| u64::from(*v)).sum();
                samples.push((sum / block.len() as u64) as u8);
            }
        }
        samples
    }
}
