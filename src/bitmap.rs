use crate::bitlogics::{bit_from_intensity, get_bit_msb_first, intensity_for_bit, mutate_byte};
use crate::geometry::FrameGeometry;

/// One frame worth of payload bits at logical resolution.
///
/// Bits are stored packed, MSB-first, scanning rows left to right from the
/// top row. Pixel (0, 0) is bit 7 of the first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalBitmap {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl LogicalBitmap {
    /// All dark bitmap
    pub fn blank(geometry: &FrameGeometry) -> LogicalBitmap {
        LogicalBitmap {
            width: geometry.logical_width(),
            height: geometry.logical_height(),
            bytes: vec![0; geometry.bytes_per_frame()],
        }
    }

    /// Wrap one `bytes_per_frame` slice of the payload.
    pub fn from_frame_bytes(geometry: &FrameGeometry, bytes: &[u8]) -> LogicalBitmap {
        debug_assert_eq!(bytes.len(), geometry.bytes_per_frame());
        LogicalBitmap {
            width: geometry.logical_width(),
            height: geometry.logical_height(),
            bytes: bytes.to_vec(),
        }
    }

    /// Read a packed 1-bit frame whose rows each start on a byte boundary.
    /// `data` must hold `geometry.monob_frame_len()` bytes.
    pub fn from_monob(geometry: &FrameGeometry, data: &[u8]) -> LogicalBitmap {
        debug_assert_eq!(data.len(), geometry.monob_frame_len());
        let stride = geometry.monob_row_stride();
        let mut bitmap = LogicalBitmap::blank(geometry);
        for y in 0..bitmap.height {
            let row = &data[y as usize * stride..(y as usize + 1) * stride];
            for x in 0..bitmap.width {
                bitmap.set(x, y, get_bit_msb_first(row, x as usize));
            }
        }
        bitmap
    }

    /// Read one 8-bit sample per logical pixel, row-major.
    /// Samples are read back against the intensity midpoint.
    pub fn from_gray_samples(geometry: &FrameGeometry, samples: &[u8]) -> LogicalBitmap {
        debug_assert_eq!(
            samples.len() as u64,
            geometry.bits_per_frame(),
            "one sample per logical pixel"
        );
        let mut bitmap = LogicalBitmap::blank(geometry);
        for (index, sample) in samples.iter().enumerate() {
            if bit_from_intensity(*sample) {
                bitmap.set_index(index, true);
            }
        }
        bitmap
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        get_bit_msb_first(&self.bytes, self.index_of(x, y))
    }

    pub fn set(&mut self, x: u32, y: u32, bit: bool) {
        let index = self.index_of(x, y);
        self.set_index(index, bit);
    }

    /// Intensity the pixel is drawn with
    pub fn intensity(&self, x: u32, y: u32) -> u8 {
        intensity_for_bit(self.get(x, y))
    }

    /// Payload bytes carried by this frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Pack the bitmap as a `monob` raw frame: 1 bit per pixel, MSB-first,
    /// 1 = white, each row padded to a whole byte.
    pub fn to_monob(&self) -> Vec<u8> {
        let stride = (self.width as usize + 7) / 8;
        if stride * 8 == self.width as usize {
            // Rows already end on byte boundaries, the packing is identical
            return self.bytes.clone();
        }
        let mut data = vec![0u8; stride * self.height as usize];
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y) {
                    let byte = &mut data[y as usize * stride + x as usize / 8];
                    mutate_byte(byte, true, 7 - (x % 8) as u8);
                }
            }
        }
        data
    }

    fn index_of(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.width as usize + x as usize
    }

    fn set_index(&mut self, index: usize, bit: bool) {
        mutate_byte(&mut self.bytes[index / 8], bit, 7 - (index % 8) as u8);
    }
}
