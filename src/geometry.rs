//! Frame geometry derivation.
//!
//! A geometry ties the physical video resolution to the logical bitmap that
//! carries the payload: every logical pixel is one bit, drawn as a
//! `block_width × block_height` square of identical physical pixels.

use serde::{Deserialize, Serialize};

/// Errors raised while deriving a [`FrameGeometry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("frame {frame_width}x{frame_height} is not divisible by block {block_width}x{block_height}")]
    NotDivisible {
        frame_width: u32,
        frame_height: u32,
        block_width: u32,
        block_height: u32,
    },
    #[error("{bits_per_frame} bits per frame is not a whole number of bytes")]
    NotByteAligned { bits_per_frame: u64 },
    #[error("frame and block dimensions must be non-zero")]
    ZeroDimension,
}

/// Derived dimensions and capacities of one frame.
///
/// Built once per job with [`FrameGeometry::derive`] and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GeometrySettings", into = "GeometrySettings")]
pub struct FrameGeometry {
    frame_width: u32,
    frame_height: u32,
    block_width: u32,
    block_height: u32,
    logical_width: u32,
    logical_height: u32,
    bits_per_frame: u64,
    bytes_per_frame: usize,
}

/// The four inputs of a geometry, as they appear in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometrySettings {
    pub frame_width: u32,
    pub frame_height: u32,
    pub block_width: u32,
    pub block_height: u32,
}

impl FrameGeometry {
    /// Derive the logical bitmap size and the frame capacities.
    ///
    /// # Errors
    /// `NotDivisible` when a frame dimension is not a multiple of the block
    /// dimension, `NotByteAligned` when a frame cannot hold a whole number of
    /// bytes and `ZeroDimension` when any input is zero.
    pub fn derive(
        frame_width: u32,
        frame_height: u32,
        block_width: u32,
        block_height: u32,
    ) -> Result<FrameGeometry, GeometryError> {
        if frame_width == 0 || frame_height == 0 || block_width == 0 || block_height == 0 {
            return Err(GeometryError::ZeroDimension);
        }
        if frame_width % block_width != 0 || frame_height % block_height != 0 {
            return Err(GeometryError::NotDivisible {
                frame_width,
                frame_height,
                block_width,
                block_height,
            });
        }
        let logical_width = frame_width / block_width;
        let logical_height = frame_height / block_height;
        let bits_per_frame = u64::from(logical_width) * u64::from(logical_height);
        if bits_per_frame % 8 != 0 {
            return Err(GeometryError::NotByteAligned { bits_per_frame });
        }

        Ok(FrameGeometry {
            frame_width,
            frame_height,
            block_width,
            block_height,
            logical_width,
            logical_height,
            bits_per_frame,
            bytes_per_frame: (bits_per_frame / 8) as usize,
        })
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }

    pub fn frame_height(&self) -> u32 {
        self.frame_height
    }

    pub fn block_width(&self) -> u32 {
        self.block_width
    }

    pub fn block_height(&self) -> u32 {
        self.block_height
    }

    pub fn logical_width(&self) -> u32 {
        self.logical_width
    }

    pub fn logical_height(&self) -> u32 {
        self.logical_height
    }

    pub fn bits_per_frame(&self) -> u64 {
        self.bits_per_frame
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Physical pixels in one block
    pub fn block_pixel_count(&self) -> u64 {
        u64::from(self.block_width) * u64::from(self.block_height)
    }

    /// Bytes used by one row of a packed 1-bit (`monob`) frame.
    /// Rows start on a byte boundary.
    pub fn monob_row_stride(&self) -> usize {
        (self.logical_width as usize + 7) / 8
    }

    /// Bytes of one packed 1-bit frame at logical resolution
    pub fn monob_frame_len(&self) -> usize {
        self.monob_row_stride() * self.logical_height as usize
    }

    /// Number of frames a padded payload of `padded_len` bytes occupies
    pub fn frame_count(&self, padded_len: usize) -> usize {
        padded_len / self.bytes_per_frame
    }

    pub fn settings(&self) -> GeometrySettings {
        GeometrySettings {
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            block_width: self.block_width,
            block_height: self.block_height,
        }
    }
}

impl TryFrom<GeometrySettings> for FrameGeometry {
    type Error = GeometryError;

    fn try_from(settings: GeometrySettings) -> Result<Self, Self::Error> {
        FrameGeometry::derive(
            settings.frame_width,
            settings.frame_height,
            settings.block_width,
            settings.block_height,
        )
    }
}

impl From<FrameGeometry> for GeometrySettings {
    fn from(geometry: FrameGeometry) -> Self {
        geometry.settings()
    }
}

impl std::fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} frame, {}x{} blocks, {}x{} logical ({} bytes/frame)",
            self.frame_width,
            self.frame_height,
            self.block_width,
            self.block_height,
            self.logical_width,
            self.logical_height,
            self.bytes_per_frame
        )
    }
}

#[cfg(test)]
mod geometry_tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derive_64_by_64_block_8() {
        let geometry = FrameGeometry::derive(64, 64, 8, 8).unwrap();
        assert_eq!(geometry.logical_width(), 8);
        assert_eq!(geometry.logical_height(), 8);
        assert_eq!(geometry.bits_per_frame(), 64);
        assert_eq!(geometry.bytes_per_frame(), 8);
    }

    #[test]
    fn test_derive_not_divisible() {
        let result = FrameGeometry::derive(100, 64, 8, 8);
        assert!(matches!(result, Err(GeometryError::NotDivisible { .. })));
    }

    #[test]
    fn test_derive_not_byte_aligned() {
        // 3x3 logical = 9 bits
        let result = FrameGeometry::derive(3, 3, 1, 1);
        assert_eq!(
            result,
            Err(GeometryError::NotByteAligned { bits_per_frame: 9 })
        );
    }

    #[test]
    fn test_derive_zero_block() {
        assert_eq!(
            FrameGeometry::derive(64, 64, 0, 8),
            Err(GeometryError::ZeroDimension)
        );
    }

    #[test]
    fn test_derive_full_hd_default() {
        let geometry = FrameGeometry::derive(1920, 1080, 8, 8).unwrap();
        assert_eq!(geometry.logical_width(), 240);
        assert_eq!(geometry.logical_height(), 135);
        assert_eq!(geometry.bytes_per_frame(), 4050);
        assert_eq!(geometry.monob_frame_len(), 4050);
    }

    #[test]
    fn test_monob_stride_rounds_up() {
        // 12x2 logical = 24 bits = 3 bytes, but each row takes 2 bytes in monob
        let geometry = FrameGeometry::derive(12, 2, 1, 1).unwrap();
        assert_eq!(geometry.bytes_per_frame(), 3);
        assert_eq!(geometry.monob_row_stride(), 2);
        assert_eq!(geometry.monob_frame_len(), 4);
    }

    #[test]
    fn test_serde_rejects_invalid_geometry() {
        let text = "frame_width = 100\nframe_height = 64\nblock_width = 8\nblock_height = 8\n";
        let parsed: Result<FrameGeometry, _> = toml::from_str(text);
        assert!(parsed.is_err());
    }

    proptest! {
        #[test]
        fn prop_derive_matches_invariants(
            logical_w in 1u32..64,
            logical_h in 1u32..64,
            block_w in 1u32..16,
            block_h in 1u32..16,
        ) {
            let result = FrameGeometry::derive(logical_w * block_w, logical_h * block_h, block_w, block_h);
            let bits = u64::from(logical_w) * u64::from(logical_h);
            if bits % 8 == 0 {
                let geometry = result.unwrap();
                prop_assert_eq!(geometry.logical_width(), logical_w);
                prop_assert_eq!(geometry.logical_height(), logical_h);
                prop_assert_eq!(geometry.bits_per_frame(), bits);
                prop_assert_eq!(geometry.bytes_per_frame() as u64 * 8, bits);
            } else {
                prop_assert_eq!(result, Err(GeometryError::NotByteAligned { bits_per_frame: bits }));
            }
        }

        #[test]
        fn prop_derive_rejects_remainders(
            frame_w in 1u32..512,
            frame_h in 1u32..512,
            block in 2u32..16,
        ) {
            prop_assume!(frame_w % block != 0 || frame_h % block != 0);
            let result = FrameGeometry::derive(frame_w, frame_h, block, block);
            let is_not_divisible = matches!(result, Err(GeometryError::NotDivisible { .. }));
            prop_assert!(is_not_divisible);
        }
    }
}
