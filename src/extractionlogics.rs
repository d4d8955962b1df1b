use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bitlogics::mutate_byte;
use crate::bitmap::LogicalBitmap;
use crate::cancel::CancelToken;
use crate::classifier::{average, BlockClass, ClassificationBands};
use crate::error::{Error, Result};
use crate::geometry::FrameGeometry;
use crate::transcoder::{FrameSource, SampleScale};
use crate::videoframe::VideoFrame;

/// How bits are recovered from a decoded video
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeStrategy {
    /// The decoder averages each block down to one sample
    #[default]
    Averaged,
    /// Full resolution frames are classified block by block
    Sampled,
}

impl std::fmt::Display for DecodeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Averaged => "averaged",
            Self::Sampled => "sampled",
        };
        s.fmt(f)
    }
}

impl std::str::FromStr for DecodeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "averaged" => Ok(Self::Averaged),
            "sampled" => Ok(Self::Sampled),
            _ => Err(format!("Unknown decode strategy: {s}")),
        }
    }
}

impl DecodeStrategy {
    pub fn scale(&self) -> SampleScale {
        match self {
            Self::Averaged => SampleScale::Logical,
            Self::Sampled => SampleScale::Physical,
        }
    }
}

/// The first block that fell between the bit bands.
///
/// Decoding stops there. It is either the clean end of the data or a sign
/// the video was damaged; the caller decides which using the expected length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationAmbiguity {
    pub frame: usize,
    pub block_x: u32,
    pub block_y: u32,
    pub average: u8,
}

impl std::fmt::Display for ClassificationAmbiguity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "undecidable block ({}, {}) in frame {} with average intensity {}",
            self.block_x, self.block_y, self.frame, self.average
        )
    }
}

/// Bytes recovered from a video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedStream {
    pub bytes: Vec<u8>,
    pub frames: usize,
    pub ambiguity: Option<ClassificationAmbiguity>,
}

/// Pack bitmaps back into bytes, in arrival order
pub fn from_frame_stream<I>(frames: I, geometry: &FrameGeometry) -> Vec<u8>
where
    I: IntoIterator<Item = LogicalBitmap>,
{
    let mut bytes = Vec::new();
    for bitmap in frames {
        debug_assert_eq!(bitmap.as_bytes().len(), geometry.bytes_per_frame());
        bytes.extend_from_slice(bitmap.as_bytes());
    }
    bytes
}

/// Reads full resolution frames block by block through the classifier.
///
/// Bits are assembled MSB-first. The first undecidable block ends the
/// stream: the byte being assembled and every later block are dropped.
pub struct SampledDecoder {
    geometry: FrameGeometry,
    bands: ClassificationBands,
    bytes: Vec<u8>,
    current: u8,
    bit_index: u8,
    frames: usize,
    ambiguity: Option<ClassificationAmbiguity>,
}

impl SampledDecoder {
    pub fn new(geometry: &FrameGeometry, bands: ClassificationBands) -> SampledDecoder {
        SampledDecoder {
            geometry: *geometry,
            bands,
            bytes: Vec::new(),
            current: 0,
            bit_index: 7,
            frames: 0,
            ambiguity: None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.ambiguity.is_some()
    }

    /// Classify every block of the frame.
    /// Returns false once an undecidable block has been met.
    pub fn push_frame(&mut self, frame: &VideoFrame) -> bool {
        if self.is_terminated() {
            return false;
        }
        let frame_index = self.frames;
        self.frames += 1;
        for y in 0..self.geometry.logical_height() {
            for x in 0..self.geometry.logical_width() {
                let samples = frame.read_block(x, y, &self.geometry);
                match self.bands.classify(&samples) {
                    BlockClass::Bit(bit) => {
                        mutate_byte(&mut self.current, bit, self.bit_index);
                        if self.bit_index == 0 {
                            self.bytes.push(self.current);
                            self.current = 0; // Reset, next byte needs to accumulate 8 bits
                            self.bit_index = 7;
                        } else {
                            self.bit_index -= 1;
                        }
                    }
                    BlockClass::Undecidable => {
                        self.ambiguity = Some(ClassificationAmbiguity {
                            frame: frame_index,
                            block_x: x,
                            block_y: y,
                            average: average(&samples).unwrap_or_default(),
                        });
                        return false;
                    }
                }
            }
        }
        true
    }

    pub fn finish(self) -> DecodedStream {
        DecodedStream {
            bytes: self.bytes,
            frames: self.frames,
            ambiguity: self.ambiguity,
        }
    }
}

/// Pull every frame out of a decoder and turn it back into bytes.
///
/// The cancel token is checked between frames.
pub fn video_to_data(
    source: &mut dyn FrameSource,
    geometry: &FrameGeometry,
    strategy: DecodeStrategy,
    bands: ClassificationBands,
    cancel: &CancelToken,
    mut on_frame: impl FnMut(usize),
) -> Result<DecodedStream> {
    match strategy {
        DecodeStrategy::Averaged => {
            let mut bytes = Vec::new();
            let mut frames = 0;
            loop {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let Some(samples) = source.next_frame()? else {
                    break;
                };
                let bitmap = LogicalBitmap::from_gray_samples(geometry, &samples);
                bytes.extend_from_slice(bitmap.as_bytes());
                frames += 1;
                on_frame(frames);
            }
            debug!("Averaged decode read {} frames", frames);
            Ok(DecodedStream {
                bytes,
                frames,
                ambiguity: None,
            })
        }
        DecodeStrategy::Sampled => {
            let mut decoder = SampledDecoder::new(geometry, bands);
            loop {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let Some(samples) = source.next_frame()? else {
                    break;
                };
                let frame = VideoFrame::from_raw(geometry, samples)
                    .map_err(crate::transcoder::BackendError::from)?;
                let keep_going = decoder.push_frame(&frame);
                on_frame(decoder.frames);
                if !keep_going {
                    break;
                }
            }
            let stream = decoder.finish();
            if let Some(ambiguity) = &stream.ambiguity {
                warn!("Sampled decode stopped at {}", ambiguity);
            }
            Ok(stream)
        }
    }
}
