use tracing::debug;

use crate::bitmap::LogicalBitmap;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::geometry::FrameGeometry;
use crate::padlogics::PaddedPayload;
use crate::transcoder::FrameSink;

/// Lazy sequence of the bitmaps of a padded payload.
///
/// One forward pass over the bytes, one `bytes_per_frame` slice per frame.
/// Iterate again from [`to_frame_stream`] to restart.
pub struct FrameStream<'a> {
    chunks: std::slice::ChunksExact<'a, u8>,
    geometry: FrameGeometry,
}

/// Split a padded payload into frames
pub fn to_frame_stream<'a>(payload: &'a PaddedPayload, geometry: &FrameGeometry) -> FrameStream<'a> {
    debug_assert_eq!(payload.padded_byte_length() % geometry.bytes_per_frame(), 0);
    FrameStream {
        chunks: payload.bytes().chunks_exact(geometry.bytes_per_frame()),
        geometry: *geometry,
    }
}

impl<'a> Iterator for FrameStream<'a> {
    type Item = LogicalBitmap;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks
            .next()
            .map(|chunk| LogicalBitmap::from_frame_bytes(&self.geometry, chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl<'a> ExactSizeIterator for FrameStream<'a> {}

/// Push every frame of the stream into an encoder.
///
/// The cancel token is checked before each frame, so a frame is either
/// written whole or not at all. On cancellation or failure the sink is
/// aborted and nothing is finalized.
///
/// # Returns
/// The number of frames written
pub fn frames_to_video(
    frames: FrameStream<'_>,
    mut sink: Box<dyn FrameSink>,
    cancel: &CancelToken,
    mut on_frame: impl FnMut(usize, usize),
) -> Result<usize> {
    let total = frames.len();
    let mut written = 0;
    for bitmap in frames {
        if cancel.is_cancelled() {
            debug!("Cancelled after {}/{} frames", written, total);
            sink.abort();
            return Err(Error::Cancelled);
        }
        if let Err(err) = sink.write_frame(&bitmap) {
            sink.abort();
            return Err(err.into());
        }
        written += 1;
        on_frame(written, total);
    }
    sink.finish()?;
    Ok(written)
}
