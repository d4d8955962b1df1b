/// Value appended after the payload to complete the last frame.
/// Decodes as dark pixels.
pub const FILL_BYTE: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PadError {
    #[error("original length {original} exceeds the {available} decoded bytes")]
    LengthExceedsBuffer { original: usize, available: usize },
    #[error("frame capacity must be at least one byte")]
    ZeroFrameCapacity,
}

/// A payload extended to a whole number of frames.
///
/// The original length is carried next to the bytes so the decoding side
/// can drop the fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedPayload {
    original_byte_length: usize,
    bytes: Vec<u8>,
}

impl PaddedPayload {
    pub fn original_byte_length(&self) -> usize {
        self.original_byte_length
    }

    pub fn padded_byte_length(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Append the minimal number of `FILL_BYTE` so the length is a multiple of
/// `bytes_per_frame`. A payload already aligned is returned unchanged.
pub fn pad(mut bytes: Vec<u8>, bytes_per_frame: usize) -> Result<PaddedPayload, PadError> {
    if bytes_per_frame == 0 {
        return Err(PadError::ZeroFrameCapacity);
    }
    let original_byte_length = bytes.len();
    let remainder = original_byte_length % bytes_per_frame;
    if remainder != 0 {
        bytes.resize(original_byte_length + bytes_per_frame - remainder, FILL_BYTE);
    }
    Ok(PaddedPayload {
        original_byte_length,
        bytes,
    })
}

/// Truncate decoded bytes back to the length recorded before padding
pub fn unpad(mut bytes: Vec<u8>, original_byte_length: usize) -> Result<Vec<u8>, PadError> {
    if original_byte_length > bytes.len() {
        return Err(PadError::LengthExceedsBuffer {
            original: original_byte_length,
            available: bytes.len(),
        });
    }
    bytes.truncate(original_byte_length);
    Ok(bytes)
}

#[cfg(test)]
mod padlogics_tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pad_single_byte_to_frame() {
        let payload = pad(vec![0xFF], 8).unwrap();
        assert_eq!(payload.original_byte_length(), 1);
        assert_eq!(payload.padded_byte_length(), 8);
        assert_eq!(payload.bytes(), &[0xFF, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_pad_aligned_is_unchanged() {
        let data: Vec<u8> = (0..16).collect();
        let payload = pad(data.clone(), 8).unwrap();
        assert_eq!(payload.padded_byte_length(), payload.original_byte_length());
        assert_eq!(payload.into_bytes(), data);
    }

    #[test]
    fn test_pad_empty_stays_empty() {
        let payload = pad(Vec::new(), 8).unwrap();
        assert_eq!(payload.padded_byte_length(), 0);
    }

    #[test]
    fn test_pad_zero_capacity() {
        assert_eq!(pad(vec![1], 0), Err(PadError::ZeroFrameCapacity));
    }

    #[test]
    fn test_unpad_truncates() {
        let result = unpad(vec![1, 2, 3, 0, 0], 3).unwrap();
        assert_eq!(result, vec![1, 2, 3]);
    }

    #[test]
    fn test_unpad_length_exceeds_buffer() {
        let result = unpad(vec![1, 2], 3);
        assert_eq!(
            result,
            Err(PadError::LengthExceedsBuffer {
                original: 3,
                available: 2
            })
        );
    }

    proptest! {
        #[test]
        fn prop_pad_is_minimal(data in proptest::collection::vec(any::<u8>(), 0..300), per_frame in 1usize..64) {
            let payload = pad(data.clone(), per_frame).unwrap();
            prop_assert_eq!(payload.padded_byte_length() % per_frame, 0);
            prop_assert!(payload.padded_byte_length() >= data.len());
            prop_assert!(payload.padded_byte_length() - data.len() < per_frame);
            prop_assert_eq!(&payload.bytes()[..data.len()], &data[..]);
            prop_assert_eq!(unpad(payload.into_bytes(), data.len()).unwrap(), data);
        }
    }
}
