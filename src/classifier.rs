//! Block classification for the direct-sample decode path.
//!
//! A block is reduced to its average intensity and mapped into one of three
//! bands. The middle band is left undecided on purpose: a block that lands
//! there is either past the end of the data or damaged, and reading it as a
//! bit would hide that.

use serde::{Deserialize, Serialize};

/// Outcome of classifying one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockClass {
    Bit(bool),
    Undecidable,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BandsError {
    #[error("low band upper bound {low_max} must be below high band lower bound {high_min}")]
    Overlapping { low_max: u8, high_min: u8 },
}

/// Intensity bands over `0..=255`.
///
/// `avg <= low_max` is a 0, `avg >= high_min` is a 1, anything between is
/// undecidable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationBands {
    pub low_max: u8,
    pub high_min: u8,
}

impl Default for ClassificationBands {
    fn default() -> Self {
        Self {
            low_max: 63,   // lowest quarter
            high_min: 192, // highest quarter
        }
    }
}

impl ClassificationBands {
    pub fn new(low_max: u8, high_min: u8) -> Result<Self, BandsError> {
        let bands = Self { low_max, high_min };
        bands.validate()?;
        Ok(bands)
    }

    pub fn validate(&self) -> Result<(), BandsError> {
        if self.low_max >= self.high_min {
            return Err(BandsError::Overlapping {
                low_max: self.low_max,
                high_min: self.high_min,
            });
        }
        Ok(())
    }

    /// Map an average intensity to its band
    pub fn classify_average(&self, average: u8) -> BlockClass {
        if average <= self.low_max {
            BlockClass::Bit(false)
        } else if average >= self.high_min {
            BlockClass::Bit(true)
        } else {
            BlockClass::Undecidable
        }
    }

    /// Classify a block of single channel intensities.
    /// An empty block carries nothing and is undecidable.
    pub fn classify(&self, samples: &[u8]) -> BlockClass {
        match average(samples) {
            Some(avg) => self.classify_average(avg),
            None => BlockClass::Undecidable,
        }
    }
}

/// Integer (floor) mean of the samples
pub fn average(samples: &[u8]) -> Option<u8> {
    if samples.is_empty() {
        return None;
    }
    let sum: u64 = samples.iter().map(|x| u64::from(*x)).sum();
    Some((sum / samples.len() as u64) as u8)
}

#[cfg(test)]
mod classifier_tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classify_all_dark() {
        let bands = ClassificationBands::default();
        assert_eq!(bands.classify(&[0; 64]), BlockClass::Bit(false));
    }

    #[test]
    fn test_classify_all_light() {
        let bands = ClassificationBands::default();
        assert_eq!(bands.classify(&[255; 64]), BlockClass::Bit(true));
    }

    #[test]
    fn test_classify_half_and_half_is_undecidable() {
        let bands = ClassificationBands::default();
        let mut samples = vec![0u8; 32];
        samples.extend(vec![255u8; 32]);
        assert_eq!(bands.classify(&samples), BlockClass::Undecidable);
    }

    #[test]
    fn test_classify_noisy_light_block() {
        let bands = ClassificationBands::default();
        // A few blurred pixels do not flip a light block
        let mut samples = vec![250u8; 60];
        samples.extend([90, 100, 120, 140]);
        assert_eq!(bands.classify(&samples), BlockClass::Bit(true));
    }

    #[test]
    fn test_classify_boundaries_inclusive() {
        let bands = ClassificationBands::default();
        assert_eq!(bands.classify_average(63), BlockClass::Bit(false));
        assert_eq!(bands.classify_average(64), BlockClass::Undecidable);
        assert_eq!(bands.classify_average(191), BlockClass::Undecidable);
        assert_eq!(bands.classify_average(192), BlockClass::Bit(true));
    }

    #[test]
    fn test_classify_empty_block() {
        let bands = ClassificationBands::default();
        assert_eq!(bands.classify(&[]), BlockClass::Undecidable);
    }

    #[test]
    fn test_new_rejects_overlap() {
        assert_eq!(
            ClassificationBands::new(200, 100),
            Err(BandsError::Overlapping {
                low_max: 200,
                high_min: 100
            })
        );
    }

    proptest! {
        #[test]
        fn prop_classify_monotonic(low in 0u8..200, gap in 1u8..55, avg in any::<u8>()) {
            let bands = ClassificationBands::new(low, low + gap).unwrap();
            let class = bands.classify(&[avg; 16]);
            if avg <= bands.low_max {
                prop_assert_eq!(class, BlockClass::Bit(false));
            } else if avg >= bands.high_min {
                prop_assert_eq!(class, BlockClass::Bit(true));
            } else {
                prop_assert_eq!(class, BlockClass::Undecidable);
            }
        }

        #[test]
        fn prop_classify_depends_only_on_average(samples in proptest::collection::vec(any::<u8>(), 1..64)) {
            let bands = ClassificationBands::default();
            let avg = average(&samples).unwrap();
            prop_assert_eq!(bands.classify(&samples), bands.classify_average(avg));
        }
    }
}
