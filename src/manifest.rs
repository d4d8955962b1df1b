use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archivelogics::ArchiveFormat;
use crate::geometry::FrameGeometry;
use crate::padlogics::PaddedPayload;

pub const MANIFEST_VERSION: u32 = 1;
const MANIFEST_SUFFIX: &str = ".bitreel.toml";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no manifest found at {0}")]
    Missing(PathBuf),
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("failed to write manifest {path}: {reason}")]
    Write { path: PathBuf, reason: String },
    #[error("manifest version {0} is not supported")]
    UnsupportedVersion(u32),
    #[error("manifest is inconsistent: {0}")]
    Inconsistent(String),
}

/// What the decoding side needs to know and cannot read from the video.
///
/// Written next to the video as `<video>.bitreel.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    /// Archive length before padding
    pub original_byte_length: u64,
    pub padded_byte_length: u64,
    /// CRC-32 of the unpadded archive
    pub crc32: u32,
    pub archive: ArchiveFormat,
    pub framerate: u32,
    pub codec: String,
    pub geometry: FrameGeometry,
}

impl Manifest {
    pub fn new(
        payload: &PaddedPayload,
        geometry: &FrameGeometry,
        archive: ArchiveFormat,
        framerate: u32,
        codec: &str,
    ) -> Manifest {
        let original = &payload.bytes()[..payload.original_byte_length()];
        Manifest {
            version: MANIFEST_VERSION,
            original_byte_length: payload.original_byte_length() as u64,
            padded_byte_length: payload.padded_byte_length() as u64,
            crc32: crc32fast::hash(original),
            archive,
            framerate,
            codec: codec.to_string(),
            geometry: *geometry,
        }
    }

    /// Sidecar location for a video
    pub fn path_for(video: &Path) -> PathBuf {
        let mut name = video.as_os_str().to_os_string();
        name.push(MANIFEST_SUFFIX);
        PathBuf::from(name)
    }

    pub fn frame_count(&self) -> u64 {
        self.padded_byte_length / self.geometry.bytes_per_frame() as u64
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(self.version));
        }
        let per_frame = self.geometry.bytes_per_frame() as u64;
        if self.padded_byte_length % per_frame != 0 {
            return Err(ManifestError::Inconsistent(format!(
                "padded length {} is not a multiple of {} bytes per frame",
                self.padded_byte_length, per_frame
            )));
        }
        if self.original_byte_length > self.padded_byte_length
            || self.padded_byte_length - self.original_byte_length >= per_frame
        {
            return Err(ManifestError::Inconsistent(format!(
                "original length {} does not fit padded length {}",
                self.original_byte_length, self.padded_byte_length
            )));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn from_toml(text: &str) -> Result<Manifest, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        let text = self.to_toml().map_err(|e| ManifestError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, text).map_err(|e| ManifestError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load and validate a manifest
    pub fn read(path: &Path) -> Result<Manifest, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::Missing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Manifest::from_toml(&text).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        manifest.validate()?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod manifest_tests {
    use super::*;
    use crate::padlogics::pad;

    fn manifest() -> Manifest {
        let geometry = FrameGeometry::derive(64, 64, 8, 8).unwrap();
        let payload = pad(b"hello".to_vec(), geometry.bytes_per_frame()).unwrap();
        Manifest::new(&payload, &geometry, ArchiveFormat::Zip, 30, "libx264")
    }

    #[test]
    fn test_new_records_lengths_and_checksum() {
        let manifest = manifest();
        assert_eq!(manifest.original_byte_length, 5);
        assert_eq!(manifest.padded_byte_length, 8);
        assert_eq!(manifest.crc32, crc32fast::hash(b"hello"));
        assert_eq!(manifest.frame_count(), 1);
    }

    #[test]
    fn test_toml_round_trip() {
        let manifest = manifest();
        let text = manifest.to_toml().unwrap();
        assert!(text.contains("original_byte_length = 5"));
        assert!(text.contains("block_width = 8"));
        assert_eq!(Manifest::from_toml(&text).unwrap(), manifest);
    }

    #[test]
    fn test_path_for_appends_suffix() {
        let path = Manifest::path_for(Path::new("/tmp/out/video.mp4"));
        assert_eq!(path, PathBuf::from("/tmp/out/video.mp4.bitreel.toml"));
    }

    #[test]
    fn test_validate_unsupported_version() {
        let mut manifest = manifest();
        manifest.version = 7;
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_validate_padding_too_long() {
        let mut manifest = manifest();
        manifest.padded_byte_length = 16;
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_read_missing() {
        let path = std::env::temp_dir().join("bitreel-no-such-manifest.bitreel.toml");
        assert!(matches!(
            Manifest::read(&path),
            Err(ManifestError::Missing(_))
        ));
    }
}
