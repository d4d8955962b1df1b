use std::path::PathBuf;

use crate::archivelogics::ArchiveError;
use crate::classifier::BandsError;
use crate::geometry::GeometryError;
use crate::manifest::ManifestError;
use crate::options::OptionsError;
use crate::padlogics::PadError;
use crate::transcoder::BackendError;

/// Every way a job can fail
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Pad(#[from] PadError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Bands(#[from] BandsError),
    #[error("decoded payload checksum {actual:08x} does not match {expected:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("{0} already exists")]
    OutputExists(PathBuf),
    #[error("job was cancelled")]
    Cancelled,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
