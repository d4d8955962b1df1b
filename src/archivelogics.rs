//! Packing input files into one container and back.
//!
//! The container is a ZIP archive written with fixed timestamps and
//! permissions so the same inputs always give the same bytes.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("no input files to archive")]
    NoInput,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("two inputs share the archive name {0}")]
    DuplicateName(String),
    #[error("{0} already exists, refusing to overwrite it")]
    Exists(PathBuf),
    #[error("archive entry {0} would be written outside the output directory")]
    UnsafeEntry(String),
    #[error("corrupt archive: {0}")]
    Corrupt(#[from] zip::result::ZipError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Supported containers
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// ZIP with deflate compression
    #[default]
    Zip,
    /// ZIP without compression
    Stored,
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Zip => "zip",
            Self::Stored => "stored",
        };
        s.fmt(f)
    }
}

impl std::str::FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zip" => Ok(Self::Zip),
            "stored" => Ok(Self::Stored),
            _ => Err(format!("Unknown archive format: {s}")),
        }
    }
}

/// One item to put in the archive
enum Entry {
    File { name: String, path: PathBuf },
    Directory { name: String },
}

impl ArchiveFormat {
    fn compression(&self) -> CompressionMethod {
        match self {
            Self::Zip => CompressionMethod::Deflated,
            Self::Stored => CompressionMethod::Stored,
        }
    }

    /// Archive the paths in the given order.
    ///
    /// Files are stored under their file name. Directories are walked
    /// recursively, sorted by name, and stored under the directory name.
    pub fn pack(&self, paths: &[PathBuf]) -> Result<Vec<u8>, ArchiveError> {
        if paths.is_empty() {
            return Err(ArchiveError::NoInput);
        }
        let mut entries = Vec::new();
        for path in paths {
            collect_entries(path, &mut entries)?;
        }

        let mut names = HashSet::new();
        let options = FileOptions::default()
            .compression_method(self.compression())
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in entries {
            match entry {
                Entry::File { name, path } => {
                    if !names.insert(name.clone()) {
                        return Err(ArchiveError::DuplicateName(name));
                    }
                    let content = fs::read(&path).map_err(io_error(&path))?;
                    debug!("Packing {} ({} bytes)", name, content.len());
                    writer.start_file(name, options)?;
                    writer.write_all(&content).map_err(io_error(&path))?;
                }
                Entry::Directory { name } => {
                    if !names.insert(name.clone()) {
                        return Err(ArchiveError::DuplicateName(name));
                    }
                    writer.add_directory(name, options.unix_permissions(0o755))?;
                }
            }
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Extract every entry under `output_dir`.
    ///
    /// Existing files are never overwritten. Files written by this call are
    /// removed again if extraction fails.
    pub fn unpack(&self, bytes: &[u8], output_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
        let mut written = Vec::new();
        let result = extract_all(bytes, output_dir, &mut written);
        if result.is_err() {
            for path in written.iter().rev() {
                if let Err(err) = fs::remove_file(path) {
                    warn!("Could not remove partial output {}: {}", path.display(), err);
                }
            }
        }
        result.map(|_| written)
    }
}

fn collect_entries(path: &Path, entries: &mut Vec<Entry>) -> Result<(), ArchiveError> {
    let metadata = fs::metadata(path).map_err(io_error(path))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ArchiveError::Io {
            path: path.to_path_buf(),
            source: std::io::ErrorKind::InvalidInput.into(),
        })?;
    if metadata.is_dir() {
        walk_directory(path, &name, entries)
    } else {
        entries.push(Entry::File {
            name,
            path: path.to_path_buf(),
        });
        Ok(())
    }
}

fn walk_directory(dir: &Path, name: &str, entries: &mut Vec<Entry>) -> Result<(), ArchiveError> {
    entries.push(Entry::Directory {
        name: format!("{name}/"),
    });
    let mut children = fs::read_dir(dir)
        .map_err(io_error(dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<PathBuf>, _>>()
        .map_err(io_error(dir))?;
    children.sort();
    for child in children {
        let child_name = match child.file_name() {
            Some(n) => format!("{name}/{}", n.to_string_lossy()),
            None => continue,
        };
        if child.is_dir() {
            walk_directory(&child, &child_name, entries)?;
        } else {
            entries.push(Entry::File {
                name: child_name,
                path: child,
            });
        }
    }
    Ok(())
}

fn extract_all(
    bytes: &[u8],
    output_dir: &Path,
    written: &mut Vec<PathBuf>,
) -> Result<(), ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let relative = match file.enclosed_name() {
            Some(relative) => relative.to_path_buf(),
            None => return Err(ArchiveError::UnsafeEntry(file.name().to_string())),
        };
        let target = output_dir.join(relative);
        if file.is_dir() {
            fs::create_dir_all(&target).map_err(io_error(&target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let mut out = match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(out) => out,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ArchiveError::Exists(target));
            }
            Err(err) => return Err(io_error(&target)(err)),
        };
        written.push(target.clone());
        std::io::copy(&mut file, &mut out).map_err(io_error(&target))?;
        debug!("Extracted {}", target.display());
    }
    Ok(())
}
