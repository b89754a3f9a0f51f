use crate::compress::CompressFormat;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid vendor boot magic: {found:02x?}")]
    BadMagic { found: Vec<u8> },
    #[error("Header truncated while reading {field} at offset {offset}")]
    Truncated { field: &'static str, offset: usize },
    #[error("Vendor ramdisk table truncated: need {needed} bytes, {available} available")]
    TruncatedTable { needed: usize, available: usize },
    #[error("Vendor ramdisk {name:?} out of bounds: offset={offset} size={size}")]
    SegmentOutOfBounds {
        name: String,
        offset: usize,
        size: usize,
    },
    #[error("Failed to decompress {format:?} payload")]
    Decompress {
        format: CompressFormat,
        #[source]
        source: io::Error,
    },
    #[error("No ramdisk/ directory or ramdisk.cpio found in {0:?}")]
    MissingRamdisk(PathBuf),
    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
