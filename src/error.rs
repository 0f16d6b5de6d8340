use std::path::{Path, PathBuf};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed tile path {0:?}, expected <zoom>/<column>/<row>.<ext>")]
    MalformedPath(PathBuf),

    #[error("tile {zoom}/{column}/{row} is outside the valid range for zoom {zoom}")]
    InvalidCoordinate { zoom: u8, column: u32, row: u32 },

    #[error("unsupported tile format {0:?}, expected one of png, jpg, webp, pbf")]
    UnsupportedFormat(String),

    #[error("invalid zoom range {min}..={max}")]
    InvalidZoomRange { min: u8, max: u8 },

    #[error("invalid batch size {0}, must be a positive integer")]
    InvalidBatchSize(usize),

    #[error("invalid bounds {0:?}, expected west,south,east,north")]
    InvalidBounds(String),

    #[error("invalid source {path:?}: {reason}")]
    InvalidSource { path: PathBuf, reason: &'static str },

    #[error("no tiles found in {0:?}")]
    EmptySource(PathBuf),

    #[error("destination {0:?} already exists")]
    DestinationExists(PathBuf),

    #[error("error creating archive schema in {path:?}: {source}")]
    SchemaCreation {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("archive writer is {actual}, expected {expected}")]
    WriterState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("error accessing {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error walking directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// File or directory the error is about, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::MalformedPath(path)
            | Error::InvalidSource { path, .. }
            | Error::EmptySource(path)
            | Error::DestinationExists(path)
            | Error::SchemaCreation { path, .. }
            | Error::Io { path, .. } => Some(path.as_path()),
            Error::Walk(e) => e.path(),
            _ => None,
        }
    }

    /// Errors caused by bad arguments or unusable inputs, detected before any
    /// tile is processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidCoordinate { .. }
                | Error::UnsupportedFormat(_)
                | Error::InvalidZoomRange { .. }
                | Error::InvalidBatchSize(_)
                | Error::InvalidBounds(_)
                | Error::InvalidSource { .. }
                | Error::DestinationExists(_)
        )
    }
}
