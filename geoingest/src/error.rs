//! Error types used by the crate.

use std::fmt::{Display, Formatter};

use geoingest_shp::ShpError;
use thiserror::Error;

/// Category of an ingestion problem. Shared by file-level errors and layer warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No decoder claims the file.
    UnsupportedFormat,
    /// Archive structure is unreadable.
    CorruptArchive,
    /// Shapefile group misses a sidecar file.
    MissingSidecar,
    /// Geometry fails structural validation.
    MalformedGeometry,
    /// No transform is available for the source coordinate system.
    UnknownCrs,
    /// Payload or archive entry is truncated or unreadable.
    Io,
    /// The batch is empty or no input could be decoded.
    NoValidFiles,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::CorruptArchive => "corrupt archive",
            ErrorKind::MissingSidecar => "missing sidecar",
            ErrorKind::MalformedGeometry => "malformed geometry",
            ErrorKind::UnknownCrs => "unknown CRS",
            ErrorKind::Io => "I/O error",
            ErrorKind::NoValidFiles => "no valid files",
        };
        write!(f, "{name}")
    }
}

/// Error decoding a single file or shapefile group.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No decoder for the content.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Archive cannot be read.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    /// Required sidecar file is absent.
    #[error("missing sidecar: {0}")]
    MissingSidecar(String),
    /// No valid geometry could be decoded.
    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),
    /// Coordinate system cannot be handled.
    #[error("unknown CRS: {0}")]
    UnknownCrs(String),
    /// Payload is truncated or unreadable.
    #[error("failed to read data: {0}")]
    Io(String),
    /// Shapefile codec error.
    #[error("shapefile error: {0}")]
    Shapefile(#[from] ShpError),
    /// Image decoding error.
    #[error("image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),
    /// Zip archive error.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// XML syntax error.
    #[error("xml error: {0}")]
    Xml(#[from] roxmltree::Error),
    /// The batch was cancelled while the file was decoded.
    #[error("decoding cancelled")]
    Cancelled,
}

impl IngestError {
    /// Category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            IngestError::CorruptArchive(_) | IngestError::Zip(_) => ErrorKind::CorruptArchive,
            IngestError::MissingSidecar(_) => ErrorKind::MissingSidecar,
            IngestError::MalformedGeometry(_) => ErrorKind::MalformedGeometry,
            IngestError::UnknownCrs(_) => ErrorKind::UnknownCrs,
            IngestError::Shapefile(err) => match err {
                ShpError::InvalidFileCode(_) | ShpError::UnsupportedShapeType(_) => {
                    ErrorKind::UnsupportedFormat
                }
                ShpError::InvalidRecord { .. } => ErrorKind::MalformedGeometry,
                _ => ErrorKind::Io,
            },
            IngestError::ImageDecode(image::ImageError::Unsupported(_)) => {
                ErrorKind::UnsupportedFormat
            }
            IngestError::ImageDecode(_)
            | IngestError::Xml(_)
            | IngestError::Io(_)
            | IngestError::Cancelled => ErrorKind::Io,
        }
    }
}

/// Error of one input of the batch. Never stops processing of other inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Name of the input (or `archive/entry` for archive members).
    pub input: String,
    /// Category of the error.
    pub kind: ErrorKind,
    /// Human readable description.
    pub message: String,
}

impl ParseError {
    /// Creates a new error record for the input.
    pub fn new(input: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn from_error(input: impl Into<String>, error: &IngestError) -> Self {
        Self::new(input, error.kind(), error.to_string())
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.input, self.message, self.kind)
    }
}

/// Failure of the whole `parse_files` call.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The batch was empty (no errors) or every input failed (errors of every input).
    #[error("no valid files in the batch ({} errors)", errors.len())]
    NoValidFiles {
        /// Per-input errors.
        errors: Vec<ParseError>,
    },
    /// The batch was cancelled before it completed.
    #[error("batch cancelled")]
    Cancelled,
    /// The async runtime could not be created.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl BatchError {
    /// Category of the error, if it is one of the ingestion error kinds.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            BatchError::NoValidFiles { .. } => Some(ErrorKind::NoValidFiles),
            _ => None,
        }
    }
}
