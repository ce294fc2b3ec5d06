use thiserror::Error;

/// Error decoding shapefile components.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ShpError {
    /// Data ends before the named structure.
    #[error("unexpected end of data: {0}")]
    Truncated(String),

    /// Header does not start with the shapefile file code.
    #[error("invalid file code {0}, expected 9994")]
    InvalidFileCode(i32),

    /// Shape type code is unknown or not decodable.
    #[error("unsupported shape type {0}")]
    UnsupportedShapeType(i32),

    /// Record content is inconsistent.
    #[error("invalid record {index}: {message}")]
    InvalidRecord {
        /// Position of the record in the file.
        index: usize,
        /// Description of the problem.
        message: String,
    },

    /// `.shx` index does not match the main file.
    #[error("invalid shx index: {0}")]
    InvalidIndex(String),

    /// `.dbf` table header or records are invalid.
    #[error("invalid dbf table: {0}")]
    InvalidDbf(String),
}

impl ShpError {
    /// Returns true if the error means the data ended before the structure it describes.
    pub fn is_truncation(&self) -> bool {
        matches!(self, ShpError::Truncated(_))
    }
}
