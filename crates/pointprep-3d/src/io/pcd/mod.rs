mod parser;

pub use parser::*;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read PCD file
    #[error("Failed to read PCD file")]
    Io(#[from] std::io::Error),

    /// Unsupported field type or data format
    #[error("Unsupported PCD property: {0}")]
    UnsupportedProperty(String),

    /// Malformed PCD header
    #[error("Malformed PCD header: {0}")]
    MalformedHeader(String),

    /// A required field is not declared in the header
    #[error("Missing PCD field `{0}`")]
    MissingField(&'static str),

    /// Invalid PCD file extension
    #[error("Invalid PCD file extension. Got:{0}")]
    InvalidFileExtension(String),

    /// The data section holds fewer points than declared
    #[error("Truncated PCD data, expected {expected} points but got {got}")]
    Truncated {
        /// Number of points declared in the header.
        expected: usize,
        /// Number of points actually read.
        got: usize,
    },

    /// A point record could not be decoded
    #[error("Invalid value in PCD point {index}")]
    InvalidPoint {
        /// Index of the offending point.
        index: usize,
    },
}
