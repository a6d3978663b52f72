mod parser;
mod properties;

pub use parser::*;
pub use properties::*;

/// Error types for the PLY module.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    /// Failed to read PLY file
    #[error("Failed to read PLY file")]
    Io(#[from] std::io::Error),

    /// Unsupported PLY format or property
    #[error("Unsupported PLY property: {0}")]
    UnsupportedProperty(String),

    /// Malformed PLY header
    #[error("Malformed PLY header: {0}")]
    MalformedHeader(String),

    /// A required vertex property is not declared in the header
    #[error("Missing PLY vertex property `{0}`")]
    MissingProperty(&'static str),

    /// The body holds fewer vertices than declared
    #[error("Truncated PLY data, expected {expected} vertices but got {got}")]
    Truncated {
        /// Number of vertices declared in the header.
        expected: usize,
        /// Number of vertices actually read.
        got: usize,
    },

    /// A vertex record could not be decoded
    #[error("Invalid value in PLY vertex {index}")]
    InvalidVertex {
        /// Index of the offending vertex.
        index: usize,
    },
}
