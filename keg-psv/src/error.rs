//! Error types for PSV parsing

use thiserror::Error;

/// Result type for PSV operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing a PSV document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Document contained no header line
    #[error("Document is empty")]
    EmptyDocument,

    /// Error parsing a field type annotation
    #[error("Invalid field type: {field_type}")]
    InvalidFieldType { field_type: String },

    /// Error parsing the sequence number line
    #[error("Invalid seqn line: {line}")]
    InvalidSequenceNumber { line: String },

    /// More than one `## seqn` line in the document
    #[error("Duplicate seqn in document: {line}")]
    DuplicateSequenceNumber { line: String },

    /// Row has a different number of values than the header
    #[error("Row {row} has {actual} values, header has {expected}")]
    SchemaMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// Column not present in the header
    #[error("Column '{field}' not found in header")]
    FieldNotFound { field: String },

    /// Two columns share the same name
    #[error("Duplicate column name: {field}")]
    DuplicateField { field: String },
}
