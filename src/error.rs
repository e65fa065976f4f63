//! Error types for the safetensors reader

use crate::format::Dtype;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for safetensors operations
pub type Result<T> = std::result::Result<T, SafeTensorsError>;

/// Error types that can occur when opening, mapping or reading a safetensors file
#[derive(Debug, Error)]
pub enum SafeTensorsError {
    /// The file could not be opened
    #[error("can't open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file or buffer is shorter than the header length prefix
    #[error("file is too small: {size} < {required} bytes")]
    TooSmall { size: u64, required: usize },

    /// The header is malformed or describes inconsistent tensors
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// The OS refused to map or unmap the file
    #[error("mmap failed: {0}")]
    Map(#[source] std::io::Error),

    /// A fragment release was requested for an invalid range
    #[error("Invalid range for unmapping: [{first}, {last}) in a mapping of {len} bytes")]
    Range { first: usize, last: usize, len: usize },

    /// No tensor with this name exists
    #[error("key '{0}' not found")]
    NotFound(String),

    /// The tensor exists but its bytes have been unmapped
    #[error("tensor '{0}' points into a released fragment")]
    Released(String),

    /// I/O error occurred, including short reads and writes
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Header decoding and validation failures
#[derive(Debug, Error)]
pub enum FormatError {
    /// The declared header length exceeds the configured limit
    #[error("header of {len} bytes exceeds the {max} byte limit")]
    HeaderTooLarge { len: u64, max: usize },

    /// The declared header length does not fit in the file
    #[error("header length {len} does not fit in a {file_len} byte file")]
    InvalidHeaderLength { len: u64, file_len: usize },

    /// The header is not valid UTF-8
    #[error("header is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The header does not start with `{`
    #[error("header does not start with '{{'")]
    InvalidHeaderStart,

    /// The header is not a JSON object of the expected shape
    #[error("invalid header JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A tensor declares a dtype tag this reader does not know
    #[error("tensor '{name}' has unknown dtype '{dtype}'")]
    UnknownDtype { name: String, dtype: String },

    /// A tensor's offsets are inverted or leave a hole or overlap
    #[error("invalid data offsets for tensor '{0}'")]
    InvalidOffset(String),

    /// Shape or byte-size arithmetic overflowed
    #[error("shape of tensor '{0}' overflows")]
    ValidationOverflow(String),

    /// The byte range does not match dtype and shape
    #[error("tensor '{name}' ({dtype}, shape {shape:?}) covers {len} bytes, expected {expected}")]
    TensorInvalidInfo { name: String, dtype: Dtype, shape: Vec<usize>, len: usize, expected: usize },

    /// The tensors do not cover the whole data section
    #[error("tensor data covers {covered} bytes but the data section has {actual}")]
    IncompleteBuffer { covered: usize, actual: usize },
}
