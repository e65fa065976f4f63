//! safetensors format constants

/// Size of the little-endian `u64` header length prefix
pub const HEADER_LEN_PREFIX: usize = 8;

/// Largest header accepted by default (100 MB)
pub const MAX_HEADER_SIZE: usize = 100_000_000;

/// Reserved header key holding the string metadata map
pub const METADATA_KEY: &str = "__metadata__";
