//! safetensors format structures
//!
//! This module decodes the length-prefixed JSON header into ordered tensor
//! descriptors and the string metadata map, and validates the declared
//! offsets against the data section.

pub mod constants;
pub mod dtype;
pub mod header;
pub mod metadata;

pub use constants::*;
pub use dtype::*;
pub use header::*;
pub use metadata::*;
