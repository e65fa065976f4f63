//! # safetensors-mmap - Zero-copy safetensors reader
//!
//! This library opens `.safetensors` files by mapping them into memory and
//! hands out tensors as borrowed views into the mapping. Pages can optionally
//! be prefetched, pinned in physical memory, or released early once the
//! tensors living in them have been consumed.
//!
//! ```no_run
//! use safetensors_mmap::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let catalog = SafeOpen::open("model.safetensors")?;
//! for name in catalog.keys() {
//!     let view = catalog.get_tensor(name)?;
//!     println!("{name}: {} {:?}", view.dtype(), view.shape());
//! }
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod file;
pub mod format;
pub mod memory;
pub mod reader;
pub mod tensor;

// Optional async support
#[cfg(feature = "async")]
pub mod r#async;

// Re-export main types for convenience
pub use error::{Result, SafeTensorsError};

// Re-export commonly used items in prelude
pub mod prelude {
    pub use crate::config::LoadConfig;
    pub use crate::diagnostics::{Diagnostic, DiagnosticSink, RecordingSink, TracingSink};
    pub use crate::error::{FormatError, Result, SafeTensorsError};
    pub use crate::file::FileHandle;
    pub use crate::format::constants::{MAX_HEADER_SIZE, METADATA_KEY};
    pub use crate::format::{Dtype, Metadata};
    pub use crate::memory::{Backend, MemoryMap};
    pub use crate::reader::SafeOpen;
    pub use crate::tensor::TensorView;
}
