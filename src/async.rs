//! Async opening of safetensors files
//!
//! Mapping and parsing are blocking work; this module moves them onto
//! Tokio's blocking pool so async callers do not stall their executor.

use crate::config::LoadConfig;
use crate::error::{Result, SafeTensorsError};
use crate::reader::SafeOpen;
use std::io;
use std::path::Path;

/// Open a safetensors file without blocking the async runtime
pub async fn open_async<P: AsRef<Path>>(path: P, config: LoadConfig) -> Result<SafeOpen> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || SafeOpen::open_with_config(&path, &config))
        .await
        .map_err(|err| SafeTensorsError::Io(io::Error::new(io::ErrorKind::Other, err)))?
}
