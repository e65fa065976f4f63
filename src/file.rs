//! File handle with exact-transfer primitives

use crate::error::{Result, SafeTensorsError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
#[cfg(windows)]
use std::os::windows::io::{AsRawHandle, RawHandle};

/// An open file.
///
/// Reads and writes either transfer the whole buffer or fail; a short
/// transfer is reported as an I/O error and never retried.
#[derive(Debug)]
pub struct FileHandle {
    file: File,
}

impl FileHandle {
    /// Open an existing file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|source| SafeTensorsError::Open { path: path.to_path_buf(), source })?;
        Ok(Self { file })
    }

    /// Create (or truncate) a file for reading and writing
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| SafeTensorsError::Open { path: path.to_path_buf(), source })?;
        Ok(Self { file })
    }

    /// Wrap a file that is already open
    pub fn from_file(file: File) -> Self {
        Self { file }
    }

    /// The underlying file
    pub fn as_file(&self) -> &File {
        &self.file
    }

    /// Current size of the file in bytes
    pub fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Current position of the cursor
    pub fn tell(&self) -> Result<u64> {
        Ok((&self.file).stream_position()?)
    }

    /// Move the cursor, returning the new position
    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        Ok((&self.file).seek(pos)?)
    }

    /// Fill `buf` completely from the current position
    pub fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        (&self.file).read_exact(buf)?;
        Ok(())
    }

    /// Write all of `buf` at the current position
    pub fn write_exact(&self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        (&self.file).write_all(buf)?;
        Ok(())
    }

    /// Read a u32 value in little-endian format
    pub fn read_u32(&self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Write a u32 value in little-endian format
    pub fn write_u32(&self, value: u32) -> Result<()> {
        self.write_exact(&value.to_le_bytes())
    }
}

#[cfg(unix)]
impl AsRawFd for FileHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

#[cfg(windows)]
impl AsRawHandle for FileHandle {
    fn as_raw_handle(&self) -> RawHandle {
        self.file.as_raw_handle()
    }
}
