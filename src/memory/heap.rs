//! Heap backend for platforms without file mapping

use super::{Backend, MapOptions, RawMapping};
use crate::diagnostics::DiagnosticSink;
use crate::error::Result;
use crate::file::FileHandle;
use std::io::{self, SeekFrom};
use std::ops::Range;

pub(crate) struct HeapMapping {
    buffer: Vec<u8>,
}

impl RawMapping for HeapMapping {
    const BACKEND: Backend = Backend::Heap;

    fn map(
        file: &FileHandle,
        len: usize,
        _options: &MapOptions,
        _sink: &dyn DiagnosticSink,
    ) -> Result<Self> {
        // The whole file ends up resident, so there is nothing to prefetch.
        file.seek(SeekFrom::Start(0))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(Self { buffer })
    }

    fn as_ptr(&self) -> *const u8 {
        self.buffer.as_ptr()
    }

    unsafe fn release(&mut self, _range: Range<usize>) -> io::Result<()> {
        Ok(())
    }
}
