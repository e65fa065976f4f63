//! Windows file-mapping backend

use super::{Backend, MapOptions, RawMapping};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{Result, SafeTensorsError};
use crate::file::FileHandle;
use memmap2::{Mmap, MmapOptions};
use std::io;
use std::ops::Range;

pub(crate) struct WindowsMapping {
    mmap: Mmap,
}

impl RawMapping for WindowsMapping {
    const BACKEND: Backend = Backend::Windows;

    fn map(
        file: &FileHandle,
        len: usize,
        options: &MapOptions,
        sink: &dyn DiagnosticSink,
    ) -> Result<Self> {
        if options.effective_prefetch() > 0 {
            sink.emit(Diagnostic::HintUnsupported { hint: "PrefetchVirtualMemory" });
        }
        if options.numa {
            sink.emit(Diagnostic::HintUnsupported { hint: "numa" });
        }

        // SAFETY: the view is read-only; callers must not truncate the file
        // while it is mapped.
        let mmap = unsafe { MmapOptions::new().len(len).map(file.as_file()) }
            .map_err(SafeTensorsError::Map)?;
        Ok(Self { mmap })
    }

    fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    unsafe fn release(&mut self, _range: Range<usize>) -> io::Result<()> {
        Ok(())
    }
}
