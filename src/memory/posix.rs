//! POSIX mmap backend

use super::{Backend, MapOptions, RawMapping};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{Result, SafeTensorsError};
use crate::file::FileHandle;
use std::io;
use std::ops::Range;
use std::os::unix::io::AsRawFd;
use std::ptr::{self, NonNull};

pub(crate) struct PosixMapping {
    addr: NonNull<u8>,
}

// SAFETY: the mapping is read-only and its address never changes; mutation
// (`release`) needs `&mut self`.
unsafe impl Send for PosixMapping {}
unsafe impl Sync for PosixMapping {}

impl PosixMapping {
    fn advise(
        &self,
        len: usize,
        advice: libc::c_int,
        name: &'static str,
        sink: &dyn DiagnosticSink,
    ) {
        // SAFETY: `len` never exceeds the mapped length
        let rc = unsafe { libc::madvise(self.addr.as_ptr().cast(), len, advice) };
        if rc != 0 {
            sink.emit(Diagnostic::AdviseFailed {
                advice: name,
                message: io::Error::last_os_error().to_string(),
            });
        }
    }
}

impl RawMapping for PosixMapping {
    const BACKEND: Backend = Backend::Posix;

    fn map(
        file: &FileHandle,
        len: usize,
        options: &MapOptions,
        sink: &dyn DiagnosticSink,
    ) -> Result<Self> {
        let fd = file.as_raw_fd();
        let prefetch = options.effective_prefetch();
        #[allow(unused_mut)]
        let mut flags = libc::MAP_SHARED;

        #[cfg(target_os = "linux")]
        {
            // SAFETY: `fd` is an open descriptor owned by `file`
            let rc = unsafe { libc::posix_fadvise(fd, 0, 0, libc::POSIX_FADV_SEQUENTIAL) };
            if rc != 0 {
                sink.emit(Diagnostic::AdviseFailed {
                    advice: "posix_fadvise(POSIX_FADV_SEQUENTIAL)",
                    message: io::Error::from_raw_os_error(rc).to_string(),
                });
            }
            if prefetch > 0 {
                flags |= libc::MAP_POPULATE;
            }
        }

        // SAFETY: a fresh read-only shared mapping chosen by the kernel
        let addr = unsafe { libc::mmap(ptr::null_mut(), len, libc::PROT_READ, flags, fd, 0) };
        if addr == libc::MAP_FAILED {
            return Err(SafeTensorsError::Map(io::Error::last_os_error()));
        }
        let addr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| {
            SafeTensorsError::Map(io::Error::new(io::ErrorKind::Other, "mmap returned null"))
        })?;
        let mapping = Self { addr };

        if prefetch > 0 {
            mapping.advise(len.min(prefetch), libc::MADV_WILLNEED, "madvise(MADV_WILLNEED)", sink);
        }
        if options.numa {
            mapping.advise(len, libc::MADV_RANDOM, "madvise(MADV_RANDOM)", sink);
        }

        Ok(mapping)
    }

    fn as_ptr(&self) -> *const u8 {
        self.addr.as_ptr()
    }

    unsafe fn release(&mut self, range: Range<usize>) -> io::Result<()> {
        let start = self.addr.as_ptr().add(range.start);
        if libc::munmap(start.cast(), range.len()) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
