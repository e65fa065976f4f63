//! Memory mapping support for safetensors files
//!
//! [`MemoryMap`] maps a whole file read-only and keeps track of which parts
//! of it are still mapped. The mechanism is picked at build time: the POSIX
//! mmap family on unix, `MapViewOfFile` (through memmap2) on Windows, and a
//! heap copy of the file elsewhere or when the `heap-fallback` feature is on.
//! Only the POSIX backend can give pages back early; on the others
//! [`MemoryMap::unmap_fragment`] does nothing.

pub mod alignment;
pub mod fragments;
pub mod lock;

#[cfg(all(unix, not(feature = "heap-fallback")))]
mod posix;
#[cfg(all(windows, not(feature = "heap-fallback")))]
mod windows;
#[cfg(any(feature = "heap-fallback", not(any(unix, windows))))]
mod heap;

pub use alignment::{align_down, align_range, align_up, is_aligned};
pub use fragments::FragmentSet;
pub use lock::{LockState, MemoryLock, OsLocker, PageLocker};

use crate::diagnostics::{default_sink, Diagnostic, DiagnosticSink};
use crate::error::{Result, SafeTensorsError};
use crate::file::FileHandle;
use crate::format::constants::HEADER_LEN_PREFIX;
use std::io;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

#[cfg(all(unix, not(feature = "heap-fallback")))]
type Platform = posix::PosixMapping;
#[cfg(all(windows, not(feature = "heap-fallback")))]
type Platform = windows::WindowsMapping;
#[cfg(any(feature = "heap-fallback", not(any(unix, windows))))]
type Platform = heap::HeapMapping;

/// Which mechanism backs a [`MemoryMap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// `mmap`/`munmap` with access-pattern advice
    Posix,
    /// A read-only file mapping view
    Windows,
    /// The whole file read into a heap buffer
    Heap,
}

impl Backend {
    /// Whether pages can be released before the mapping is dropped
    pub fn supports_release(self) -> bool {
        matches!(self, Backend::Posix)
    }
}

/// Hints for establishing a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapOptions {
    /// Number of leading bytes to fault in eagerly; 0 disables prefetching
    pub prefetch: usize,
    /// Mark the mapping for random access; also disables prefetching
    pub numa: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self { prefetch: usize::MAX, numa: false }
    }
}

impl MapOptions {
    /// Prefetch length after `numa` has been taken into account
    pub fn effective_prefetch(&self) -> usize {
        if self.numa {
            0
        } else {
            self.prefetch
        }
    }
}

/// A platform mapping mechanism.
///
/// Implementations only hand out the base address; [`MemoryMap`] owns the
/// fragment bookkeeping and decides what may be released.
pub(crate) trait RawMapping: Sized + Send + Sync {
    /// The mechanism this implementation uses
    const BACKEND: Backend;

    /// Map `len` bytes of `file` read-only
    fn map(
        file: &FileHandle,
        len: usize,
        options: &MapOptions,
        sink: &dyn DiagnosticSink,
    ) -> Result<Self>;

    /// Base address of the mapping
    fn as_ptr(&self) -> *const u8;

    /// Give `range` back to the OS.
    ///
    /// # Safety
    ///
    /// `range` must start on a page boundary, lie inside a live fragment and
    /// no reference into it may be alive.
    unsafe fn release(&mut self, range: Range<usize>) -> io::Result<()>;
}

/// Page size of the running system
pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }
    4096
}

/// A read-only view of a whole file.
///
/// Reading through a `MemoryMap` needs only `&self`, so it can be shared
/// between threads freely. Releasing fragments and dropping need exclusive
/// access, which the borrow checker enforces.
pub struct MemoryMap {
    raw: Platform,
    len: usize,
    fragments: FragmentSet,
    sink: Arc<dyn DiagnosticSink>,
}

impl MemoryMap {
    /// Map a file, reporting soft failures through `tracing`
    pub fn map(file: &FileHandle, options: &MapOptions) -> Result<Self> {
        Self::map_with_sink(file, options, default_sink())
    }

    /// Map a file, reporting soft failures to `sink`
    pub fn map_with_sink(
        file: &FileHandle,
        options: &MapOptions,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let size = file.size()?;
        if size < HEADER_LEN_PREFIX as u64 {
            return Err(SafeTensorsError::TooSmall { size, required: HEADER_LEN_PREFIX });
        }
        let len = usize::try_from(size).map_err(|_| {
            SafeTensorsError::Map(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("file of {} bytes does not fit in the address space", size),
            ))
        })?;

        let raw = Platform::map(file, len, options, sink.as_ref())?;
        debug!(len, backend = ?Platform::BACKEND, prefetch = options.effective_prefetch(), "mapped file");

        Ok(Self { raw, len, fragments: FragmentSet::new(len), sink })
    }

    /// The mechanism backing this map
    pub fn backend(&self) -> Backend {
        Platform::BACKEND
    }

    /// Base address of the mapping
    pub fn as_ptr(&self) -> *const u8 {
        self.raw.as_ptr()
    }

    /// Size of the mapped file in bytes, including released fragments
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the mapped file is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes still mapped
    pub fn mapped_len(&self) -> usize {
        self.fragments.mapped_bytes()
    }

    /// The still-mapped byte ranges, in ascending order
    pub fn fragments(&self) -> &[Range<usize>] {
        self.fragments.as_slice()
    }

    /// Check whether every byte of `range` can be read
    pub fn is_mapped(&self, range: &Range<usize>) -> bool {
        range.start <= range.end && range.end <= self.len && self.fragments.contains(range)
    }

    /// Borrow `range` of the file, or `None` if any of it is out of bounds
    /// or released
    pub fn get(&self, range: Range<usize>) -> Option<&[u8]> {
        if !self.is_mapped(&range) {
            return None;
        }
        // SAFETY: the range is in bounds and still mapped, and releasing any
        // part of it requires `&mut self`, which cannot coexist with the
        // returned borrow.
        Some(unsafe { std::slice::from_raw_parts(self.as_ptr().add(range.start), range.len()) })
    }

    /// The whole file, or `None` once any fragment has been released
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.get(0..self.len)
    }

    /// Release the whole pages inside `[first, last)`.
    ///
    /// `first` is rounded up and `last` rounded down to page boundaries so
    /// that a page still partly wanted is never released. An empty aligned
    /// range is a no-op, as is every call on backends that cannot release
    /// pages early.
    pub fn unmap_fragment(&mut self, first: usize, last: usize) -> Result<()> {
        if !Platform::BACKEND.supports_release() {
            debug!(first, last, backend = ?Platform::BACKEND, "fragment release not supported, ignoring");
            return Ok(());
        }

        let page = page_size();
        let range = align_range(first, last, page);
        if range.is_empty() {
            return Ok(());
        }

        let mapped_end = align_up(self.len, page).unwrap_or(usize::MAX);
        if !is_aligned(range.start, page)
            || !is_aligned(range.end, page)
            || range.start >= range.end
            || range.end > mapped_end
        {
            return Err(SafeTensorsError::Range { first, last, len: self.len });
        }

        for piece in self.fragments.intersections(&range) {
            // SAFETY: `piece` starts on a page boundary (fragment starts are 0
            // or earlier aligned release ends), lies inside a live fragment, and
            // `&mut self` rules out outstanding borrows.
            unsafe { self.raw.release(piece.clone()) }.map_err(SafeTensorsError::Map)?;
            self.fragments.release(&piece);
        }
        debug!(start = range.start, end = range.end, live = self.mapped_len(), "released fragment");
        Ok(())
    }
}

impl Drop for MemoryMap {
    fn drop(&mut self) {
        if !Platform::BACKEND.supports_release() {
            return;
        }
        for fragment in self.fragments.as_slice() {
            // SAFETY: every live fragment is page-aligned at its start and
            // nothing can borrow the map while it is dropped.
            if let Err(error) = unsafe { self.raw.release(fragment.clone()) } {
                self.sink.emit(Diagnostic::UnmapFailed {
                    offset: fragment.start,
                    len: fragment.len(),
                    message: error.to_string(),
                });
            }
        }
    }
}

impl std::fmt::Debug for MemoryMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMap")
            .field("backend", &Platform::BACKEND)
            .field("len", &self.len)
            .field("fragments", &self.fragments.as_slice())
            .finish()
    }
}
