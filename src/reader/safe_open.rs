//! Memory-mapped safetensors catalog

use crate::config::LoadConfig;
use crate::diagnostics::{default_sink, DiagnosticSink};
use crate::error::{Result, SafeTensorsError};
use crate::file::FileHandle;
use crate::format::Metadata;
use crate::memory::{align_range, page_size, LockState, MemoryLock, MemoryMap, OsLocker};
use crate::tensor::{TensorEntry, TensorIndex, TensorView};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// An open safetensors file.
///
/// The file is mapped once and every tensor is served as a [`TensorView`]
/// borrowing from the mapping, without copying. Construction either yields
/// the complete catalog or an error; there is no partially loaded state.
///
/// After construction the catalog is read-only and can be shared between
/// threads. [`unmap_fragment`](SafeOpen::unmap_fragment) needs `&mut self`,
/// so no view can be alive while pages are released.
#[derive(Debug)]
pub struct SafeOpen {
    // Field order is drop order: unpin, unmap, then close the file.
    lock: Option<MemoryLock>,
    index: TensorIndex,
    map: MemoryMap,
    file: FileHandle,
}

impl SafeOpen {
    /// Open and map a file with the default configuration
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, &LoadConfig::default())
    }

    /// Open and map a file with a custom configuration
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &LoadConfig) -> Result<Self> {
        Self::open_with_sink(path, config, default_sink())
    }

    /// Open and map a file, reporting soft failures to `sink`
    pub fn open_with_sink<P: AsRef<Path>>(
        path: P,
        config: &LoadConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening safetensors file");
        let file = FileHandle::open(path)?;
        Self::from_file(file, config, sink)
    }

    /// Map an already open file
    pub fn from_file(
        file: FileHandle,
        config: &LoadConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let map = MemoryMap::map_with_sink(&file, &config.map_options(), sink.clone())?;
        let buffer = map.as_slice().ok_or_else(|| {
            SafeTensorsError::Map(io::Error::new(io::ErrorKind::Other, "fresh mapping is incomplete"))
        })?;
        let index = TensorIndex::build(buffer, config.max_header_size)?;

        let lock = config.lock_memory.then(|| {
            let mut lock = MemoryLock::with_locker(map.as_ptr(), OsLocker, sink.clone());
            lock.grow_to(map.len());
            lock
        });

        info!(
            tensors = index.len(),
            metadata = index.metadata().len(),
            bytes = map.len(),
            "loaded safetensors file"
        );
        Ok(Self { lock, index, map, file })
    }

    /// All tensor names, in header order
    pub fn keys(&self) -> Vec<&str> {
        self.index.names().collect()
    }

    /// Get the number of tensors
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the file holds no tensors
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Check whether a tensor with this exact name exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.get(name).is_some()
    }

    /// Borrow a tensor by exact name
    pub fn get_tensor(&self, name: &str) -> Result<TensorView<'_>> {
        let entry =
            self.index.get(name).ok_or_else(|| SafeTensorsError::NotFound(name.to_string()))?;
        self.view(entry)
    }

    /// Every tensor whose bytes are still mapped, in header order.
    ///
    /// Tensors overlapping a page released by
    /// [`unmap_fragment`](SafeOpen::unmap_fragment) are left out. They still
    /// appear in [`keys`](SafeOpen::keys), and
    /// [`get_tensor`](SafeOpen::get_tensor) reports them as
    /// [`SafeTensorsError::Released`] rather than `NotFound`.
    pub fn tensors(&self) -> impl Iterator<Item = (&str, TensorView<'_>)> {
        self.index
            .entries()
            .iter()
            .filter_map(|entry| self.view(entry).ok().map(|view| (entry.name.as_str(), view)))
    }

    /// Header metadata
    pub fn metadata(&self) -> &Metadata {
        self.index.metadata()
    }

    /// Offset of the data section within the file
    pub fn data_offset(&self) -> usize {
        self.index.data_start()
    }

    /// The underlying mapping
    pub fn memory_map(&self) -> &MemoryMap {
        &self.map
    }

    /// The underlying file
    pub fn file(&self) -> &FileHandle {
        &self.file
    }

    /// Bytes currently pinned in physical memory
    pub fn locked_len(&self) -> usize {
        self.lock.as_ref().map_or(0, MemoryLock::locked_len)
    }

    /// Lock state, or `None` if locking was not requested
    pub fn lock_state(&self) -> Option<LockState> {
        self.lock.as_ref().map(MemoryLock::state)
    }

    /// Give the whole pages inside `[first, last)` back to the OS.
    ///
    /// Offsets are absolute file offsets. Tensors overlapping a released page
    /// fail to resolve afterwards with [`SafeTensorsError::Released`].
    pub fn unmap_fragment(&mut self, first: usize, last: usize) -> Result<()> {
        self.map.unmap_fragment(first, last)?;
        if let Some(lock) = self.lock.as_mut() {
            if self.map.backend().supports_release() {
                // munmap dropped the locks on these pages.
                lock.forget(align_range(first, last, page_size()));
            }
        }
        Ok(())
    }

    fn view<'a>(&'a self, entry: &'a TensorEntry) -> Result<TensorView<'a>> {
        let data = self
            .map
            .get(entry.range.clone())
            .ok_or_else(|| SafeTensorsError::Released(entry.name.clone()))?;
        Ok(TensorView::new(entry.dtype, &entry.shape, data, entry.data_offsets))
    }
}
