//! Load configuration

use crate::format::constants::MAX_HEADER_SIZE;
use crate::memory::MapOptions;

/// Configuration for opening a safetensors file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// Number of leading bytes to fault in eagerly (0 = none)
    pub prefetch: usize,
    /// Advise random access and skip prefetching
    pub numa: bool,
    /// Pin the whole mapping in physical memory, best effort
    pub lock_memory: bool,
    /// Largest JSON header accepted
    pub max_header_size: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            prefetch: usize::MAX,
            numa: false,
            lock_memory: false,
            max_header_size: MAX_HEADER_SIZE,
        }
    }
}

impl LoadConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many leading bytes to prefetch
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Enable or disable random-access advice
    pub fn with_numa(mut self, numa: bool) -> Self {
        self.numa = numa;
        self
    }

    /// Enable or disable page locking
    pub fn with_lock_memory(mut self, lock_memory: bool) -> Self {
        self.lock_memory = lock_memory;
        self
    }

    /// Set the header size limit
    pub fn with_max_header_size(mut self, max_header_size: usize) -> Self {
        self.max_header_size = max_header_size;
        self
    }

    /// Mapping hints derived from this configuration
    pub fn map_options(&self) -> MapOptions {
        MapOptions { prefetch: self.prefetch, numa: self.numa }
    }
}
