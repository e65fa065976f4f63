//! Name-keyed index of the tensors in a file image

use crate::error::{FormatError, Result, SafeTensorsError};
use crate::format::constants::HEADER_LEN_PREFIX;
use crate::format::{Dtype, Header, Metadata};
use std::collections::HashMap;
use std::ops::Range;

/// Location and type of one tensor, resolved against the start of the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorEntry {
    /// Name of the tensor
    pub name: String,
    /// Element type
    pub dtype: Dtype,
    /// Dimension sizes
    pub shape: Vec<usize>,
    /// Offsets as declared, relative to the data section
    pub data_offsets: (usize, usize),
    /// Absolute byte range within the file
    pub range: Range<usize>,
}

/// Validated `{name -> (dtype, shape, byte range)}` index.
///
/// Built once from a complete file image and immutable afterwards. Names keep
/// the header's order; when the header repeats a name, the last declaration
/// wins and keeps the position of the first.
#[derive(Debug, Clone, Default)]
pub struct TensorIndex {
    entries: Vec<TensorEntry>,
    positions: HashMap<String, usize>,
    metadata: Metadata,
    data_start: usize,
}

impl TensorIndex {
    /// Parse and validate `buffer`, which must hold the whole file
    pub fn build(buffer: &[u8], max_header_size: usize) -> Result<Self> {
        if buffer.len() < HEADER_LEN_PREFIX {
            return Err(SafeTensorsError::TooSmall {
                size: buffer.len() as u64,
                required: HEADER_LEN_PREFIX,
            });
        }

        let (data_start, header) = Header::parse(buffer, max_header_size)?;

        let mut index = TensorIndex {
            entries: Vec::with_capacity(header.tensors.len()),
            positions: HashMap::with_capacity(header.tensors.len()),
            metadata: header.metadata,
            data_start,
        };

        for descriptor in header.tensors {
            let (start, end) = descriptor.data_offsets;
            let range = data_start
                .checked_add(start)
                .zip(data_start.checked_add(end))
                .map(|(start, end)| start..end)
                .filter(|range| range.start <= range.end && range.end <= buffer.len())
                .ok_or_else(|| FormatError::InvalidOffset(descriptor.name.clone()))?;

            index.insert(TensorEntry {
                name: descriptor.name,
                dtype: descriptor.dtype,
                shape: descriptor.shape,
                data_offsets: descriptor.data_offsets,
                range,
            });
        }

        Ok(index)
    }

    // Header names are already unique.
    fn insert(&mut self, entry: TensorEntry) {
        self.positions.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Look up a tensor by exact name
    pub fn get(&self, name: &str) -> Option<&TensorEntry> {
        self.positions.get(name).map(|&position| &self.entries[position])
    }

    /// All tensor names, in header order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// All entries, in header order
    pub fn entries(&self) -> &[TensorEntry] {
        &self.entries
    }

    /// Metadata from the header
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Offset of the data section within the file
    pub fn data_start(&self) -> usize {
        self.data_start
    }

    /// Get the number of tensors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index holds no tensors
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
