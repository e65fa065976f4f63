//! Zero-copy views into mapped tensor data

use crate::format::Dtype;

/// A read-only view of one tensor's bytes inside a mapped file.
///
/// The view borrows from the catalog that produced it, so it cannot outlive
/// the mapping or coexist with a fragment release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorView<'a> {
    dtype: Dtype,
    shape: &'a [usize],
    data: &'a [u8],
    data_offsets: (usize, usize),
}

impl<'a> TensorView<'a> {
    pub(crate) fn new(
        dtype: Dtype,
        shape: &'a [usize],
        data: &'a [u8],
        data_offsets: (usize, usize),
    ) -> Self {
        Self { dtype, shape, data, data_offsets }
    }

    /// Element type
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Dimension sizes
    pub fn shape(&self) -> &'a [usize] {
        self.shape
    }

    /// The tensor's raw little-endian bytes
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Address of the first byte
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Length of the data in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the tensor holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offsets as declared in the header, relative to the data section
    pub fn data_offsets(&self) -> (usize, usize) {
        self.data_offsets
    }

    /// Calculate the number of elements
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}
