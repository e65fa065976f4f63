//! safetensors header decoding and validation
//!
//! A file starts with a little-endian `u64` giving the length `N` of a UTF-8
//! JSON object. Every key of that object except `__metadata__` describes one
//! tensor; the tensor's `data_offsets` are relative to the data section that
//! begins right after the header, at byte `8 + N`.

use crate::error::{FormatError, Result, SafeTensorsError};
use crate::format::constants::{HEADER_LEN_PREFIX, METADATA_KEY};
use crate::format::dtype::Dtype;
use crate::format::metadata::Metadata;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use std::collections::HashMap;
use std::fmt;

/// Description of one tensor as declared in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
    /// Name of the tensor
    pub name: String,
    /// Element type
    pub dtype: Dtype,
    /// Dimension sizes; an empty shape is a scalar
    pub shape: Vec<usize>,
    /// Byte range relative to the start of the data section
    pub data_offsets: (usize, usize),
}

impl TensorDescriptor {
    /// Calculate the number of elements, or `None` on overflow
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Bytes the dtype and shape require, or `None` on overflow
    pub fn expected_byte_len(&self) -> Option<usize> {
        self.element_count()?.checked_mul(self.dtype.size())
    }

    /// Bytes covered by the declared offsets
    pub fn byte_len(&self) -> usize {
        self.data_offsets.1.saturating_sub(self.data_offsets.0)
    }
}

/// Decoded header: tensors in file order plus the metadata map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Tensor descriptors, in the order the header lists them
    pub tensors: Vec<TensorDescriptor>,
    /// Contents of `__metadata__`, empty when absent
    pub metadata: Metadata,
}

impl Header {
    /// Read the header length prefix
    pub fn read_len(buffer: &[u8]) -> Result<u64> {
        let prefix: [u8; HEADER_LEN_PREFIX] = buffer
            .get(..HEADER_LEN_PREFIX)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(SafeTensorsError::TooSmall {
                size: buffer.len() as u64,
                required: HEADER_LEN_PREFIX,
            })?;
        Ok(u64::from_le_bytes(prefix))
    }

    /// Decode and validate the header of a complete file image.
    ///
    /// Returns the offset of the data section together with the header.
    pub fn parse(buffer: &[u8], max_header_size: usize) -> Result<(usize, Header)> {
        let len = Self::read_len(buffer)?;
        if len > max_header_size as u64 {
            return Err(FormatError::HeaderTooLarge { len, max: max_header_size }.into());
        }

        let data_start = usize::try_from(len)
            .ok()
            .and_then(|len| len.checked_add(HEADER_LEN_PREFIX))
            .filter(|&stop| stop <= buffer.len())
            .ok_or(FormatError::InvalidHeaderLength { len, file_len: buffer.len() })?;

        let text = std::str::from_utf8(&buffer[HEADER_LEN_PREFIX..data_start])
            .map_err(FormatError::from)?;
        if !text.starts_with('{') {
            return Err(FormatError::InvalidHeaderStart.into());
        }

        let header = Self::from_json(text)?;
        header.validate(buffer.len() - data_start)?;
        Ok((data_start, header))
    }

    /// Decode the JSON header without checking offsets against a data section.
    ///
    /// A name declared more than once keeps its first position and its last
    /// declaration; earlier declarations are dropped before validation.
    pub fn from_json(text: &str) -> std::result::Result<Header, FormatError> {
        let raw: RawHeader = serde_json::from_str(text)?;

        let mut tensors: Vec<TensorDescriptor> = Vec::with_capacity(raw.tensors.len());
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(raw.tensors.len());
        for (name, info) in raw.tensors {
            let dtype = info.dtype.parse::<Dtype>().map_err(|unknown| {
                FormatError::UnknownDtype { name: name.clone(), dtype: unknown.0 }
            })?;
            let descriptor = TensorDescriptor {
                name,
                dtype,
                shape: info.shape,
                data_offsets: info.data_offsets,
            };
            match positions.get(&descriptor.name) {
                Some(&position) => tensors[position] = descriptor,
                None => {
                    positions.insert(descriptor.name.clone(), tensors.len());
                    tensors.push(descriptor);
                }
            }
        }

        Ok(Header { tensors, metadata: raw.metadata })
    }

    /// Check that the tensors tile a data section of `data_len` bytes exactly.
    ///
    /// Sorted by offset, every tensor must begin where the previous one ended,
    /// cover exactly `dtype.size() * product(shape)` bytes, and the last one
    /// must end at the end of the data section.
    pub fn validate(&self, data_len: usize) -> std::result::Result<(), FormatError> {
        let mut ordered: Vec<&TensorDescriptor> = self.tensors.iter().collect();
        ordered.sort_by_key(|tensor| tensor.data_offsets);

        let mut cursor = 0usize;
        for tensor in ordered {
            let (start, end) = tensor.data_offsets;
            if start != cursor || end < start {
                return Err(FormatError::InvalidOffset(tensor.name.clone()));
            }

            let expected = tensor
                .expected_byte_len()
                .ok_or_else(|| FormatError::ValidationOverflow(tensor.name.clone()))?;
            if end - start != expected {
                return Err(FormatError::TensorInvalidInfo {
                    name: tensor.name.clone(),
                    dtype: tensor.dtype,
                    shape: tensor.shape.clone(),
                    len: end - start,
                    expected,
                });
            }

            cursor = end;
        }

        if cursor != data_len {
            return Err(FormatError::IncompleteBuffer { covered: cursor, actual: data_len });
        }
        Ok(())
    }
}

#[derive(serde::Deserialize)]
struct RawTensorInfo {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: (usize, usize),
}

/// Header object decoded with its key order intact
struct RawHeader {
    tensors: Vec<(String, RawTensorInfo)>,
    metadata: Metadata,
}

impl<'de> Deserialize<'de> for RawHeader {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RawHeaderVisitor;

        impl<'de> Visitor<'de> for RawHeaderVisitor {
            type Value = RawHeader;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a safetensors header object")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<RawHeader, A::Error> {
                let mut tensors = Vec::with_capacity(map.size_hint().unwrap_or(0));
                let mut metadata = Metadata::new();
                while let Some(key) = map.next_key::<String>()? {
                    if key == METADATA_KEY {
                        metadata = map.next_value()?;
                    } else {
                        tensors.push((key, map.next_value()?));
                    }
                }
                Ok(RawHeader { tensors, metadata })
            }
        }

        deserializer.deserialize_map(RawHeaderVisitor)
    }
}
