//! Page alignment utilities for mappings and locks

use std::ops::Range;

/// Round a position up to the boundary, or `None` if that overflows
pub fn align_up(position: usize, alignment: usize) -> Option<usize> {
    match position % alignment.max(1) {
        0 => Some(position),
        rem => position.checked_add(alignment - rem),
    }
}

/// Round a position down to the boundary
pub fn align_down(position: usize, alignment: usize) -> usize {
    if alignment == 0 || alignment == 1 {
        return position;
    }
    position - position % alignment
}

/// Check if a position is aligned to the specified boundary
pub fn is_aligned(position: usize, alignment: usize) -> bool {
    if alignment == 0 || alignment == 1 {
        return true;
    }
    position % alignment == 0
}

/// Check if an alignment value is valid (power of 2)
pub fn is_valid_alignment(alignment: usize) -> bool {
    alignment > 0 && (alignment & (alignment - 1)) == 0
}

/// Shrink `[first, last)` to the whole pages it fully contains.
///
/// `first` is rounded up and `last` rounded down, so a page that is only
/// partly inside the range is never included. When nothing is left the
/// result is the empty range at the rounded-up start.
pub fn align_range(first: usize, last: usize, page_size: usize) -> Range<usize> {
    let first = align_up(first, page_size).unwrap_or_else(|| align_down(usize::MAX, page_size));
    let last = align_down(last, page_size);
    if last <= first {
        first..first
    } else {
        first..last
    }
}
