//! Bookkeeping for the still-mapped parts of a mapping

use std::ops::Range;

/// Sorted, disjoint byte ranges of a mapping that are still backed by the OS.
///
/// A fresh set covers `[0, len)`. Releasing a range drops fragments that lie
/// fully inside it, truncates fragments that straddle one of its edges and
/// splits a fragment that straddles both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentSet {
    fragments: Vec<Range<usize>>,
}

impl FragmentSet {
    /// A set covering `[0, len)`
    pub fn new(len: usize) -> Self {
        let fragments = if len == 0 { Vec::new() } else { vec![0..len] };
        Self { fragments }
    }

    /// The live fragments, in ascending order
    pub fn as_slice(&self) -> &[Range<usize>] {
        &self.fragments
    }

    /// Number of live fragments
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Check if nothing is mapped anymore
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Total number of live bytes
    pub fn mapped_bytes(&self) -> usize {
        self.fragments.iter().map(|fragment| fragment.len()).sum()
    }

    /// Check whether every byte of `range` is still live.
    ///
    /// Fragments never touch each other, so a live range always lies inside
    /// a single fragment. An empty range is live when its start is.
    pub fn contains(&self, range: &Range<usize>) -> bool {
        if range.is_empty() {
            return self
                .fragments
                .iter()
                .any(|fragment| fragment.start <= range.start && range.start <= fragment.end);
        }
        self.fragments
            .iter()
            .any(|fragment| fragment.start <= range.start && range.end <= fragment.end)
    }

    /// The live parts of `range`
    pub fn intersections(&self, range: &Range<usize>) -> Vec<Range<usize>> {
        self.fragments
            .iter()
            .filter_map(|fragment| {
                let start = fragment.start.max(range.start);
                let end = fragment.end.min(range.end);
                (start < end).then_some(start..end)
            })
            .collect()
    }

    /// Remove `range` from the live set
    pub fn release(&mut self, range: &Range<usize>) {
        if range.is_empty() {
            return;
        }

        let (first, last) = (range.start, range.end);
        let mut remaining = Vec::with_capacity(self.fragments.len() + 1);
        for fragment in self.fragments.drain(..) {
            if fragment.start < first && fragment.end > last {
                remaining.push(fragment.start..first);
                remaining.push(last..fragment.end);
            } else if fragment.start < first && fragment.end > first {
                remaining.push(fragment.start..first);
            } else if fragment.start < last && fragment.end > last {
                remaining.push(last..fragment.end);
            } else if fragment.start >= first && fragment.end <= last {
                // fully released
            } else {
                remaining.push(fragment);
            }
        }
        self.fragments = remaining;
    }
}
