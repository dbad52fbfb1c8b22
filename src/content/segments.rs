//! Segment list: the copy-on-write layout of a delta document
//!
//! A document is an ordered list of segments. Each segment is a range into
//! either the backing file (`SegmentKind::Source`) or an append-only buffer
//! of bytes added during editing (`SegmentKind::Added`). Edits only split,
//! drop or add segments; the backing file is never touched.
//!
//! ```text
//! source file:  [0 ............................ 100)
//! after insert(40, "xyz") and remove(73, 10):
//! segments:     Source[0..40) Added[0..3) Source[40..70) Source[80..100)
//! ```

use std::ops::Range;

/// Which store a segment's range points into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    /// Byte range of the backing file
    Source,
    /// Byte range of the append-only added buffer
    Added,
}

/// A contiguous run of document bytes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub range: Range<u64>,
}

impl Segment {
    #[inline]
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// Split this segment at `at` (relative), keeping the head and returning the tail
    fn split_off(&mut self, at: u64) -> Segment {
        let split = self.range.start + at;
        let tail = Segment {
            kind: self.kind,
            range: split..self.range.end,
        };
        self.range.end = split;
        tail
    }
}

/// A slice of document bytes, resolved to where it is stored
#[derive(Debug, PartialEq, Eq)]
pub enum Piece<'a> {
    /// Bytes still living in the backing file
    Source { offset: u64, len: u64 },
    /// Bytes held in memory
    Added(&'a [u8]),
}

/// Ordered segments plus the added-bytes buffer they reference
#[derive(Debug, Default, Clone)]
pub struct SegmentList {
    segments: Vec<Segment>,
    added: Vec<u8>,
    size: u64,
}

impl SegmentList {
    /// Create an empty segment list
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a segment list covering the first `len` bytes of the backing file
    pub fn from_source(len: u64) -> Self {
        let mut list = Self::new();
        if len > 0 {
            list.segments.push(Segment {
                kind: SegmentKind::Source,
                range: 0..len,
            });
            list.size = len;
        }
        list
    }

    /// Logical document size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The segments in document order
    #[cfg(test)]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether any segment still references the backing file
    pub fn references_source(&self) -> bool {
        self.segments.iter().any(|s| s.kind == SegmentKind::Source)
    }

    /// Index of the segment that starts exactly at `offset`, splitting one if needed.
    /// Returns `segments.len()` when `offset == size`.
    fn split_at(&mut self, offset: u64) -> usize {
        let mut start = 0;
        for idx in 0..self.segments.len() {
            let len = self.segments[idx].len();
            if offset == start {
                return idx;
            }
            if offset < start + len {
                let tail = self.segments[idx].split_off(offset - start);
                self.segments.insert(idx + 1, tail);
                return idx + 1;
            }
            start += len;
        }
        self.segments.len()
    }

    /// Merge the segment at `idx` into its predecessor when their ranges touch
    fn coalesce(&mut self, idx: usize) {
        if idx == 0 || idx >= self.segments.len() {
            return;
        }
        let (head, tail) = self.segments.split_at_mut(idx);
        let prev = &mut head[idx - 1];
        let next = &tail[0];
        if prev.kind == next.kind && prev.range.end == next.range.start {
            prev.range.end = next.range.end;
            self.segments.remove(idx);
        }
    }

    /// Insert `data` at `offset`. The caller guarantees `offset <= size`.
    pub fn insert(&mut self, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let start = self.added.len() as u64;
        self.added.extend_from_slice(data);
        let len = data.len() as u64;

        let idx = self.split_at(offset);
        self.segments.insert(
            idx,
            Segment {
                kind: SegmentKind::Added,
                range: start..start + len,
            },
        );
        self.size += len;
        self.coalesce(idx + 1);
        self.coalesce(idx);
    }

    /// Remove `len` bytes at `offset`. The caller guarantees the range is in bounds.
    pub fn remove(&mut self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        let start = self.split_at(offset);
        let end = self.split_at(offset + len);
        self.segments.drain(start..end);
        self.size -= len;
        self.coalesce(start);
    }

    /// Visit the pieces covering `offset..offset + len` in order
    pub fn for_each_piece<E>(
        &self,
        offset: u64,
        len: u64,
        mut visit: impl FnMut(Piece<'_>) -> Result<(), E>,
    ) -> Result<(), E> {
        let end = offset + len;
        let mut seg_start = 0;
        for segment in &self.segments {
            let seg_len = segment.len();
            let seg_end = seg_start + seg_len;
            if seg_end <= offset {
                seg_start = seg_end;
                continue;
            }
            if seg_start >= end {
                break;
            }
            let from = offset.max(seg_start) - seg_start;
            let to = end.min(seg_end) - seg_start;
            let inner = segment.range.start + from..segment.range.start + to;
            match segment.kind {
                SegmentKind::Source => visit(Piece::Source {
                    offset: inner.start,
                    len: inner.end - inner.start,
                })?,
                SegmentKind::Added => {
                    visit(Piece::Added(&self.added[inner.start as usize..inner.end as usize]))?
                }
            }
            seg_start = seg_end;
        }
        Ok(())
    }

    /// Replace every source-backed segment with an in-memory copy
    ///
    /// `read_source(offset, len)` must return exactly `len` bytes of the backing
    /// file. On error `self` is left unchanged.
    pub fn materialize<E>(
        &mut self,
        mut read_source: impl FnMut(u64, u64) -> Result<Vec<u8>, E>,
    ) -> Result<(), E> {
        if !self.references_source() {
            return Ok(());
        }
        let mut added = self.added.clone();
        let mut segments = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment.kind {
                SegmentKind::Source => {
                    let bytes = read_source(segment.range.start, segment.len())?;
                    let start = added.len() as u64;
                    added.extend_from_slice(&bytes);
                    segments.push(Segment {
                        kind: SegmentKind::Added,
                        range: start..start + bytes.len() as u64,
                    });
                }
                SegmentKind::Added => segments.push(segment.clone()),
            }
        }
        self.segments = segments;
        self.added = added;
        Ok(())
    }
}
