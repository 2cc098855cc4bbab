//! Read-only views over discontiguous byte segments.
//!
//! A [`SegmentedBuf`] is what a pipe read hands to the parsers: an ordered list of
//! [`Bytes`] segments anchored at an absolute stream [`Position`]. Parsers walk it
//! with a [`Cursor`], which tracks `(segment index, offset)` and never copies unless
//! a value must be assembled from more than one segment.

use std::fmt;
use std::ops::Add;

use bytes::{BufMut, Bytes, BytesMut};

/// An absolute byte offset in a pipe's stream.
///
/// Positions only grow, so a position taken from an older read stays comparable
/// with positions from newer reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(u64);

impl Position {
    pub const ZERO: Position = Position(0);

    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub const fn offset(self) -> u64 {
        self.0
    }

    /// Number of bytes between `earlier` and `self`.
    ///
    /// # Panics
    ///
    /// Panics if `earlier` is after `self`.
    #[allow(clippy::cast_possible_truncation, reason = "distances are bounded by buffered bytes")]
    pub fn distance_from(self, earlier: Position) -> usize {
        assert!(earlier.0 <= self.0, "position {} is before {}", self.0, earlier.0);
        (self.0 - earlier.0) as usize
    }
}

impl Add<usize> for Position {
    type Output = Position;

    fn add(self, rhs: usize) -> Self::Output {
        Position(self.0 + rhs as u64)
    }
}

/// An ordered, immutable sequence of byte segments starting at a known [`Position`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SegmentedBuf {
    segments: Vec<Bytes>,
    start: Position,
    len: usize,
}

impl SegmentedBuf {
    pub fn new(start: Position) -> Self {
        Self { segments: Vec::new(), start, len: 0 }
    }

    /// Builds a buffer from segments, skipping empty ones.
    pub fn from_segments<I>(start: Position, segments: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        let mut buf = Self::new(start);
        for segment in segments {
            buf.push(segment);
        }
        buf
    }

    pub fn push(&mut self, segment: Bytes) {
        if segment.is_empty() {
            return;
        }
        self.len += segment.len();
        self.segments.push(segment);
    }

    #[inline]
    pub fn start(&self) -> Position {
        self.start
    }

    #[inline]
    pub fn end(&self) -> Position {
        self.start + self.len
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor { segments: &self.segments, index: 0, offset: 0, position: self.start, remaining: self.len }
    }

    /// Flattens the buffer, copying only when there is more than one segment.
    pub fn to_bytes(&self) -> Bytes {
        match self.segments.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            _ => {
                let mut bytes = BytesMut::with_capacity(self.len);
                for segment in &self.segments {
                    bytes.put_slice(segment);
                }
                bytes.freeze()
            }
        }
    }
}

impl fmt::Debug for SegmentedBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentedBuf")
            .field("start", &self.start)
            .field("len", &self.len)
            .field("segments", &self.segments.len())
            .finish()
    }
}

/// A forward-only reader over a [`SegmentedBuf`].
///
/// The cursor is `Clone`, so look-ahead is done on a copy and the original is only
/// moved once the caller decides to commit.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    segments: &'a [Bytes],
    index: usize,
    offset: usize,
    position: Position,
    remaining: usize,
}

impl Cursor<'_> {
    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    #[inline]
    fn current(&self) -> &[u8] {
        match self.segments.get(self.index) {
            Some(segment) => &segment[self.offset..],
            None => &[],
        }
    }

    // keeps `index` on a segment that still has unread bytes
    fn step(&mut self, n: usize) {
        self.offset += n;
        self.position = self.position + n;
        self.remaining -= n;
        while self.index < self.segments.len() && self.offset == self.segments[self.index].len() {
            self.index += 1;
            self.offset = 0;
        }
    }

    pub fn peek(&self) -> Option<u8> {
        self.current().first().copied()
    }

    pub fn next_byte(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.step(1);
        Some(byte)
    }

    /// Skips `n` bytes.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes remain.
    pub fn advance(&mut self, mut n: usize) {
        assert!(n <= self.remaining, "advance past the end of the buffer: {n} > {}", self.remaining);
        while n > 0 {
            let step = n.min(self.current().len());
            self.step(step);
            n -= step;
        }
    }

    /// Distance from the cursor to the first occurrence of `byte`, searching across segments.
    pub fn find(&self, byte: u8) -> Option<usize> {
        let mut distance = 0;
        let mut offset = self.offset;
        for segment in self.segments.iter().skip(self.index) {
            let slice = &segment[offset..];
            if let Some(index) = slice.iter().position(|b| *b == byte) {
                return Some(distance + index);
            }
            distance += slice.len();
            offset = 0;
        }
        None
    }

    /// Takes up to `max` bytes from the current segment without copying.
    pub fn take_chunk(&mut self, max: usize) -> Bytes {
        let Some(segment) = self.segments.get(self.index) else {
            return Bytes::new();
        };
        let len = max.min(segment.len() - self.offset);
        let bytes = segment.slice(self.offset..self.offset + len);
        self.step(len);
        bytes
    }

    /// Takes exactly `n` bytes. Zero-copy when they live in one segment.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes remain.
    pub fn take_bytes(&mut self, n: usize) -> Bytes {
        assert!(n <= self.remaining, "take past the end of the buffer: {n} > {}", self.remaining);
        if n <= self.current().len() {
            return self.take_chunk(n);
        }

        let mut bytes = BytesMut::with_capacity(n);
        while bytes.len() < n {
            let chunk = self.take_chunk(n - bytes.len());
            bytes.put_slice(&chunk);
        }
        bytes.freeze()
    }

    /// Copies up to `N` bytes ahead of the cursor into a zero padded array,
    /// returning it with the number of real bytes copied.
    pub fn peek_array<const N: usize>(&self) -> ([u8; N], usize) {
        let mut array = [0u8; N];
        let mut filled = 0;
        let mut offset = self.offset;
        for segment in self.segments.iter().skip(self.index) {
            let slice = &segment[offset..];
            let n = slice.len().min(N - filled);
            array[filled..filled + n].copy_from_slice(&slice[..n]);
            filled += n;
            if filled == N {
                break;
            }
            offset = 0;
        }
        (array, filled)
    }
}
