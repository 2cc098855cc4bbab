//! Single-producer single-consumer byte pipe with backpressure.
//!
//! A pipe connects the transport and the protocol layer in one direction. The writer
//! stages bytes in a local [`BytesMut`] and publishes them on [`PipeWriter::flush`];
//! the reader receives every published byte as a [`SegmentedBuf`] and tells the pipe
//! how far it got with [`PipeReader::advance_to`].
//!
//! # Flow control
//!
//! - A flush suspends once more than the pause threshold is buffered and resumes
//!   only after the reader drained the pipe down to the resume threshold.
//! - A read suspends until the pipe holds bytes past the examined position, the
//!   writer completes, or the read is canceled. Reporting everything as examined
//!   therefore parks the reader until strictly more data arrives.
//!
//! # Termination
//!
//! Completing either side, with or without an error, is observed by the next
//! operation on the other side. Dropping a side completes it.
//!
//! ```
//! use micro_h1::config::PipeOptions;
//! use micro_h1::pipe::pipe;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let (mut writer, mut reader) = pipe(PipeOptions::default());
//! writer.write(b"hello").await.unwrap();
//!
//! let read = reader.read().await.unwrap();
//! assert_eq!(&read.buffer().to_bytes()[..], b"hello");
//!
//! let end = read.buffer().end();
//! reader.advance_to(end, end).unwrap();
//! # });
//! ```

mod buffer;

pub use buffer::{Cursor, Position, SegmentedBuf};

use std::collections::VecDeque;
use std::future::poll_fn;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tracing::trace;

use crate::config::PipeOptions;
use crate::ensure;

#[derive(Debug, Clone, Error)]
pub enum PipeError {
    #[error("pipe io error: {0}")]
    Io(Arc<io::Error>),

    #[error("invalid advance: {reason}")]
    InvalidAdvance { reason: &'static str },

    #[error("pipe writer already completed")]
    WriterCompleted,

    #[error("pipe reader already completed")]
    ReaderCompleted,
}

impl PipeError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io(Arc::new(e.into()))
    }

    /// The kind of the underlying io error, if this error came from io.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl From<io::Error> for PipeError {
    fn from(e: io::Error) -> Self {
        Self::io(e)
    }
}

/// Outcome of a successful [`PipeReader::read`].
#[derive(Debug, Clone)]
pub struct ReadResult {
    buffer: SegmentedBuf,
    is_completed: bool,
    is_canceled: bool,
}

impl ReadResult {
    /// Every unconsumed byte, examined or not.
    pub fn buffer(&self) -> &SegmentedBuf {
        &self.buffer
    }

    /// The writer completed; no more bytes will follow `buffer`.
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    /// The read was woken by [`ReadCanceler::cancel`] rather than by data.
    pub fn is_canceled(&self) -> bool {
        self.is_canceled
    }
}

/// Outcome of a successful [`PipeWriter::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushResult {
    is_completed: bool,
    is_canceled: bool,
}

impl FlushResult {
    /// The reader completed; further writes are discarded.
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn is_canceled(&self) -> bool {
        self.is_canceled
    }
}

#[derive(Debug)]
struct State {
    options: PipeOptions,
    segments: VecDeque<Bytes>,
    buffered: usize,
    consumed: Position,
    examined: Position,
    writer_paused: bool,
    writer_completed: bool,
    writer_error: Option<PipeError>,
    reader_completed: bool,
    reader_error: Option<PipeError>,
    read_canceled: bool,
    flush_canceled: bool,
    read_waker: Option<Waker>,
    flush_waker: Option<Waker>,
}

impl State {
    fn end(&self) -> Position {
        self.consumed + self.buffered
    }

    fn snapshot(&self) -> SegmentedBuf {
        SegmentedBuf::from_segments(self.consumed, self.segments.iter().cloned())
    }

    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    fn wake_writer(&mut self) {
        if let Some(waker) = self.flush_waker.take() {
            waker.wake();
        }
    }
}

type Shared = Arc<Mutex<State>>;

// the state is plain data, so a poisoned lock is still usable
fn lock(shared: &Shared) -> MutexGuard<'_, State> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates a connected writer and reader pair.
pub fn pipe(options: PipeOptions) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Mutex::new(State {
        options,
        segments: VecDeque::new(),
        buffered: 0,
        consumed: Position::ZERO,
        examined: Position::ZERO,
        writer_paused: false,
        writer_completed: false,
        writer_error: None,
        reader_completed: false,
        reader_error: None,
        read_canceled: false,
        flush_canceled: false,
        read_waker: None,
        flush_waker: None,
    }));

    let writer = PipeWriter { shared: Arc::clone(&shared), staging: BytesMut::new(), completed: false };
    let reader = PipeReader { shared, completed: false };
    (writer, reader)
}

/// Producing half of a pipe.
#[derive(Debug)]
pub struct PipeWriter {
    shared: Shared,
    staging: BytesMut,
    completed: bool,
}

impl PipeWriter {
    /// Staging buffer; its contents become visible to the reader on the next flush.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.staging
    }

    /// Total bytes the reader has consumed so far.
    pub fn consumed(&self) -> u64 {
        lock(&self.shared).consumed.offset()
    }

    pub fn flush_canceler(&self) -> FlushCanceler {
        FlushCanceler { shared: Arc::clone(&self.shared) }
    }

    /// Wakes a pending flush, or makes the next flush return at once, with `is_canceled` set.
    pub fn cancel_pending_flush(&self) {
        self.flush_canceler().cancel();
    }

    pub fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<Result<FlushResult, PipeError>> {
        if self.completed {
            return Poll::Ready(Err(PipeError::WriterCompleted));
        }

        let mut state = lock(&self.shared);
        if let Some(e) = &state.reader_error {
            return Poll::Ready(Err(e.clone()));
        }

        if state.reader_completed {
            self.staging.clear();
            return Poll::Ready(Ok(FlushResult { is_completed: true, is_canceled: false }));
        }

        if !self.staging.is_empty() {
            let bytes = self.staging.split().freeze();
            trace!(len = bytes.len(), "publish bytes to pipe");
            state.buffered += bytes.len();
            state.segments.push_back(bytes);
            state.wake_reader();
        }

        if state.flush_canceled {
            state.flush_canceled = false;
            return Poll::Ready(Ok(FlushResult { is_completed: false, is_canceled: true }));
        }

        if state.buffered > state.options.pause_writer_threshold() {
            state.writer_paused = true;
        }

        if state.writer_paused && state.buffered > state.options.resume_writer_threshold() {
            trace!(buffered = state.buffered, "pipe writer paused");
            state.flush_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        state.writer_paused = false;
        Poll::Ready(Ok(FlushResult::default()))
    }

    /// Publishes staged bytes, waiting while the pipe is above its pause threshold.
    pub async fn flush(&mut self) -> Result<FlushResult, PipeError> {
        poll_fn(|cx| self.poll_flush(cx)).await
    }

    /// Stages `bytes` and flushes.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<FlushResult, PipeError> {
        self.staging.extend_from_slice(bytes);
        self.flush().await
    }

    /// Marks the end of the stream. Staged bytes are published unless `error` is set.
    pub fn complete(&mut self, error: Option<io::Error>) {
        if self.completed {
            return;
        }
        self.completed = true;

        let mut state = lock(&self.shared);
        if error.is_none() && !self.staging.is_empty() && !state.reader_completed {
            let bytes = self.staging.split().freeze();
            state.buffered += bytes.len();
            state.segments.push_back(bytes);
        }
        state.writer_completed = true;
        state.writer_error = error.map(PipeError::io);
        state.wake_reader();
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.complete(None);
    }
}

/// Consuming half of a pipe.
#[derive(Debug)]
pub struct PipeReader {
    shared: Shared,
    completed: bool,
}

impl PipeReader {
    pub fn read_canceler(&self) -> ReadCanceler {
        ReadCanceler { shared: Arc::clone(&self.shared) }
    }

    /// Wakes a pending read, or makes the next read return at once, with `is_canceled` set.
    pub fn cancel_pending_read(&self) {
        self.read_canceler().cancel();
    }

    pub fn poll_read(&mut self, cx: &mut Context<'_>) -> Poll<Result<ReadResult, PipeError>> {
        if self.completed {
            return Poll::Ready(Err(PipeError::ReaderCompleted));
        }

        let mut state = lock(&self.shared);
        if state.read_canceled {
            state.read_canceled = false;
            let buffer = state.snapshot();
            return Poll::Ready(Ok(ReadResult { buffer, is_completed: false, is_canceled: true }));
        }

        if let Some(e) = &state.writer_error {
            return Poll::Ready(Err(e.clone()));
        }

        if state.end() > state.examined || state.writer_completed {
            let buffer = state.snapshot();
            return Poll::Ready(Ok(ReadResult { buffer, is_completed: state.writer_completed, is_canceled: false }));
        }

        state.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Waits for bytes past the examined position, completion or cancellation.
    pub async fn read(&mut self) -> Result<ReadResult, PipeError> {
        poll_fn(|cx| self.poll_read(cx)).await
    }

    /// Retires bytes up to `consumed` and records that the reader looked at
    /// everything up to `examined`.
    ///
    /// Both positions come from the buffer of the last read: `consumed` may not move
    /// backwards, and `consumed <= examined <= buffer.end()` must hold.
    pub fn advance_to(&mut self, consumed: Position, examined: Position) -> Result<(), PipeError> {
        let mut state = lock(&self.shared);
        ensure!(consumed <= examined, PipeError::InvalidAdvance { reason: "consumed is after examined" });
        ensure!(consumed >= state.consumed, PipeError::InvalidAdvance { reason: "consumed moved backwards" });
        ensure!(examined <= state.end(), PipeError::InvalidAdvance { reason: "examined is past the buffered data" });

        let retired = consumed.distance_from(state.consumed);
        let mut remaining = retired;
        while remaining > 0 {
            let Some(front) = state.segments.front_mut() else {
                break;
            };
            if front.len() <= remaining {
                remaining -= front.len();
                state.segments.pop_front();
            } else {
                front.advance(remaining);
                remaining = 0;
            }
        }

        state.buffered -= retired;
        state.consumed = consumed;
        state.examined = examined;

        if state.writer_paused && state.buffered <= state.options.resume_writer_threshold() {
            trace!(buffered = state.buffered, "pipe writer resumed");
            state.wake_writer();
        }
        Ok(())
    }

    /// Stops reading. A pending or later flush on the writer observes it.
    pub fn complete(&mut self, error: Option<io::Error>) {
        if self.completed {
            return;
        }
        self.completed = true;

        let mut state = lock(&self.shared);
        state.reader_completed = true;
        state.reader_error = error.map(PipeError::io);
        state.segments.clear();
        state.buffered = 0;
        state.wake_writer();
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.complete(None);
    }
}

/// Cancels pending reads of a [`PipeReader`] from anywhere.
#[derive(Debug, Clone)]
pub struct ReadCanceler {
    shared: Shared,
}

impl ReadCanceler {
    pub fn cancel(&self) {
        let mut state = lock(&self.shared);
        state.read_canceled = true;
        state.wake_reader();
    }
}

/// Cancels pending flushes of a [`PipeWriter`] from anywhere.
#[derive(Debug, Clone)]
pub struct FlushCanceler {
    shared: Shared,
}

impl FlushCanceler {
    pub fn cancel(&self) {
        let mut state = lock(&self.shared);
        state.flush_canceled = true;
        state.wake_writer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::poll;
    use std::pin::pin;

    fn small_pipe() -> (PipeWriter, PipeReader) {
        pipe(PipeOptions::new(8, 4).unwrap())
    }

    #[tokio::test]
    async fn read_returns_written_bytes() {
        let (mut writer, mut reader) = small_pipe();
        writer.write(b"abc").await.unwrap();
        writer.write(b"def").await.unwrap();

        let read = reader.read().await.unwrap();
        assert!(!read.is_completed());
        assert!(!read.is_canceled());
        assert_eq!(read.buffer().segments().len(), 2);
        assert_eq!(&read.buffer().to_bytes()[..], b"abcdef");
    }

    #[tokio::test]
    async fn writer_pauses_above_threshold_and_resumes_at_or_below() {
        let (mut writer, mut reader) = small_pipe();

        // exactly at the pause threshold does not suspend
        let result = writer.write(b"01234567").await.unwrap();
        assert_eq!(result, FlushResult::default());

        writer.buffer_mut().extend_from_slice(b"8");
        let mut flush = pin!(writer.flush());
        assert!(poll!(flush.as_mut()).is_pending());

        let read = reader.read().await.unwrap();
        let start = read.buffer().start();
        assert_eq!(read.buffer().len(), 9);

        // 5 bytes left, still above the resume threshold
        reader.advance_to(start + 4, start + 4).unwrap();
        assert!(poll!(flush.as_mut()).is_pending());

        reader.advance_to(start + 5, start + 5).unwrap();
        match poll!(flush.as_mut()) {
            Poll::Ready(Ok(result)) => assert!(!result.is_completed()),
            other => panic!("expected resumed flush, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn examined_data_blocks_until_more_arrives() {
        let (mut writer, mut reader) = small_pipe();
        writer.write(b"GET").await.unwrap();

        let read = reader.read().await.unwrap();
        let (start, end) = (read.buffer().start(), read.buffer().end());
        reader.advance_to(start, end).unwrap();

        {
            let mut next = pin!(reader.read());
            assert!(poll!(next.as_mut()).is_pending());

            writer.write(b" ").await.unwrap();
            match poll!(next.as_mut()) {
                Poll::Ready(Ok(read)) => assert_eq!(&read.buffer().to_bytes()[..], b"GET "),
                other => panic!("expected data, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn advance_without_progress_is_idempotent() {
        let (mut writer, mut reader) = small_pipe();
        writer.write(b"abcd").await.unwrap();

        let read = reader.read().await.unwrap();
        let start = read.buffer().start();
        reader.advance_to(start + 2, start + 2).unwrap();
        reader.advance_to(start + 2, start + 2).unwrap();

        let read = reader.read().await.unwrap();
        assert_eq!(read.buffer().start(), start + 2);
        assert_eq!(&read.buffer().to_bytes()[..], b"cd");
        assert_eq!(writer.consumed(), 2);
    }

    #[tokio::test]
    async fn invalid_advance_is_rejected() {
        let (mut writer, mut reader) = small_pipe();
        writer.write(b"abcd").await.unwrap();

        let read = reader.read().await.unwrap();
        let start = read.buffer().start();
        assert!(matches!(reader.advance_to(start + 5, start + 5), Err(PipeError::InvalidAdvance { .. })));
        assert!(matches!(reader.advance_to(start + 2, start + 1), Err(PipeError::InvalidAdvance { .. })));

        reader.advance_to(start + 2, start + 2).unwrap();
        assert!(matches!(reader.advance_to(start + 1, start + 2), Err(PipeError::InvalidAdvance { .. })));
    }

    #[tokio::test]
    async fn cancel_pending_read() {
        let (_writer, mut reader) = small_pipe();
        let canceler = reader.read_canceler();

        let mut read = pin!(reader.read());
        assert!(poll!(read.as_mut()).is_pending());
        canceler.cancel();
        match poll!(read.as_mut()) {
            Poll::Ready(Ok(result)) => assert!(result.is_canceled()),
            other => panic!("expected canceled read, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_pending_flush() {
        let (mut writer, _reader) = small_pipe();
        let canceler = writer.flush_canceler();

        writer.buffer_mut().extend_from_slice(b"0123456789");
        let mut flush = pin!(writer.flush());
        assert!(poll!(flush.as_mut()).is_pending());
        canceler.cancel();
        match poll!(flush.as_mut()) {
            Poll::Ready(Ok(result)) => assert!(result.is_canceled()),
            other => panic!("expected canceled flush, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn writer_completion_is_observed_by_reader() {
        let (mut writer, mut reader) = small_pipe();
        writer.buffer_mut().extend_from_slice(b"tail");
        drop(writer);

        let read = reader.read().await.unwrap();
        assert!(read.is_completed());
        assert_eq!(&read.buffer().to_bytes()[..], b"tail");
    }

    #[tokio::test]
    async fn writer_error_is_observed_by_reader() {
        let (mut writer, mut reader) = small_pipe();
        writer.complete(Some(io::Error::from(io::ErrorKind::ConnectionReset)));

        let error = reader.read().await.unwrap_err();
        assert_eq!(error.io_kind(), Some(io::ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn reader_completion_is_observed_by_writer() {
        let (mut writer, mut reader) = small_pipe();
        writer.buffer_mut().extend_from_slice(b"0123456789");
        {
            let mut flush = pin!(writer.flush());
            assert!(poll!(flush.as_mut()).is_pending());
            reader.complete(None);
            match poll!(flush.as_mut()) {
                Poll::Ready(Ok(result)) => assert!(result.is_completed()),
                other => panic!("expected completed flush, got {other:?}"),
            }
        }
        assert!(writer.write(b"more").await.unwrap().is_completed());
    }
}
