//! Request body streaming.
//!
//! The body is decoded straight out of the inbound pipe. [`BodyReader`] holds the
//! decoding state and lives with the connection; [`ReqBody`] borrows it together
//! with the pipe reader and implements [`http_body::Body`] for handlers.
//!
//! Bytes are released to the pipe as soon as they are handed out, so a handler
//! that stops reading stops the transport from reading further. Whatever the
//! handler leaves unread is drained by the connection before the next request.

use std::fmt;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use tracing::{debug, trace};

use crate::codec::{PayloadDecoder, SegmentDecoder};
use crate::config::Limits;
use crate::pipe::{PipeReader, Position, SegmentedBuf};
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

#[derive(Debug)]
pub struct BodyReader {
    decoder: PayloadDecoder,
    size: PayloadSize,
    read: u64,
    max_size: Option<u64>,
    state: State,
    /// set while more body bytes are expected from the peer
    receiving: Option<Arc<AtomicBool>>,
}

#[derive(Debug)]
enum State {
    Reading,
    Done,
    Failed(ParseError),
}

impl BodyReader {
    pub fn new(size: PayloadSize, limits: &Limits) -> Self {
        Self {
            decoder: PayloadDecoder::new(size, limits),
            size,
            read: 0,
            max_size: limits.max_request_body_size(),
            state: State::Reading,
            receiving: None,
        }
    }

    /// Keeps `flag` set until the body ends or fails.
    pub fn with_receiving_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        let receiving = matches!(self.state, State::Reading) && !self.size.is_empty();
        flag.store(receiving, Ordering::Relaxed);
        self.receiving = Some(flag);
        self
    }

    /// A reader for requests without a body.
    pub fn empty() -> Self {
        Self {
            decoder: PayloadDecoder::empty(),
            size: PayloadSize::Empty,
            read: 0,
            max_size: None,
            state: State::Done,
            receiving: None,
        }
    }

    pub fn payload_size(&self) -> PayloadSize {
        self.size
    }

    /// Body bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn is_end_stream(&self) -> bool {
        matches!(self.state, State::Done)
    }

    pub fn error(&self) -> Option<&ParseError> {
        match &self.state {
            State::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn size_hint(&self) -> SizeHint {
        match (&self.state, self.size) {
            (State::Done, _) | (_, PayloadSize::Empty) => SizeHint::with_exact(0),
            (_, PayloadSize::Length(n)) => SizeHint::with_exact(n - self.read),
            _ => SizeHint::default(),
        }
    }

    fn fail(&mut self, e: ParseError) -> Poll<Option<Result<Frame<Bytes>, ParseError>>> {
        debug!(error = %e, "failed to read request body");
        self.stop_receiving();
        self.state = State::Failed(e.clone());
        Poll::Ready(Some(Err(e)))
    }

    fn finish(&mut self) -> Poll<Option<Result<Frame<Bytes>, ParseError>>> {
        trace!(read = self.read, "request body finished");
        let trailers = match self.decoder.take_trailers().map(|trailers| trailers.to_header_map()) {
            Some(Ok(trailers)) => Some(trailers),
            Some(Err(e)) => return self.fail(e),
            None => None,
        };
        self.stop_receiving();
        self.state = State::Done;
        Poll::Ready(trailers.map(|trailers| Ok(Frame::trailers(trailers))))
    }

    fn stop_receiving(&self) {
        if let Some(flag) = &self.receiving {
            flag.store(false, Ordering::Relaxed);
        }
    }

    pub fn poll_frame(
        &mut self,
        reader: &mut PipeReader,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, ParseError>>> {
        match &self.state {
            State::Reading => {}
            State::Done => return Poll::Ready(None),
            State::Failed(e) => return Poll::Ready(Some(Err(e.clone()))),
        }

        // a body may end without further input, e.g. once the declared length was read
        let idle = SegmentedBuf::new(Position::ZERO);
        match self.decoder.decode(&mut idle.cursor()) {
            Ok(Some(PayloadItem::Eof)) => return self.finish(),
            Ok(_) => {}
            Err(e) => return self.fail(e),
        }

        loop {
            let result = match ready!(reader.poll_read(cx)) {
                Ok(result) => result,
                Err(e) => return self.fail(e.into()),
            };
            if result.is_canceled() {
                return self.fail(ParseError::Canceled);
            }

            let buffer = result.buffer();
            let mut cursor = buffer.cursor();
            let decoded = if result.is_completed() {
                self.decoder.decode_eof(&mut cursor)
            } else {
                self.decoder.decode(&mut cursor)
            };
            let consumed = cursor.position();

            let item = match decoded {
                Ok(Some(item)) => item,
                Ok(None) if result.is_completed() => return self.fail(ParseError::TruncatedBody),
                Ok(None) => {
                    if let Err(e) = reader.advance_to(consumed, buffer.end()) {
                        return self.fail(e.into());
                    }
                    continue;
                }
                Err(e) => return self.fail(e),
            };

            if let Err(e) = reader.advance_to(consumed, consumed) {
                return self.fail(e.into());
            }

            return match item {
                PayloadItem::Chunk(bytes) => {
                    self.read += bytes.len() as u64;
                    if let Some(max_size) = self.max_size.filter(|max_size| self.read > *max_size) {
                        return self.fail(ParseError::body_too_large(max_size));
                    }
                    trace!(len = bytes.len(), read = self.read, "read request body");
                    Poll::Ready(Some(Ok(Frame::data(bytes))))
                }
                PayloadItem::Eof => self.finish(),
            };
        }
    }

    /// Reads and discards the rest of the body, returning the number of data bytes skipped.
    pub async fn drain(&mut self, reader: &mut PipeReader) -> Result<u64, ParseError> {
        let mut skipped = 0;
        while let Some(frame) = poll_fn(|cx| self.poll_frame(reader, cx)).await {
            if let Some(data) = frame?.data_ref() {
                skipped += data.len() as u64;
            }
        }
        if skipped > 0 {
            debug!(skipped, "skip unread request body");
        }
        Ok(skipped)
    }
}

/// Request body handed to handlers.
pub struct ReqBody<'conn> {
    reader: &'conn mut PipeReader,
    body: &'conn mut BodyReader,
}

impl<'conn> ReqBody<'conn> {
    pub fn new(reader: &'conn mut PipeReader, body: &'conn mut BodyReader) -> Self {
        Self { reader, body }
    }

    /// Body bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.body.bytes_read()
    }
}

impl fmt::Debug for ReqBody<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqBody").field("body", &self.body).finish_non_exhaustive()
    }
}

impl Body for ReqBody<'_> {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        this.body.poll_frame(this.reader, cx)
    }

    fn is_end_stream(&self) -> bool {
        self.body.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.body.size_hint()
    }
}
