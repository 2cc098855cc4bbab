//! Writing one response into the outbound pipe.
//!
//! The head stays mutable until the response starts. Only then are the framing
//! headers chosen and the head encoded.

use std::fmt::Display;
use std::pin::pin;

use bytes::{Buf, Bytes};
use http::header::{CONNECTION, CONTENT_LENGTH, DATE, SERVER, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Response, StatusCode, Version};
use http_body::Body;
use http_body_util::BodyExt;
use tokio_util::codec::Encoder;
use tracing::{debug, trace};

use crate::codec::ResponseEncoder;
use crate::config::ServerConfig;
use crate::ensure;
use crate::pipe::PipeWriter;
use crate::protocol::{ConnectionOptions, Message, PayloadItem, PayloadSize, ResponseHead, SendError};

/// Writes the response to one request into the outbound pipe.
///
/// Status and headers can be changed until the response starts. The response
/// starts on the first body write, an explicit [`ResponseWriter::write_head`], or
/// on completion. Body framing is decided at that point:
///
/// - `1xx`, `204`, `205` and `304` responses and responses to `HEAD` have no body.
/// - An explicit `Content-Length` is honored and enforced.
/// - An explicit `Transfer-Encoding` ending in `chunked` is used as is, any other
///   coding delimits the body by closing the connection.
/// - Completing without a body write yields `Content-Length: 0`.
/// - Otherwise HTTP/1.1 responses are chunked and HTTP/1.0 responses are delimited
///   by closing the connection.
pub struct ResponseWriter<'conn> {
    writer: &'conn mut PipeWriter,
    config: &'conn ServerConfig,
    head: ResponseHead,
    version: Version,
    is_head: bool,
    keep_alive: bool,
    encoder: ResponseEncoder,
    payload_size: Option<PayloadSize>,
    completed: bool,
    bytes_written: u64,
}

impl<'conn> ResponseWriter<'conn> {
    /// A writer answering a request of `version`.
    ///
    /// `keep_alive` is whether the request allows the connection to be reused; the
    /// response may still turn it off.
    pub fn new(
        writer: &'conn mut PipeWriter,
        config: &'conn ServerConfig,
        version: Version,
        is_head: bool,
        keep_alive: bool,
    ) -> Self {
        Self {
            writer,
            config,
            head: Response::new(()),
            version,
            is_head,
            keep_alive,
            encoder: ResponseEncoder::new(),
            payload_size: None,
            completed: false,
            bytes_written: 0,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.head.status()
    }

    /// # Panics
    ///
    /// Panics if the response has already started.
    pub fn set_status(&mut self, status: StatusCode) {
        assert!(!self.has_started(), "status can't change after the response started");
        *self.head.status_mut() = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    /// # Panics
    ///
    /// Panics if the response has already started.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        assert!(!self.has_started(), "headers can't change after the response started");
        self.head.headers_mut()
    }

    /// Whether the status line and headers were written.
    pub fn has_started(&self) -> bool {
        self.payload_size.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whether the connection can serve another request after this response.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Body bytes accepted so far, before transfer coding.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// The framing chosen when the response started.
    pub fn payload_size(&self) -> Option<PayloadSize> {
        self.payload_size
    }

    pub(crate) fn disable_keep_alive(&mut self) {
        self.keep_alive = false;
    }

    /// Replaces a not yet started response with an empty one of `status`.
    pub(crate) fn reset(&mut self, status: StatusCode) {
        debug_assert!(!self.has_started());
        self.head = Response::new(());
        *self.head.status_mut() = status;
    }

    /// Writes the status line and headers and flushes them.
    pub async fn write_head(&mut self) -> Result<(), SendError> {
        if !self.has_started() {
            self.start(false)?;
        }
        self.flush().await
    }

    /// Writes a piece of the body and flushes it.
    pub async fn write_body<D: Buf>(&mut self, data: D) -> Result<(), SendError> {
        ensure!(!self.completed, SendError::Completed);
        if !self.has_started() {
            self.start(false)?;
        }

        if self.is_head {
            trace!(len = data.remaining(), "discard body of a response to HEAD");
            return Ok(());
        }
        if self.payload_size == Some(PayloadSize::Empty) && data.has_remaining() {
            return Err(SendError::BodyNotAllowed { status: self.status() });
        }

        let len = data.remaining() as u64;
        self.encoder.encode_payload(PayloadItem::Chunk(data), self.writer.buffer_mut())?;
        self.bytes_written += len;
        self.flush().await
    }

    /// Flushes whatever was written so far.
    pub async fn flush(&mut self) -> Result<(), SendError> {
        let result = self.writer.flush().await?;
        if result.is_canceled() {
            return Err(SendError::Canceled);
        }
        if result.is_completed() {
            return Err(SendError::ConnectionClosed);
        }
        Ok(())
    }

    /// Finishes the response, starting it first if nothing was written yet.
    ///
    /// Fails if fewer bytes than a declared `Content-Length` were written.
    pub async fn complete(&mut self) -> Result<(), SendError> {
        if self.completed {
            return Ok(());
        }
        if !self.has_started() {
            self.start(true)?;
        }

        self.encoder.encode_payload(PayloadItem::<Bytes>::Eof, self.writer.buffer_mut())?;
        self.completed = true;
        trace!(status = %self.status(), bytes_written = self.bytes_written, "response completed");
        self.flush().await
    }

    /// Writes all of `body` and completes the response.
    ///
    /// A body of exact size gets a `Content-Length` unless the headers already
    /// decide the framing. Trailers of `body` are not sent.
    pub async fn send_body<B>(&mut self, body: B) -> Result<(), SendError>
    where
        B: Body,
        B::Error: Display,
    {
        if !self.has_started() && !self.forbids_body() {
            let headers = self.head.headers_mut();
            if !headers.contains_key(CONTENT_LENGTH) && !headers.contains_key(TRANSFER_ENCODING) {
                if let Some(length) = body.size_hint().exact() {
                    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
                }
            }
        }

        let mut body = pin!(body);
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| SendError::invalid_body(format!("response body error: {e}")))?;
            if let Ok(data) = frame.into_data() {
                self.write_body(data).await?;
            }
        }
        self.complete().await
    }

    fn forbids_body(&self) -> bool {
        let status = self.status();
        status.is_informational()
            || matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED)
    }

    /// Picks the framing and encodes the head into the pipe's staging buffer.
    fn start(&mut self, completing: bool) -> Result<(), SendError> {
        if ConnectionOptions::from_header_map(self.head.headers()).close() {
            self.keep_alive = false;
        }

        let payload_size = self.framing(completing)?;
        if payload_size == PayloadSize::UntilClose {
            self.keep_alive = false;
        }

        let config = self.config;
        let headers = self.head.headers_mut();
        if !self.keep_alive {
            if !ConnectionOptions::from_header_map(headers).close() {
                headers.insert(CONNECTION, HeaderValue::from_static("close"));
            }
        } else if self.version == Version::HTTP_10 {
            headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }
        if let Some(server) = config.server_header() {
            if !headers.contains_key(SERVER) {
                headers.insert(SERVER, server.clone());
            }
        }
        if config.date_header() && !headers.contains_key(DATE) {
            headers.insert(DATE, crate::date::http_date());
        }

        let mut head = Response::new(());
        *head.status_mut() = self.head.status();
        *head.headers_mut() = self.head.headers().clone();

        debug!(status = %head.status(), ?payload_size, keep_alive = self.keep_alive, "start response");
        self.encoder.encode(Message::<_, Bytes>::Header((head, payload_size)), self.writer.buffer_mut())?;
        self.payload_size = Some(payload_size);
        Ok(())
    }

    fn framing(&mut self, completing: bool) -> Result<PayloadSize, SendError> {
        let status = self.status();
        let forbids_body = self.forbids_body();
        let headers = self.head.headers_mut();

        if forbids_body {
            ensure!(
                !headers.contains_key(TRANSFER_ENCODING),
                SendError::invalid_header(format!("transfer-encoding not allowed with status {status}"))
            );
            return Ok(PayloadSize::Empty);
        }
        if self.is_head {
            return Ok(PayloadSize::Empty);
        }

        if let Some(value) = headers.get(CONTENT_LENGTH) {
            ensure!(
                !headers.contains_key(TRANSFER_ENCODING),
                SendError::invalid_header("both content-length and transfer-encoding are set")
            );
            let length = value
                .to_str()
                .ok()
                .and_then(|value| value.trim().parse::<u64>().ok())
                .ok_or_else(|| SendError::invalid_header("invalid content-length"))?;
            return Ok(PayloadSize::Length(length));
        }

        if let Some(value) = headers.get(TRANSFER_ENCODING) {
            let chunked = value
                .as_bytes()
                .rsplit(|b| *b == b',')
                .next()
                .is_some_and(|coding| coding.trim_ascii().eq_ignore_ascii_case(b"chunked"));
            if chunked && self.version == Version::HTTP_11 {
                return Ok(PayloadSize::Chunked);
            }
            if self.version != Version::HTTP_11 {
                headers.remove(TRANSFER_ENCODING);
            }
            return Ok(PayloadSize::UntilClose);
        }

        if completing {
            return Ok(PayloadSize::Length(0));
        }
        if self.version == Version::HTTP_11 {
            Ok(PayloadSize::Chunked)
        } else {
            Ok(PayloadSize::UntilClose)
        }
    }
}

impl std::fmt::Debug for ResponseWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("status", &self.head.status())
            .field("version", &self.version)
            .field("keep_alive", &self.keep_alive)
            .field("payload_size", &self.payload_size)
            .field("completed", &self.completed)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}
