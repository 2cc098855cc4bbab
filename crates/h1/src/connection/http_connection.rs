use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use futures::FutureExt;
use http::{StatusCode, Version};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::codec::{RequestDecoder, SegmentDecoder};
use crate::config::ServerConfig;
use crate::connection::{ConnectionState, ResponseWriter};
use crate::ensure;
use crate::handler::Handler;
use crate::pipe::{FlushCanceler, PipeReader, PipeWriter, ReadCanceler};
use crate::protocol::body::{BodyReader, ReqBody};
use crate::protocol::{HttpError, ParseError, PayloadSize, Request, RequestHead, SendError};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Runs the request/response cycle of one connection over a pair of pipes.
///
/// Requests are read from the inbound pipe and answered in order through the
/// outbound pipe, one at a time. The transport on the other side of the pipes
/// is driven separately, see [`crate::transport::serve_connection`].
pub struct HttpConnection {
    reader: PipeReader,
    writer: PipeWriter,
    config: triomphe::Arc<ServerConfig>,
    state: ConnectionState,
    reading_body: Arc<AtomicBool>,
}

impl HttpConnection {
    pub fn new(reader: PipeReader, writer: PipeWriter, config: triomphe::Arc<ServerConfig>) -> Self {
        Self {
            reader,
            writer,
            config,
            state: ConnectionState::AwaitingRequestLine,
            reading_body: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn read_canceler(&self) -> ReadCanceler {
        self.reader.read_canceler()
    }

    pub fn flush_canceler(&self) -> FlushCanceler {
        self.writer.flush_canceler()
    }

    /// Set while the current request body is still arriving from the peer.
    ///
    /// The transport watches it to enforce the minimum request body data rate.
    pub fn reading_body(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.reading_body)
    }

    /// Serves requests until the connection closes.
    ///
    /// Returns `Ok` when the connection closed gracefully: the peer finished, the
    /// keep-alive timeout passed, or a response ended keep-alive. Any other end is
    /// an error and leaves the connection [`ConnectionState::Aborted`].
    pub async fn process<H: Handler>(&mut self, handler: &H) -> Result<(), HttpError> {
        ensure!(!self.state.is_terminal(), HttpError::Aborted);

        let mut decoder = RequestDecoder::new(self.config.limits());
        let mut idle_timeout = self.config.limits().request_headers_timeout();
        loop {
            let (head, payload_size) = match self.read_head(&mut decoder, idle_timeout).await {
                Ok(Some(head)) => head,
                Ok(None) => {
                    info!("no more requests, close connection");
                    self.shutdown(ConnectionState::Closing, None);
                    return Ok(());
                }
                Err(e) => return Err(self.reject(e).await),
            };
            idle_timeout = self.config.limits().keep_alive_timeout();

            if !self.serve(handler, head, payload_size).await? {
                debug!("keep-alive is off, close connection");
                self.shutdown(ConnectionState::Closing, None);
                return Ok(());
            }
            self.state.transition(ConnectionState::AwaitingRequestLine);
        }
    }

    /// Reads the next request head.
    ///
    /// `None` means the connection should close without a response: the peer
    /// closed between requests, or sent nothing within `idle_timeout`.
    async fn read_head(
        &mut self,
        decoder: &mut RequestDecoder,
        idle_timeout: Duration,
    ) -> Result<Option<(RequestHead, PayloadSize)>, ParseError> {
        let mut deadline = Instant::now() + idle_timeout;
        let mut received = false;
        loop {
            let result = match timeout_at(deadline, self.reader.read()).await {
                Ok(result) => result?,
                Err(_) if !received => {
                    debug!(?idle_timeout, "no request received in time");
                    return Ok(None);
                }
                Err(_) => return Err(ParseError::RequestHeadersTimeout),
            };
            ensure!(!result.is_canceled(), ParseError::Canceled);

            let buffer = result.buffer();
            if !received && !buffer.is_empty() {
                received = true;
                deadline = Instant::now() + self.config.limits().request_headers_timeout();
            }

            let mut cursor = buffer.cursor();
            let decoded =
                if result.is_completed() { decoder.decode_eof(&mut cursor)? } else { decoder.decode(&mut cursor)? };
            let consumed = cursor.position();

            // the request line was parsed, possibly together with the whole head
            if self.state == ConnectionState::AwaitingRequestLine && (decoded.is_some() || decoder.is_parsing_headers())
            {
                self.state.transition(ConnectionState::ParsingHeaders);
            }

            match decoded {
                Some(head) => {
                    self.reader.advance_to(consumed, consumed)?;
                    return Ok(Some(head));
                }
                None if result.is_completed() => return Ok(None),
                None => self.reader.advance_to(consumed, buffer.end())?,
            }
        }
    }

    /// Runs one exchange, returning whether the connection may be reused.
    async fn serve<H: Handler>(
        &mut self,
        handler: &H,
        head: RequestHead,
        payload_size: PayloadSize,
    ) -> Result<bool, HttpError> {
        let config = triomphe::Arc::clone(&self.config);
        let keep_alive = head.keep_alive() && payload_size != PayloadSize::UntilClose;

        if head.expects_continue() && !payload_size.is_empty() {
            let result = self.writer.write(CONTINUE).await.map_err(SendError::from)?;
            ensure!(!result.is_completed(), SendError::ConnectionClosed.into());
            debug!("sent 100 continue");
        }

        self.state.transition(ConnectionState::StreamingBody);
        let mut body =
            BodyReader::new(payload_size, config.limits()).with_receiving_flag(Arc::clone(&self.reading_body));
        let mut response = ResponseWriter::new(&mut self.writer, &config, head.version(), head.is_head(), keep_alive);

        let request = Request::new(head, ReqBody::new(&mut self.reader, &mut body));
        let outcome = AssertUnwindSafe(handler.call(request, &mut response)).catch_unwind().await;
        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(panic_reason(panic.as_ref())),
        };

        if let Some(reason) = fault {
            if response.has_started() {
                error!(%reason, "handler failed after the response started, abort connection");
                drop(response);
                self.abort();
                return Err(HttpError::HandlerError { reason });
            }
            error!(%reason, "handler failed, respond with 500");
            response.reset(StatusCode::INTERNAL_SERVER_ERROR);
        }

        if let Err(e) = body.drain(&mut self.reader).await {
            warn!(cause = %e, "can't read request body");
            let status = e.status_code().filter(|_| !response.has_started());
            if let Some(status) = status {
                response.reset(status);
                response.disable_keep_alive();
                if let Err(send_error) = response.complete().await {
                    debug!(cause = %send_error, "can't send error response");
                }
            }
            drop(response);
            match status {
                Some(_) => self.shutdown(ConnectionState::Aborted, None),
                None => self.abort(),
            }
            return Err(e.into());
        }

        if !response.has_started() {
            self.state.transition(ConnectionState::AwaitingResponseStart);
        }
        self.state.transition(ConnectionState::StreamingResponse);

        if let Err(e) = response.complete().await {
            error!(cause = %e, "can't complete response");
            drop(response);
            self.abort();
            return Err(e.into());
        }
        Ok(response.keep_alive())
    }

    /// Answers a malformed request with its error status, if there is one, then
    /// closes the connection.
    async fn reject(&mut self, e: ParseError) -> HttpError {
        let Some(status) = e.status_code() else {
            debug!(cause = %e, "stop reading requests");
            self.abort();
            return e.into();
        };

        warn!(cause = %e, %status, "reject request");
        if let Err(send_error) = self.send_error_response(status).await {
            debug!(cause = %send_error, "can't send error response");
        }
        self.shutdown(ConnectionState::Aborted, None);
        e.into()
    }

    async fn send_error_response(&mut self, status: StatusCode) -> Result<(), SendError> {
        let mut response = ResponseWriter::new(&mut self.writer, &self.config, Version::HTTP_11, false, false);
        response.set_status(status);
        response.complete().await
    }

    /// Stops both pipes at once, dropping whatever was not flushed yet.
    fn abort(&mut self) {
        self.shutdown(ConnectionState::Aborted, Some(io::ErrorKind::ConnectionAborted.into()));
    }

    fn shutdown(&mut self, state: ConnectionState, error: Option<io::Error>) {
        self.state.transition(state);
        self.reader.complete(None);
        self.writer.complete(error);
    }
}

impl std::fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection").field("state", &self.state).finish_non_exhaustive()
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    let message = panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned());
    match message {
        Some(message) => format!("handler panicked: {message}"),
        None => "handler panicked".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::pipe;
    use crate::protocol::HandlerError;
    use tokio::time::timeout;

    struct Ignore;

    impl Handler for Ignore {
        async fn call(&self, _request: Request<'_>, _response: &mut ResponseWriter<'_>) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn parsing_headers_after_request_line() {
        let config = triomphe::Arc::new(ServerConfig::default());
        let limits = *config.limits();
        let (mut inbound, reader) = pipe(config.inbound_pipe());
        let (writer, _outbound) = pipe(config.outbound_pipe());
        let mut connection = HttpConnection::new(reader, writer, config);
        let mut decoder = RequestDecoder::new(&limits);
        let idle = Duration::from_secs(30);

        inbound.write(b"GET /a HT").await.unwrap();
        assert!(timeout(Duration::from_millis(10), connection.read_head(&mut decoder, idle)).await.is_err());
        assert_eq!(connection.state(), ConnectionState::AwaitingRequestLine);

        inbound.write(b"TP/1.1\r\nHost: x\r\n").await.unwrap();
        assert!(timeout(Duration::from_millis(10), connection.read_head(&mut decoder, idle)).await.is_err());
        assert_eq!(connection.state(), ConnectionState::ParsingHeaders);

        inbound.write(b"\r\n").await.unwrap();
        let (head, payload_size) = connection.read_head(&mut decoder, idle).await.unwrap().unwrap();
        assert_eq!(head.target().path(), b"/a");
        assert_eq!(payload_size, PayloadSize::Empty);
        assert_eq!(connection.state(), ConnectionState::ParsingHeaders);
    }

    #[tokio::test]
    async fn truncated_body_ends_aborted() {
        let config = triomphe::Arc::new(ServerConfig::default());
        let (mut inbound, reader) = pipe(config.inbound_pipe());
        let (writer, mut outbound) = pipe(config.outbound_pipe());
        let mut connection = HttpConnection::new(reader, writer, config);

        inbound.write(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nabc").await.unwrap();
        inbound.complete(None);

        let result = connection.process(&Ignore).await;
        assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::TruncatedBody })));
        assert_eq!(connection.state(), ConnectionState::Aborted);
        assert!(!connection.reading_body().load(std::sync::atomic::Ordering::Relaxed));

        let response = outbound.read().await.unwrap();
        assert!(response.buffer().to_bytes().starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.is_completed());
    }
}
