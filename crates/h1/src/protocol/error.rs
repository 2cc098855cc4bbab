use std::error::Error as StdError;
use std::io;

use http::StatusCode;
use thiserror::Error;

use crate::pipe::PipeError;

/// Error type returned by request handlers.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("handler failed after the response started: {reason}")]
    HandlerError { reason: String },

    #[error("connection aborted")]
    Aborted,
}

/// Errors raised while reading a request.
///
/// Every variant caused by the peer maps to a response status through
/// [`ParseError::status_code`]. Transport failures and cancellations don't, as
/// nothing can be written back in those cases.
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("invalid request line: {reason}")]
    InvalidRequestLine { reason: String },

    #[error("request line too long, exceed the limit {max_size}")]
    RequestLineTooLong { max_size: usize },

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid request target: {reason}")]
    InvalidRequestTarget { reason: String },

    #[error("unsupported http version")]
    InvalidVersion,

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid host header: {reason}")]
    InvalidHost { reason: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("transfer-encoding and content-length both present in headers")]
    AmbiguousFraming,

    #[error("final transfer coding is not chunked")]
    FinalTransferCodingNotChunked,

    #[error("request body too large, exceed the limit {max_size}")]
    BodyTooLarge { max_size: u64 },

    #[error("invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    #[error("request body ended early")]
    TruncatedBody,

    #[error("request headers not received in time")]
    RequestHeadersTimeout,

    #[error("request read canceled")]
    Canceled,

    #[error("pipe error: {source}")]
    Pipe {
        #[from]
        source: PipeError,
    },
}

impl ParseError {
    pub fn invalid_request_line<S: ToString>(str: S) -> Self {
        Self::InvalidRequestLine { reason: str.to_string() }
    }

    pub fn request_line_too_long(max_size: usize) -> Self {
        Self::RequestLineTooLong { max_size }
    }

    pub fn invalid_request_target<S: ToString>(str: S) -> Self {
        Self::InvalidRequestTarget { reason: str.to_string() }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_host<S: ToString>(str: S) -> Self {
        Self::InvalidHost { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidChunk { reason: str.to_string() }
    }

    pub fn body_too_large(max_size: u64) -> Self {
        Self::BodyTooLarge { max_size }
    }

    /// Status of the error response for this error, `None` when no response can be sent.
    pub fn status_code(&self) -> Option<StatusCode> {
        let status = match self {
            Self::RequestLineTooLong { .. } => StatusCode::URI_TOO_LONG,
            Self::InvalidVersion => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            Self::TooLargeHeader { .. } | Self::TooManyHeaders { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RequestHeadersTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::InvalidRequestLine { .. }
            | Self::InvalidMethod
            | Self::InvalidRequestTarget { .. }
            | Self::InvalidHeader { .. }
            | Self::InvalidHost { .. }
            | Self::InvalidContentLength { .. }
            | Self::AmbiguousFraming
            | Self::FinalTransferCodingNotChunked
            | Self::InvalidChunk { .. }
            | Self::TruncatedBody => StatusCode::BAD_REQUEST,
            Self::Canceled | Self::Pipe { .. } => return None,
        };
        Some(status)
    }
}

/// Errors raised while writing a response.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("content-length is {declared} but {written} bytes were written")]
    ContentLengthMismatch { declared: u64, written: u64 },

    #[error("response with status {status} can't have a body")]
    BodyNotAllowed { status: StatusCode },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("response already completed")]
    Completed,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("response write canceled")]
    Canceled,

    #[error("pipe error: {source}")]
    Pipe {
        #[from]
        source: PipeError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ParseError::request_line_too_long(8).status_code(), Some(StatusCode::URI_TOO_LONG));
        assert_eq!(ParseError::too_many_headers(1).status_code(), Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE));
        assert_eq!(ParseError::InvalidVersion.status_code(), Some(StatusCode::HTTP_VERSION_NOT_SUPPORTED));
        assert_eq!(ParseError::AmbiguousFraming.status_code(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(ParseError::body_too_large(1).status_code(), Some(StatusCode::PAYLOAD_TOO_LARGE));
        assert_eq!(ParseError::RequestHeadersTimeout.status_code(), Some(StatusCode::REQUEST_TIMEOUT));
        assert_eq!(ParseError::Canceled.status_code(), None);
        assert_eq!(ParseError::from(PipeError::WriterCompleted).status_code(), None);
    }

    #[test]
    fn encoder_errors_from_io() {
        let e = SendError::from(io::Error::from(io::ErrorKind::WriteZero));
        assert!(matches!(e, SendError::Io { .. }));
    }
}
