//! Request head decoding and body framing selection.
//!
//! [`RequestDecoder`] reads the request line, then the header block, then checks
//! the head as a whole:
//!
//! - exactly one `Host` on HTTP/1.1, at most one on HTTP/1.0, and it must agree
//!   with the authority of an absolute-form target
//! - `Transfer-Encoding` together with `Content-Length` is rejected
//! - a `Transfer-Encoding` whose final coding isn't `chunked` is rejected
//! - every `Content-Length` must be the same decimal number
//!
//! The body framing follows RFC 9112 section 6.3: chunked, then content-length,
//! then until-close for upgrade requests, otherwise no body.

use http::header;
use http::uri::Authority;
use tracing::{debug, trace};

use crate::codec::{HeaderDecoder, RequestLine, RequestLineDecoder, SegmentDecoder};
use crate::config::Limits;
use crate::ensure;
use crate::pipe::Cursor;
use crate::protocol::{HeaderList, ParseError, PayloadSize, RequestHead, RequestTarget};

#[derive(Debug)]
pub struct RequestDecoder {
    limits: Limits,
    line_decoder: RequestLineDecoder,
    line: Option<RequestLine>,
    header_decoder: HeaderDecoder,
}

impl RequestDecoder {
    pub fn new(limits: &Limits) -> Self {
        Self {
            limits: *limits,
            line_decoder: RequestLineDecoder::new(limits.max_request_line_size()),
            line: None,
            header_decoder: Self::header_decoder(limits),
        }
    }

    fn header_decoder(limits: &Limits) -> HeaderDecoder {
        HeaderDecoder::new(limits.max_request_headers_total_size(), limits.max_request_header_count())
    }

    /// Whether the request line is complete and the header block is being read.
    pub fn is_parsing_headers(&self) -> bool {
        self.line.is_some()
    }

    fn reset(&mut self) {
        self.line = None;
        self.line_decoder = RequestLineDecoder::new(self.limits.max_request_line_size());
        self.header_decoder = Self::header_decoder(&self.limits);
    }

    fn finish(&mut self, line: RequestLine, headers: HeaderList) -> Result<(RequestHead, PayloadSize), ParseError> {
        let (method, target, version) = line.into_parts();
        check_host(&target, version, &headers)?;

        let head = RequestHead::new(method, target, version, headers);
        let payload_size = payload_size(&head, &self.limits)?;
        debug!(
            method = %head.method(),
            target = %String::from_utf8_lossy(head.target().as_bytes()),
            version = ?head.version(),
            ?payload_size,
            "parsed request head"
        );
        Ok((head, payload_size))
    }
}

impl SegmentDecoder for RequestDecoder {
    type Item = (RequestHead, PayloadSize);

    fn decode(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        if self.line.is_none() {
            match self.line_decoder.decode(src)? {
                Some(line) => {
                    trace!(method = %line.method(), "parsed request line");
                    self.line = Some(line);
                }
                None => return Ok(None),
            }
        }

        let Some(headers) = self.header_decoder.decode(src)? else {
            return Ok(None);
        };
        let line = self.line.take().ok_or_else(|| ParseError::invalid_request_line("missing request line"))?;
        self.reset();
        self.finish(line, headers).map(Some)
    }

    fn decode_eof(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        if self.line.is_none() && src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if self.line.is_none() => Err(ParseError::invalid_request_line("unexpected end of stream")),
            None => Err(ParseError::invalid_header("unexpected end of stream in header block")),
        }
    }
}

fn check_host(target: &RequestTarget, version: http::Version, headers: &HeaderList) -> Result<(), ParseError> {
    let mut hosts = headers.get_all(header::HOST.as_str());
    let host = hosts.next();
    ensure!(hosts.next().is_none(), ParseError::invalid_host("multiple host headers"));

    let Some(host) = host else {
        ensure!(version != http::Version::HTTP_11, ParseError::invalid_host("missing host header"));
        return Ok(());
    };

    if !host.is_empty() {
        Authority::try_from(host).map_err(|e| ParseError::invalid_host(format!("invalid host header: {e}")))?;
    }

    if let Some(authority) = target.authority() {
        ensure!(
            authority.eq_ignore_ascii_case(host),
            ParseError::invalid_host("host header doesn't match the request target")
        );
    }
    Ok(())
}

fn payload_size(head: &RequestHead, limits: &Limits) -> Result<PayloadSize, ParseError> {
    let headers = head.headers();

    if headers.contains(header::TRANSFER_ENCODING.as_str()) {
        ensure!(!headers.contains(header::CONTENT_LENGTH.as_str()), ParseError::AmbiguousFraming);

        let last_coding = headers
            .get_all(header::TRANSFER_ENCODING.as_str())
            .flat_map(|value| value.split(|b| *b == b','))
            .map(<[u8]>::trim_ascii)
            .filter(|coding| !coding.is_empty())
            .last();
        ensure!(
            last_coding.is_some_and(|coding| coding.eq_ignore_ascii_case(b"chunked")),
            ParseError::FinalTransferCodingNotChunked
        );
        return Ok(PayloadSize::Chunked);
    }

    let mut content_length = None;
    for value in headers.get_all(header::CONTENT_LENGTH.as_str()) {
        let length = parse_content_length(value)?;
        ensure!(
            content_length.is_none_or(|previous| previous == length),
            ParseError::invalid_content_length("conflicting content-length values")
        );
        content_length = Some(length);
    }

    if let Some(length) = content_length {
        if let Some(max_size) = limits.max_request_body_size() {
            ensure!(length <= max_size, ParseError::body_too_large(max_size));
        }
        return Ok(if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) });
    }

    if head.connection().upgrade() && headers.contains(header::UPGRADE.as_str()) {
        return Ok(PayloadSize::UntilClose);
    }

    Ok(PayloadSize::Empty)
}

fn parse_content_length(value: &[u8]) -> Result<u64, ParseError> {
    ensure!(
        !value.is_empty() && value.iter().all(u8::is_ascii_digit),
        ParseError::invalid_content_length("content-length must be decimal digits")
    );
    value.iter().try_fold(0u64, |acc, digit| {
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(u64::from(digit - b'0')))
            .ok_or_else(|| ParseError::invalid_content_length("content-length overflow"))
    })
}
