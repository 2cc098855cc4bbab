//! Request line decoding: `method SP request-target SP HTTP-version CRLF`.
//!
//! The decoder only commits once the whole line is buffered. While waiting it
//! remembers how many bytes it already searched for the line feed, so a line
//! trickling in over many reads is scanned once.

use bytes::Bytes;
use http::{Method, Version};
use tracing::trace;

use crate::codec::SegmentDecoder;
use crate::codec::known_tokens::{TOKEN_WIDTH, match_method, match_version};
use crate::ensure;
use crate::pipe::Cursor;
use crate::protocol::{ParseError, RequestTarget, is_token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    method: Method,
    target: RequestTarget,
    version: Version,
}

impl RequestLine {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &RequestTarget {
        &self.target
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn into_parts(self) -> (Method, RequestTarget, Version) {
        (self.method, self.target, self.version)
    }
}

#[derive(Debug)]
pub struct RequestLineDecoder {
    max_size: usize,
    scanned: usize,
}

impl RequestLineDecoder {
    /// `max_size` bounds the line including its CRLF.
    pub fn new(max_size: usize) -> Self {
        Self { max_size, scanned: 0 }
    }
}

impl SegmentDecoder for RequestLineDecoder {
    type Item = RequestLine;

    fn decode(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        let mut probe = src.clone();
        probe.advance(self.scanned.min(probe.remaining()));

        let Some(offset) = probe.find(b'\n') else {
            self.scanned = src.remaining();
            ensure!(self.scanned <= self.max_size, ParseError::request_line_too_long(self.max_size));
            trace!(scanned = self.scanned, "request line incomplete");
            return Ok(None);
        };

        let line_len = self.scanned + offset + 1;
        self.scanned = 0;
        ensure!(line_len <= self.max_size, ParseError::request_line_too_long(self.max_size));

        parse_request_line(src.take_bytes(line_len)).map(Some)
    }

    fn decode_eof(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None => Err(ParseError::invalid_request_line("unexpected end of stream")),
        }
    }
}

fn parse_request_line(line: Bytes) -> Result<RequestLine, ParseError> {
    let len = line.len();
    ensure!(len >= 2 && line[len - 2] == b'\r', ParseError::invalid_request_line("request line must end with CRLF"));
    let content = line.slice(..len - 2);

    let (method, method_len) = match match_method(&content[..content.len().min(TOKEN_WIDTH)]) {
        Some(known) => known,
        None => parse_custom_method(&content)?,
    };

    let rest = content.slice(method_len..);
    let target_end = rest
        .iter()
        .position(|b| *b == b' ')
        .ok_or_else(|| ParseError::invalid_request_line("missing space after request target"))?;
    ensure!(target_end > 0, ParseError::invalid_request_line("empty request target"));

    let target = RequestTarget::parse(&method, rest.slice(..target_end))?;
    let version = parse_version(&rest[target_end + 1..])?;

    Ok(RequestLine { method, target, version })
}

fn parse_custom_method(content: &[u8]) -> Result<(Method, usize), ParseError> {
    let end = content
        .iter()
        .position(|b| *b == b' ')
        .ok_or_else(|| ParseError::invalid_request_line("missing space after method"))?;
    ensure!(end > 0, ParseError::invalid_request_line("empty method"));
    ensure!(content[..end].iter().all(|b| is_token(*b)), ParseError::InvalidMethod);

    let method = Method::from_bytes(&content[..end]).map_err(|_e| ParseError::InvalidMethod)?;
    Ok((method, end + 1))
}

fn parse_version(token: &[u8]) -> Result<Version, ParseError> {
    if let Some(version) = match_version(token) {
        return Ok(version);
    }

    if token.len() == TOKEN_WIDTH && token.starts_with(b"HTTP/") {
        Err(ParseError::InvalidVersion)
    } else {
        Err(ParseError::invalid_request_line("invalid http version token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{Position, SegmentedBuf};
    use crate::protocol::TargetForm;

    const MAX: usize = 8 * 1024;

    fn one_segment(bytes: &'static [u8]) -> SegmentedBuf {
        SegmentedBuf::from_segments(Position::ZERO, [Bytes::from_static(bytes)])
    }

    fn decode(bytes: &'static [u8]) -> Result<Option<RequestLine>, ParseError> {
        RequestLineDecoder::new(MAX).decode(&mut one_segment(bytes).cursor())
    }

    #[test]
    fn simple_get() {
        let buf = one_segment(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut cursor = buf.cursor();
        let line = RequestLineDecoder::new(MAX).decode(&mut cursor).unwrap().unwrap();

        assert_eq!(line.method(), &Method::GET);
        assert_eq!(line.target().as_bytes(), b"/a");
        assert_eq!(line.target().form(), TargetForm::Origin);
        assert_eq!(line.version(), Version::HTTP_11);
        assert_eq!(cursor.position(), Position::new(17));
    }

    #[test]
    fn one_byte_segments_parse_like_contiguous_input() {
        let inputs: [&[u8]; 4] = [
            b"GET /a HTTP/1.1\r\n",
            b"OPTIONS * HTTP/1.0\r\n",
            b"PURGE /cache/item?x=1 HTTP/1.1\r\n",
            b"CONNECT example.com:443 HTTP/1.1\r\n",
        ];

        for input in inputs {
            let contiguous = SegmentedBuf::from_segments(Position::ZERO, [Bytes::copy_from_slice(input)]);
            let expected = RequestLineDecoder::new(MAX).decode(&mut contiguous.cursor()).unwrap().unwrap();

            // feed the line one byte at a time, the way a slow client would
            let mut decoder = RequestLineDecoder::new(MAX);
            let mut segments = Vec::new();
            let mut result = None;
            for byte in input {
                segments.push(Bytes::copy_from_slice(&[*byte]));
                let buf = SegmentedBuf::from_segments(Position::ZERO, segments.clone());
                let mut cursor = buf.cursor();
                if let Some(line) = decoder.decode(&mut cursor).unwrap() {
                    assert!(cursor.is_empty());
                    result = Some(line);
                } else {
                    assert_eq!(cursor.position(), Position::ZERO);
                }
            }

            assert_eq!(result, Some(expected));
        }
    }

    #[test]
    fn custom_method() {
        let line = decode(b"PURGE /cache HTTP/1.1\r\n").unwrap().unwrap();
        assert_eq!(line.method().as_str(), "PURGE");

        assert!(matches!(decode(b"GE(T / HTTP/1.1\r\n"), Err(ParseError::InvalidMethod)));
    }

    #[test]
    fn malformed_delimiters_are_errors() {
        assert!(matches!(decode(b"GET  / HTTP/1.1\r\n"), Err(ParseError::InvalidRequestLine { .. })));
        assert!(matches!(decode(b"GET /HTTP/1.1\r\n"), Err(ParseError::InvalidRequestLine { .. })));
        assert!(matches!(decode(b"GET / HTTP/1.1\n"), Err(ParseError::InvalidRequestLine { .. })));
        assert!(matches!(decode(b" / HTTP/1.1\r\n"), Err(ParseError::InvalidRequestLine { .. })));
        assert!(matches!(decode(b"GET / HTTP/1.1 \r\n"), Err(ParseError::InvalidRequestLine { .. })));
        assert!(matches!(decode(b"GET /\r HTTP/1.1\r\n"), Err(ParseError::InvalidRequestTarget { .. })));
    }

    #[test]
    fn unsupported_version() {
        assert!(matches!(decode(b"GET / HTTP/2.0\r\n"), Err(ParseError::InvalidVersion)));
        assert!(matches!(decode(b"GET / HTTP/1.2\r\n"), Err(ParseError::InvalidVersion)));
        assert!(matches!(decode(b"GET / FTP/1.1\r\n"), Err(ParseError::InvalidRequestLine { .. })));
    }

    #[test]
    fn line_length_limit() {
        let mut decoder = RequestLineDecoder::new(16);
        let buf = one_segment(b"GET /0123456789abcdef");
        assert!(matches!(decoder.decode(&mut buf.cursor()), Err(ParseError::RequestLineTooLong { max_size: 16 })));

        let mut decoder = RequestLineDecoder::new(16);
        let buf = one_segment(b"GET /0123 HTTP/1.1\r\n");
        assert!(matches!(decoder.decode(&mut buf.cursor()), Err(ParseError::RequestLineTooLong { .. })));
    }

    #[test]
    fn end_of_stream() {
        let mut decoder = RequestLineDecoder::new(MAX);
        let empty = SegmentedBuf::new(Position::ZERO);
        assert!(decoder.decode_eof(&mut empty.cursor()).unwrap().is_none());

        let partial = one_segment(b"GET / HT");
        assert!(matches!(decoder.decode_eof(&mut partial.cursor()), Err(ParseError::InvalidRequestLine { .. })));
    }

    #[test]
    fn agrees_with_httparse() {
        let inputs: [&[u8]; 5] = [
            b"GET /index.html HTTP/1.1\r\n\r\n",
            b"POST /submit?a=b HTTP/1.0\r\n\r\n",
            b"DELETE /items/42 HTTP/1.1\r\n\r\n",
            b"PATCH /x HTTP/1.1\r\n\r\n",
            b"M-SEARCH * HTTP/1.1\r\n\r\n",
        ];

        for input in inputs {
            let mut headers = [httparse::EMPTY_HEADER; 4];
            let mut expected = httparse::Request::new(&mut headers);
            assert!(expected.parse(input).unwrap().is_complete());

            let buf = SegmentedBuf::from_segments(Position::ZERO, [Bytes::copy_from_slice(input)]);
            let result = RequestLineDecoder::new(MAX).decode(&mut buf.cursor());
            if input.starts_with(b"M-SEARCH") {
                // asterisk form is reserved for OPTIONS
                assert!(result.is_err());
                continue;
            }

            let line = result.unwrap().unwrap();
            assert_eq!(Some(line.method().as_str()), expected.method);
            assert_eq!(Some(line.target().as_bytes()), expected.path.map(str::as_bytes));
            let version = if line.version() == Version::HTTP_11 { 1 } else { 0 };
            assert_eq!(Some(version), expected.version);
        }
    }
}
