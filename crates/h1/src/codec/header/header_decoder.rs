//! HTTP header block decoder
//!
//! Decodes `name ":" OWS value OWS CRLF` lines until an empty line. The same
//! decoder reads request headers and the trailer section of a chunked body.
//!
//! # Rules
//!
//! - Lines must end with CRLF
//! - Whitespace between the name and the colon is rejected
//! - Folded (obs-fold) lines are rejected
//! - Leading and trailing OWS of a value is trimmed, the rest is kept byte for byte
//! - The running size of the block and the number of fields are capped
//!
//! Each complete line is committed as soon as it is parsed, so a header block
//! arriving over many reads is never rescanned from its start.

use bytes::Bytes;
use tracing::trace;

use crate::codec::SegmentDecoder;
use crate::ensure;
use crate::pipe::Cursor;
use crate::protocol::{HeaderList, ParseError, is_field_value, is_token};

#[derive(Debug)]
pub struct HeaderDecoder {
    max_size: usize,
    max_count: usize,
    size: usize,
    headers: HeaderList,
}

impl HeaderDecoder {
    pub fn new(max_size: usize, max_count: usize) -> Self {
        Self { max_size, max_count, size: 0, headers: HeaderList::new() }
    }

    /// Bytes of the header block consumed so far, line endings included.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl SegmentDecoder for HeaderDecoder {
    type Item = HeaderList;

    fn decode(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        loop {
            let Some(offset) = src.find(b'\n') else {
                let pending = self.size + src.remaining();
                ensure!(pending <= self.max_size, ParseError::too_large_header(pending, self.max_size));
                return Ok(None);
            };

            let line_len = offset + 1;
            ensure!(
                self.size + line_len <= self.max_size,
                ParseError::too_large_header(self.size + line_len, self.max_size)
            );

            let line = src.take_bytes(line_len);
            self.size += line_len;

            let len = line.len();
            ensure!(len >= 2 && line[len - 2] == b'\r', ParseError::invalid_header("header line must end with CRLF"));
            if len == 2 {
                trace!(size = self.size, count = self.headers.len(), "parsed header block");
                return Ok(Some(std::mem::take(&mut self.headers)));
            }

            ensure!(self.headers.len() < self.max_count, ParseError::too_many_headers(self.max_count));
            let (name, value) = parse_field(&line.slice(..len - 2))?;
            self.headers.push(name, value);
        }
    }

    fn decode_eof(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        match self.decode(src)? {
            Some(headers) => Ok(Some(headers)),
            None => Err(ParseError::invalid_header("unexpected end of stream in header block")),
        }
    }
}

fn parse_field(line: &Bytes) -> Result<(Bytes, Bytes), ParseError> {
    ensure!(!matches!(line[0], b' ' | b'\t'), ParseError::invalid_header("folded header lines are not supported"));

    let colon = line.iter().position(|b| *b == b':').ok_or_else(|| ParseError::invalid_header("missing colon"))?;
    let name = &line[..colon];
    ensure!(!name.is_empty(), ParseError::invalid_header("empty header name"));
    ensure!(
        !matches!(name[name.len() - 1], b' ' | b'\t'),
        ParseError::invalid_header("whitespace between header name and colon")
    );
    ensure!(name.iter().all(|b| is_token(*b)), ParseError::invalid_header("invalid character in header name"));

    let value = &line[colon + 1..];
    let start = value.iter().position(|b| !matches!(b, b' ' | b'\t')).unwrap_or(value.len());
    let end = value.iter().rposition(|b| !matches!(b, b' ' | b'\t')).map_or(start, |i| i + 1);
    ensure!(
        value[start..end].iter().all(|b| is_field_value(*b)),
        ParseError::invalid_header("invalid character in header value")
    );

    Ok((line.slice(..colon), line.slice(colon + 1 + start..colon + 1 + end)))
}
