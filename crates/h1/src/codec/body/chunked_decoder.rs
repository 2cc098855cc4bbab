//! Decoder for `Transfer-Encoding: chunked` bodies.
//!
//! ```text
//! chunked-body = *chunk last-chunk trailer-section CRLF
//! chunk        = chunk-size [ chunk-ext ] CRLF chunk-data CRLF
//! last-chunk   = 1*("0") [ chunk-ext ] CRLF
//! ```
//!
//! Chunk extensions are skipped. The trailer section is parsed with the header
//! decoder and kept until the body reader asks for it.

use std::task::Poll;

use bytes::Bytes;
use tracing::trace;

use crate::codec::{HeaderDecoder, SegmentDecoder};
use crate::pipe::Cursor;
use crate::protocol::{HeaderList, ParseError, PayloadItem};
use ChunkedState::*;

#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    trailer_decoder: HeaderDecoder,
    trailers: Option<HeaderList>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// First hex digit of the chunk size
    SizeStart,
    /// Remaining hex digits of the chunk size
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Chunk extension, skipped up to CR
    Extension,
    /// LF ending the size line
    SizeLf,
    /// Chunk data
    Body,
    /// CR after the chunk data
    BodyCr,
    /// LF after the chunk data
    BodyLf,
    /// Trailer fields up to the empty line
    Trailer,
    End,
}

impl ChunkedDecoder {
    /// Trailers share the limits of the request header block.
    pub fn new(max_trailer_size: usize, max_trailer_count: usize) -> Self {
        Self {
            state: SizeStart,
            remaining_size: 0,
            trailer_decoder: HeaderDecoder::new(max_trailer_size, max_trailer_count),
            trailers: None,
        }
    }

    /// Trailer fields, available once the body reached its end.
    pub fn take_trailers(&mut self) -> Option<HeaderList> {
        self.trailers.take().filter(|trailers| !trailers.is_empty())
    }
}

impl SegmentDecoder for ChunkedDecoder {
    type Item = PayloadItem;

    fn decode(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        loop {
            match self.state {
                End => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }
                Trailer => match self.trailer_decoder.decode(src)? {
                    Some(trailers) => {
                        trace!(count = trailers.len(), "read chunked trailers");
                        self.trailers = Some(trailers);
                        self.state = End;
                        continue;
                    }
                    None => return Ok(None),
                },
                _ => {}
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut buf = None;
            self.state = match self.state.step(src, &mut self.remaining_size, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::TruncatedBody),
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        match $src.next_byte() {
            Some(byte) => byte,
            None => return Poll::Pending,
        }
    }};
}

fn invalid(reason: &'static str) -> Poll<Result<ChunkedState, ParseError>> {
    Poll::Ready(Err(ParseError::invalid_chunk(reason)))
}

impl ChunkedState {
    fn step(
        &self,
        src: &mut Cursor<'_>,
        remaining_size: &mut u64,
        buf: &mut Option<Bytes>,
    ) -> Poll<Result<ChunkedState, ParseError>> {
        match self {
            SizeStart => ChunkedState::read_size_start(src, remaining_size),
            Size => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, buf),
            BodyCr => ChunkedState::read_body_cr(src),
            BodyLf => ChunkedState::read_body_lf(src),
            Trailer => Poll::Ready(Ok(Trailer)),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn read_size_start(src: &mut Cursor<'_>, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        let b = try_next_byte!(src);
        match hex_value(b) {
            Some(digit) => {
                *size_per_chunk = u64::from(digit);
                Poll::Ready(Ok(Size))
            }
            None => invalid("chunk size must start with a hex digit"),
        }
    }

    fn read_size(src: &mut Cursor<'_>, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        macro_rules! or_overflow {
            ($e:expr) => {
                match $e {
                    Some(val) => val,
                    None => return invalid("chunk size overflow"),
                }
            };
        }

        match try_next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b => match hex_value(b) {
                Some(digit) => {
                    *size_per_chunk = or_overflow!(size_per_chunk.checked_mul(16));
                    *size_per_chunk = or_overflow!(size_per_chunk.checked_add(u64::from(digit)));
                    Poll::Ready(Ok(Size))
                }
                None => invalid("invalid chunk size"),
            },
        }
    }

    fn read_size_lws(src: &mut Cursor<'_>) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            // whitespace may follow the size, digits may not
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => invalid("invalid chunk size linear white space"),
        }
    }

    fn read_extension(src: &mut Cursor<'_>) -> Poll<Result<ChunkedState, ParseError>> {
        // extensions end at CRLF, a bare LF inside one is rejected
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => invalid("chunk extension contains newline"),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf(src: &mut Cursor<'_>, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' if *size_per_chunk == 0 => Poll::Ready(Ok(Trailer)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => invalid("invalid chunk size LF"),
        }
    }

    fn read_body(
        src: &mut Cursor<'_>,
        size_per_chunk: &mut u64,
        buf: &mut Option<Bytes>,
    ) -> Poll<Result<ChunkedState, ParseError>> {
        if *size_per_chunk == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let max = usize::try_from(*size_per_chunk).unwrap_or(usize::MAX);
        let bytes = src.take_chunk(max);
        if bytes.is_empty() {
            return Poll::Pending;
        }

        *size_per_chunk -= bytes.len() as u64;
        *buf = Some(bytes);

        if *size_per_chunk > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_body_cr(src: &mut Cursor<'_>) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => invalid("invalid chunk body CR"),
        }
    }

    fn read_body_lf(src: &mut Cursor<'_>) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(SizeStart)),
            _ => invalid("invalid chunk body LF"),
        }
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b + 10 - b'a'),
        b'A'..=b'F' => Some(b + 10 - b'A'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{Position, SegmentedBuf};

    fn decoder() -> ChunkedDecoder {
        ChunkedDecoder::new(32 * 1024, 100)
    }

    fn one_segment(bytes: &[u8]) -> SegmentedBuf {
        SegmentedBuf::from_segments(Position::ZERO, [Bytes::copy_from_slice(bytes)])
    }

    fn chunk(bytes: &'static [u8]) -> Option<PayloadItem> {
        Some(PayloadItem::Chunk(Bytes::from_static(bytes)))
    }

    #[test]
    fn test_basic() {
        let buf = one_segment(b"10\r\n1234567890abcdef\r\n0\r\n\r\n");
        let mut cursor = buf.cursor();
        let mut decoder = decoder();

        assert_eq!(decoder.decode(&mut cursor).unwrap(), chunk(b"1234567890abcdef"));
        assert_eq!(decoder.decode(&mut cursor).unwrap(), Some(PayloadItem::Eof));
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_multiple_chunks() {
        let buf = one_segment(b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n");
        let mut cursor = buf.cursor();
        let mut decoder = decoder();

        assert_eq!(decoder.decode(&mut cursor).unwrap(), chunk(b"hello"));
        assert_eq!(decoder.decode(&mut cursor).unwrap(), chunk(b", world"));
        assert_eq!(decoder.decode(&mut cursor).unwrap(), Some(PayloadItem::Eof));
    }

    #[test]
    fn test_chunks_with_extensions() {
        let buf = one_segment(b"5;chunk-ext=value\r\nhello\r\n0;last\r\n\r\n");
        let mut cursor = buf.cursor();
        let mut decoder = decoder();

        assert_eq!(decoder.decode(&mut cursor).unwrap(), chunk(b"hello"));
        assert_eq!(decoder.decode(&mut cursor).unwrap(), Some(PayloadItem::Eof));
    }

    #[test]
    fn test_chunks_with_trailers() {
        let buf = one_segment(b"5\r\nhello\r\n0\r\nChecksum: abc\r\nX-Done: 1\r\n\r\nGET");
        let mut cursor = buf.cursor();
        let mut decoder = decoder();

        assert_eq!(decoder.decode(&mut cursor).unwrap(), chunk(b"hello"));
        assert_eq!(decoder.decode(&mut cursor).unwrap(), Some(PayloadItem::Eof));
        assert_eq!(cursor.remaining(), 3);

        let trailers = decoder.take_trailers().unwrap();
        assert_eq!(trailers.get("checksum"), Some(&b"abc"[..]));
        assert_eq!(trailers.len(), 2);
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut decoder = decoder();

        let first = one_segment(b"5\r\nhel");
        let mut cursor = first.cursor();
        assert_eq!(decoder.decode(&mut cursor).unwrap(), chunk(b"hel"));
        assert_eq!(decoder.decode(&mut cursor).unwrap(), None);

        let second = SegmentedBuf::from_segments(cursor.position(), [Bytes::from_static(b"lo\r\n0\r\n\r\n")]);
        let mut cursor = second.cursor();
        assert_eq!(decoder.decode(&mut cursor).unwrap(), chunk(b"lo"));
        assert_eq!(decoder.decode(&mut cursor).unwrap(), Some(PayloadItem::Eof));
    }

    #[test]
    fn test_one_byte_segments() {
        let input = b"3\r\nabc\r\n2;x=y\r\nde\r\n0\r\nT: v\r\n\r\n";
        let segments = input.iter().map(|b| Bytes::copy_from_slice(&[*b]));
        let buf = SegmentedBuf::from_segments(Position::ZERO, segments);
        let mut cursor = buf.cursor();
        let mut decoder = decoder();

        let mut body = Vec::new();
        loop {
            match decoder.decode(&mut cursor).unwrap() {
                Some(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                Some(PayloadItem::Eof) => break,
                None => panic!("input is complete"),
            }
        }
        assert_eq!(body, b"abcde");
        assert!(decoder.take_trailers().is_some());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let buf = one_segment(b"xyz\r\n");
        assert!(matches!(decoder().decode(&mut buf.cursor()), Err(ParseError::InvalidChunk { .. })));

        let buf = one_segment(b"\r\n");
        assert!(matches!(decoder().decode(&mut buf.cursor()), Err(ParseError::InvalidChunk { .. })));

        let buf = one_segment(b"5\nhello");
        assert!(matches!(decoder().decode(&mut buf.cursor()), Err(ParseError::InvalidChunk { .. })));
    }

    #[test]
    fn test_size_overflow() {
        let buf = one_segment(b"10000000000000000\r\n");
        assert!(matches!(decoder().decode(&mut buf.cursor()), Err(ParseError::InvalidChunk { .. })));
    }

    #[test]
    fn test_missing_crlf() {
        let buf = one_segment(b"5\r\nhelloBad");
        let mut cursor = buf.cursor();
        let mut decoder = decoder();

        assert_eq!(decoder.decode(&mut cursor).unwrap(), chunk(b"hello"));
        assert!(decoder.decode(&mut cursor).is_err());
    }

    #[test]
    fn test_large_chunk() {
        let size = 1024 * 1024;
        let mut data = Vec::with_capacity(size + 16);
        data.extend(format!("{size:x}\r\n").into_bytes());
        data.extend(vec![b'A'; size]);
        data.extend(b"\r\n0\r\n\r\n");

        let buf = one_segment(&data);
        let mut cursor = buf.cursor();
        let mut decoder = decoder();

        let item = decoder.decode(&mut cursor).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap().len(), size);
        assert!(item.as_bytes().unwrap().iter().all(|&b| b == b'A'));
        assert!(decoder.decode(&mut cursor).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_zero_size_chunk() {
        let buf = one_segment(b"0\r\n\r\n");
        let mut decoder = decoder();
        assert!(decoder.decode(&mut buf.cursor()).unwrap().unwrap().is_eof());
        assert!(decoder.take_trailers().is_none());
    }

    #[test]
    fn test_truncated() {
        let buf = one_segment(b"5\r\nhe");
        let mut cursor = buf.cursor();
        let mut decoder = decoder();

        assert_eq!(decoder.decode_eof(&mut cursor).unwrap(), chunk(b"he"));
        assert!(matches!(decoder.decode_eof(&mut cursor), Err(ParseError::TruncatedBody)));
    }
}
