//! Decoder for bodies delimited by `Content-Length`.

use crate::codec::SegmentDecoder;
use crate::pipe::Cursor;
use crate::protocol::{ParseError, PayloadItem};

/// Hands out the declared number of bytes, chunk by chunk, without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// bytes still owed by the peer
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }
}

impl SegmentDecoder for LengthDecoder {
    type Item = PayloadItem;

    fn decode(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let max = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        let bytes = src.take_chunk(max);
        self.remaining -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }

    fn decode_eof(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::TruncatedBody),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{Position, SegmentedBuf};
    use bytes::Bytes;

    #[test]
    fn stops_at_declared_length() {
        let buf = SegmentedBuf::from_segments(
            Position::ZERO,
            [Bytes::from_static(b"hel"), Bytes::from_static(b"loGET / HTTP/1.1\r\n")],
        );
        let mut cursor = buf.cursor();
        let mut decoder = LengthDecoder::new(5);

        assert_eq!(decoder.decode(&mut cursor).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"hel"))));
        assert_eq!(decoder.decode(&mut cursor).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"lo"))));
        assert_eq!(decoder.decode(&mut cursor).unwrap(), Some(PayloadItem::Eof));
        assert_eq!(cursor.position(), Position::new(5));
    }

    #[test]
    fn needs_more_input() {
        let buf = SegmentedBuf::new(Position::ZERO);
        let mut decoder = LengthDecoder::new(5);
        assert_eq!(decoder.decode(&mut buf.cursor()).unwrap(), None);
    }

    #[test]
    fn truncated_at_end_of_stream() {
        let buf = SegmentedBuf::from_segments(Position::ZERO, [Bytes::from_static(b"abc")]);
        let mut cursor = buf.cursor();
        let mut decoder = LengthDecoder::new(5);

        assert!(decoder.decode_eof(&mut cursor).unwrap().unwrap().is_chunk());
        assert!(matches!(decoder.decode_eof(&mut cursor), Err(ParseError::TruncatedBody)));
    }
}
