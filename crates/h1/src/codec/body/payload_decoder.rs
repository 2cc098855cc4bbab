//! Body decoding for each way a request body can be delimited.

use crate::codec::SegmentDecoder;
use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::config::Limits;
use crate::pipe::Cursor;
use crate::protocol::{HeaderList, ParseError, PayloadItem, PayloadSize};

#[derive(Debug)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    NoBody,
    /// every byte up to the end of the stream
    UntilClose,
}

impl PayloadDecoder {
    pub fn new(size: PayloadSize, limits: &Limits) -> Self {
        match size {
            PayloadSize::Length(n) => Self::fix_length(n),
            PayloadSize::Chunked => Self::chunked(limits),
            PayloadSize::Empty => Self::empty(),
            PayloadSize::UntilClose => Self::until_close(),
        }
    }

    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked(limits: &Limits) -> Self {
        let decoder = ChunkedDecoder::new(limits.max_request_headers_total_size(), limits.max_request_header_count());
        Self { kind: Kind::Chunked(decoder) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    /// Trailer fields of a chunked body, once it has been read to the end.
    pub fn take_trailers(&mut self) -> Option<HeaderList> {
        match &mut self.kind {
            Kind::Chunked(decoder) => decoder.take_trailers(),
            Kind::Length(_) | Kind::NoBody | Kind::UntilClose => None,
        }
    }
}

impl SegmentDecoder for PayloadDecoder {
    type Item = PayloadItem;

    fn decode(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        match &mut self.kind {
            Kind::Length(decoder) => decoder.decode(src),
            Kind::Chunked(decoder) => decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
            Kind::UntilClose if src.is_empty() => Ok(None),
            Kind::UntilClose => Ok(Some(PayloadItem::Chunk(src.take_chunk(usize::MAX)))),
        }
    }

    fn decode_eof(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        match &mut self.kind {
            Kind::Length(decoder) => decoder.decode_eof(src),
            Kind::Chunked(decoder) => decoder.decode_eof(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
            Kind::UntilClose if src.is_empty() => Ok(Some(PayloadItem::Eof)),
            Kind::UntilClose => Ok(Some(PayloadItem::Chunk(src.take_chunk(usize::MAX)))),
        }
    }
}
