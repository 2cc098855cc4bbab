//! HTTP codec module for decoding requests and encoding responses
//!
//! Requests are decoded straight from the segmented buffers a pipe read returns,
//! responses are encoded into the staging buffer of the outbound pipe.
//!
//! # Architecture
//!
//! - Request handling:
//!   - [`known_tokens`]: one-comparison matching of methods and versions
//!   - [`RequestLineDecoder`]: the request line, resumable across reads
//!   - [`HeaderDecoder`]: header blocks and chunked trailers
//!   - [`RequestDecoder`]: request line, headers, then body framing selection
//!   - [`PayloadDecoder`]: content-length, chunked and until-close bodies
//!
//! - Response handling:
//!   - [`ResponseEncoder`]: status line, headers and body framing, built on
//!     [`tokio_util::codec::Encoder`]
//!
//! # Decoding contract
//!
//! Every request side decoder implements [`SegmentDecoder`]. A call moves the
//! cursor over the bytes it consumed; whatever lies behind the cursor can be
//! released to the pipe. `Ok(None)` means every remaining byte was examined and
//! the decoder needs more input, so the caller reports the buffer end as examined.
//!
//! ```
//! use bytes::Bytes;
//! use micro_h1::codec::{RequestDecoder, SegmentDecoder};
//! use micro_h1::config::Limits;
//! use micro_h1::pipe::{Position, SegmentedBuf};
//!
//! let mut decoder = RequestDecoder::new(&Limits::default());
//!
//! let first = SegmentedBuf::from_segments(Position::ZERO, [Bytes::from_static(b"GET /a HT")]);
//! let mut cursor = first.cursor();
//! assert!(decoder.decode(&mut cursor).unwrap().is_none());
//!
//! let second = SegmentedBuf::from_segments(
//!     cursor.position(),
//!     [Bytes::from_static(b"GET /a HT"), Bytes::from_static(b"TP/1.1\r\nHost: x\r\n\r\n")],
//! );
//! let (head, payload) = decoder.decode(&mut second.cursor()).unwrap().unwrap();
//! assert_eq!(head.target().path(), b"/a");
//! assert!(payload.is_empty());
//! ```

use crate::pipe::Cursor;
use crate::protocol::ParseError;

mod body;
mod header;
pub mod known_tokens;
mod request_decoder;
mod request_line;
mod response_encoder;

pub use body::{PayloadDecoder, PayloadEncoder};
pub use header::{HeaderDecoder, HeaderEncoder};
pub use request_decoder::RequestDecoder;
pub use request_line::{RequestLine, RequestLineDecoder};
pub use response_encoder::ResponseEncoder;

/// Incremental decoding over a segmented buffer.
pub trait SegmentDecoder {
    type Item;

    /// Decodes one item, advancing `src` over the bytes it consumed.
    ///
    /// Returns `Ok(None)` when more input is needed.
    fn decode(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError>;

    /// Like [`decode`](Self::decode), called when no more input will arrive.
    ///
    /// Decoders that can't finish with the remaining bytes report an error here.
    fn decode_eof(&mut self, src: &mut Cursor<'_>) -> Result<Option<Self::Item>, ParseError> {
        self.decode(src)
    }
}
