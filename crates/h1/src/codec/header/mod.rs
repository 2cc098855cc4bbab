//! Header block codecs
//!
//! - [`HeaderDecoder`]: request header blocks and chunked trailer sections,
//!   field by field with size and count limits
//! - [`HeaderEncoder`]: response status line and header fields, including the
//!   framing headers

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
