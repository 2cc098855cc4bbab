//! Message body codecs
//!
//! ## Decoders
//! - [`PayloadDecoder`]: request bodies by content-length, chunked coding, until
//!   close, or none at all
//!
//! ## Encoders
//! - [`PayloadEncoder`]: response bodies by content-length, chunked coding or
//!   until close, rejecting data where no body is allowed

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
