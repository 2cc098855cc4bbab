//! Response head and body encoding.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadItem, PayloadSize, ResponseHead, SendError};

/// Encodes one response at a time: its head, then body items up to `Eof`.
#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Whether a head was encoded and its body is not finished yet.
    pub fn is_streaming(&self) -> bool {
        self.payload_encoder.is_some()
    }

    /// Shorthand for encoding one body item.
    pub fn encode_payload<D: Buf>(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), SendError> {
        self.encode(Message::<(ResponseHead, PayloadSize), D>::Payload(item), dst)
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(SendError::invalid_header("response head sent twice"));
                }

                self.payload_encoder = Some(PayloadEncoder::new(payload_size));
                self.header_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response header but receive payload item");
                    return Err(SendError::invalid_body("body sent before response head"));
                };

                let is_eof = payload_item.is_eof();
                let result = payload_encoder.encode(payload_item, dst);
                if is_eof {
                    self.payload_encoder.take();
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Response;

    #[test]
    fn head_then_chunked_body() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((Response::new(()), PayloadSize::Chunked)), &mut dst).unwrap();
        assert!(encoder.is_streaming());
        encoder.encode_payload(PayloadItem::Chunk(Bytes::from_static(b"hi")), &mut dst).unwrap();
        encoder.encode_payload(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        assert!(!encoder.is_streaming());

        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n2\r\nhi\r\n0\r\n\r\n");
    }

    #[test]
    fn length_body_ends_on_eof() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((Response::new(()), PayloadSize::Length(2))), &mut dst).unwrap();
        encoder.encode_payload(PayloadItem::Chunk(Bytes::from_static(b"hi")), &mut dst).unwrap();
        assert!(encoder.is_streaming());
        encoder.encode_payload(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        assert!(!encoder.is_streaming());
    }

    #[test]
    fn body_before_head() {
        let mut encoder = ResponseEncoder::new();
        let result = encoder.encode_payload(PayloadItem::Chunk(Bytes::from_static(b"x")), &mut BytesMut::new());
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
    }
}
