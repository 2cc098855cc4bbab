use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{PayloadItem, SendError};

/// Writes a body whose length was announced in `Content-Length`.
///
/// Writing more than declared, or finishing with less, is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    declared: u64,
    written: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { declared: length, written: 0 }
    }

    pub fn is_finish(&self) -> bool {
        self.written == self.declared
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                let len = bytes.remaining() as u64;
                if self.written + len > self.declared {
                    return Err(SendError::ContentLengthMismatch { declared: self.declared, written: self.written + len });
                }
                self.written += len;
                dst.put(bytes);
                Ok(())
            }
            PayloadItem::Eof if self.is_finish() => Ok(()),
            PayloadItem::Eof => Err(SendError::ContentLengthMismatch { declared: self.declared, written: self.written }),
        }
    }
}
