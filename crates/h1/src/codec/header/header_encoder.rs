//! Serializes the status line and header fields of a response.
//!
//! The status line always announces `HTTP/1.1`, whatever the request version.
//! Framing headers are set from the [`PayloadSize`] picked by the response writer:
//!
//! - `Length(n)`: `Content-Length: n`
//! - `Chunked`: `Transfer-Encoding: chunked` unless the application already set one
//! - `Empty` and `UntilClose`: headers are written as given

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{HeaderValue, header};
use tokio_util::codec::Encoder;

use crate::protocol::{PayloadSize, ResponseHead, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        let status = header.status();
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))
            .map_err(|e| SendError::invalid_header(format!("can't write status line: {e}")))?;

        match payload_size {
            PayloadSize::Length(n) => {
                header.headers_mut().insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                if !header.headers().contains_key(header::TRANSFER_ENCODING) {
                    header.headers_mut().insert(header::TRANSFER_ENCODING, CHUNKED);
                }
            }
            PayloadSize::Empty | PayloadSize::UntilClose => {}
        }

        for (header_name, header_value) in header.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Writer over a [`BytesMut`], used with `write!` for the status line.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Response, StatusCode};
    use indoc::indoc;

    fn encode(head: ResponseHead, size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn content_length() {
        let head = Response::builder().status(StatusCode::OK).header("X-Id", "7").body(()).unwrap();
        let expected = indoc! {"
            HTTP/1.1 200 OK
            x-id: 7
            content-length: 12

        "};
        assert_eq!(encode(head, PayloadSize::Length(12)), expected.replace('\n', "\r\n"));
    }

    #[test]
    fn chunked_keeps_existing_transfer_encoding() {
        let head = Response::builder().header(header::TRANSFER_ENCODING, "gzip, chunked").body(()).unwrap();
        let encoded = encode(head, PayloadSize::Chunked);
        assert!(encoded.contains("transfer-encoding: gzip, chunked\r\n"));
        assert!(!encoded.contains("transfer-encoding: chunked"));

        let encoded = encode(Response::new(()), PayloadSize::Chunked);
        assert!(encoded.contains("transfer-encoding: chunked\r\n"));
    }

    #[test]
    fn status_line_is_always_http_11() {
        let mut head = Response::new(());
        *head.version_mut() = http::Version::HTTP_10;
        *head.status_mut() = StatusCode::NO_CONTENT;
        assert_eq!(encode(head, PayloadSize::Empty), "HTTP/1.1 204 No Content\r\n\r\n");

        let head = Response::builder().status(599).body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Empty), "HTTP/1.1 599 \r\n\r\n");
    }
}
