use std::hint::black_box;

use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use http::{Response, StatusCode};
use http_body_util::Full;
use micro_h1::codec::{RequestDecoder, ResponseEncoder, SegmentDecoder};
use micro_h1::config::{Limits, ServerConfig};
use micro_h1::connection::ResponseWriter;
use micro_h1::handler::Handler;
use micro_h1::pipe::{Position, SegmentedBuf};
use micro_h1::protocol::{HandlerError, Message, PayloadSize, Request};
use micro_h1::transport::serve_connection;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;

const REQUEST: &[u8] = b"GET /api/v1/items?page=2 HTTP/1.1\r\n\
Host: localhost:8080\r\n\
User-Agent: curl/8.7.1\r\n\
Accept: */*\r\n\
Accept-Encoding: gzip, deflate, br\r\n\
Connection: keep-alive\r\n\r\n";

struct HelloWorld;

impl Handler for HelloWorld {
    async fn call(&self, _request: Request<'_>, response: &mut ResponseWriter<'_>) -> Result<(), HandlerError> {
        response.send_body(Full::new(Bytes::from_static(b"Hello World!"))).await?;
        Ok(())
    }
}

fn bench_request_decoder(c: &mut Criterion) {
    let limits = Limits::default();

    c.bench_function("decode_request_contiguous", |b| {
        let buf = SegmentedBuf::from_segments(Position::ZERO, [Bytes::from_static(REQUEST)]);
        b.iter(|| {
            let mut decoder = RequestDecoder::new(&limits);
            black_box(decoder.decode(&mut buf.cursor()).unwrap());
        });
    });

    c.bench_function("decode_request_16_byte_segments", |b| {
        let segments = REQUEST.chunks(16).map(Bytes::from_static);
        let buf = SegmentedBuf::from_segments(Position::ZERO, segments);
        b.iter(|| {
            let mut decoder = RequestDecoder::new(&limits);
            black_box(decoder.decode(&mut buf.cursor()).unwrap());
        });
    });
}

fn bench_response_encoder(c: &mut Criterion) {
    c.bench_function("encode_response_head", |b| {
        b.iter(|| {
            let mut encoder = ResponseEncoder::new();
            let mut bytes = bytes::BytesMut::new();
            let mut head = Response::new(());
            *head.status_mut() = StatusCode::OK;
            let message = Message::<_, Bytes>::Header((head, PayloadSize::Length(12)));
            black_box(encoder.encode(message, &mut bytes).unwrap());
        });
    });
}

fn bench_connection(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let config = triomphe::Arc::new(ServerConfig::default());

    c.bench_function("serve_single_request", |b| {
        b.to_async(&runtime).iter(|| async {
            let (mut client, server) = tokio::io::duplex(16 * 1024);
            let serve = serve_connection(server, &HelloWorld, triomphe::Arc::clone(&config), CancellationToken::new());
            let client = async move {
                client.write_all(REQUEST).await.unwrap();
                client.shutdown().await.unwrap();
                let mut received = Vec::new();
                client.read_to_end(&mut received).await.unwrap();
                received
            };
            black_box(tokio::join!(serve, client))
        });
    });
}

criterion_group!(benches, bench_request_decoder, bench_response_encoder, bench_connection);
criterion_main!(benches);
