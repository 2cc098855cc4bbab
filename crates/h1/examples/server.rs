//! A small server answering every request with a description of it.
//!
//! Stops accepting on ctrl-c and aborts the open connections.

use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use micro_h1::config::ServerConfig;
use micro_h1::connection::ResponseWriter;
use micro_h1::handler::Handler;
use micro_h1::protocol::{HandlerError, Request};
use micro_h1::transport::serve_connection;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

struct Describe;

impl Handler for Describe {
    async fn call(&self, request: Request<'_>, response: &mut ResponseWriter<'_>) -> Result<(), HandlerError> {
        let method = request.method().clone();
        let path = String::from_utf8_lossy(request.target().path()).into_owned();

        if method == Method::GET && path == "/stream" {
            response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(mime::TEXT_PLAIN_UTF_8.as_ref()));
            for i in 0..5 {
                response.write_body(Bytes::from(format!("line {i}\r\n"))).await?;
            }
            return Ok(());
        }

        let body = request.into_body().collect().await?.to_bytes();
        info!(%method, %path, body_len = body.len(), "receive request");

        let reply = match std::str::from_utf8(&body) {
            Ok(text) if !text.is_empty() => format!("{method} {path}, body: {text}\r\n"),
            Ok(_) => format!("{method} {path}\r\n"),
            Err(_) => {
                response.set_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
                return Ok(());
            }
        };
        response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(mime::TEXT_PLAIN_UTF_8.as_ref()));
        response.send_body(Full::new(Bytes::from(reply))).await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = match ServerConfig::builder().max_request_body_size(Some(1024 * 1024)).build() {
        Ok(config) => triomphe::Arc::new(config),
        Err(e) => {
            error!(cause = %e, "invalid server config");
            return;
        }
    };

    info!(port = 8080, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let handler = Arc::new(Describe);
    let shutdown = CancellationToken::new();
    loop {
        let (tcp_stream, remote_addr) = tokio::select! {
            accepted = tcp_listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                shutdown.cancel();
                return;
            }
        };

        let handler = Arc::clone(&handler);
        let config = triomphe::Arc::clone(&config);
        let shutdown = shutdown.child_token();
        tokio::spawn(async move {
            match serve_connection(tcp_stream, handler.as_ref(), config, shutdown).await {
                Ok(()) => info!(%remote_addr, "finished process, connection shutdown"),
                Err(e) => warn!(%remote_addr, cause = %e, "connection closed with error"),
            }
        });
    }
}
