//! An asynchronous HTTP/1.x connection engine
//!
//! This crate turns a byte stream into a sequence of HTTP/1.0 and HTTP/1.1
//! request/response exchanges. It parses requests incrementally out of a
//! segmented byte pipe, streams request bodies to the application, frames
//! responses and runs the connection lifecycle including keep-alive, pipelining,
//! `Expect: 100-continue` and timeouts.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http_body_util::Full;
//! use micro_h1::config::ServerConfig;
//! use micro_h1::connection::ResponseWriter;
//! use micro_h1::handler::Handler;
//! use micro_h1::protocol::{HandlerError, Request};
//! use micro_h1::transport::serve_connection;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//! use tracing::{error, info, warn};
//!
//! struct HelloWorld;
//!
//! impl Handler for HelloWorld {
//!     async fn call(&self, request: Request<'_>, response: &mut ResponseWriter<'_>) -> Result<(), HandlerError> {
//!         info!(path = %String::from_utf8_lossy(request.target().path()), "receive request");
//!         response.send_body(Full::new(Bytes::from_static(b"Hello World!\r\n"))).await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = triomphe::Arc::new(ServerConfig::default());
//!     let handler = Arc::new(HelloWorld);
//!     let shutdown = CancellationToken::new();
//!
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = Arc::clone(&handler);
//!         let config = triomphe::Arc::clone(&config);
//!         let shutdown = shutdown.child_token();
//!         tokio::spawn(async move {
//!             if let Err(e) = serve_connection(tcp_stream, handler.as_ref(), config, shutdown).await {
//!                 warn!(cause = %e, "connection closed with error");
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`pipe`]: single-producer single-consumer byte pipes with backpressure,
//!   one per direction
//! - [`codec`]: resumable request decoders working on pipe segments, and the
//!   response encoder
//! - [`protocol`]: request and response types, the request body stream, errors
//! - [`connection`]: the per-connection state machine and the response writer
//! - [`handler`]: the application interface
//! - [`transport`]: runs a connection over a tokio `AsyncRead + AsyncWrite`
//! - [`config`]: limits, timeouts and pipe thresholds
//!
//! ## Error Handling
//!
//! - [`protocol::ParseError`]: malformed or oversized requests, each mapped to a
//!   response status
//! - [`protocol::SendError`]: response framing violations and closed connections
//! - [`pipe::PipeError`]: transport failures seen through a pipe
//! - [`config::ConfigError`]: invalid configuration
//! - [`protocol::HttpError`]: how a connection ended, when not gracefully
//!
//! # Limitations
//!
//! - HTTP/1.x only, no HTTP/2 or HTTP/3
//! - No TLS, wrap the stream before handing it to [`transport::serve_connection`]
//! - Trailers of response bodies are not sent

pub mod codec;
pub mod config;
pub mod connection;
mod date;
pub mod handler;
pub mod pipe;
pub mod protocol;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
