//! Tokio transport adapter.
//!
//! [`serve_connection`] runs one connection over any `AsyncRead + AsyncWrite`
//! stream. Three tasks run concurrently on the current task:
//!
//! - the read pump moves bytes from the stream into the inbound pipe and checks
//!   the minimum request body data rate on every heartbeat
//! - the write pump moves bytes from the outbound pipe to the stream, each write
//!   bounded by the minimum response data rate
//! - the driver runs the [`HttpConnection`] and watches for cancellation
//!
//! Cancellation, either from the caller's token or from a data rate violation,
//! cancels pending pipe reads and flushes so the connection ends as `Aborted`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{HEARTBEAT_INTERVAL, MinDataRate, ServerConfig};
use crate::connection::HttpConnection;
use crate::handler::Handler;
use crate::pipe::{PipeReader, PipeWriter, pipe};
use crate::protocol::HttpError;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Serves HTTP/1.x requests from `io` with `handler` until the connection ends.
///
/// Cancelling `shutdown` aborts the connection: pending reads and flushes are
/// woken and whatever the connection is doing fails.
pub async fn serve_connection<IO, H>(
    io: IO,
    handler: &H,
    config: triomphe::Arc<ServerConfig>,
    shutdown: CancellationToken,
) -> Result<(), HttpError>
where
    IO: AsyncRead + AsyncWrite + Send,
    H: Handler,
{
    let (read_half, write_half) = tokio::io::split(io);
    let (inbound_writer, inbound_reader) = pipe(config.inbound_pipe());
    let (outbound_writer, outbound_reader) = pipe(config.outbound_pipe());

    let mut connection = HttpConnection::new(inbound_reader, outbound_writer, triomphe::Arc::clone(&config));
    let read_canceler = connection.read_canceler();
    let flush_canceler = connection.flush_canceler();
    let reading_body = connection.reading_body();

    let abort = shutdown.child_token();
    let finished = CancellationToken::new();
    let limits = config.limits();

    let read_pump = read_pump(
        read_half,
        inbound_writer,
        reading_body,
        limits.min_request_body_data_rate(),
        abort.clone(),
        finished.clone(),
    );
    let write_pump = write_pump(write_half, outbound_reader, limits.min_response_data_rate());

    let driver = async move {
        let result = {
            let process = connection.process(handler);
            tokio::pin!(process);
            select! {
                result = &mut process => result,
                () = abort.cancelled() => {
                    info!("connection canceled");
                    read_canceler.cancel();
                    flush_canceler.cancel();
                    process.await
                }
            }
        };
        // completes both pipes so the pumps can finish
        drop(connection);
        finished.cancel();
        result
    };

    let (result, (), ()) = tokio::join!(driver, read_pump, write_pump);
    match &result {
        Ok(()) => debug!("connection finished"),
        Err(e) => debug!(cause = %e, "connection finished with error"),
    }
    result
}

async fn read_pump<R: AsyncRead>(
    io: R,
    mut pipe: PipeWriter,
    reading_body: Arc<AtomicBool>,
    min_rate: Option<MinDataRate>,
    abort: CancellationToken,
    finished: CancellationToken,
) {
    tokio::pin!(io);
    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut monitor = RateMonitor::new(min_rate);
    let mut total = 0u64;

    loop {
        pipe.buffer_mut().reserve(READ_BUFFER_SIZE);
        select! {
            read = io.read_buf(pipe.buffer_mut()) => match read {
                Ok(0) => {
                    debug!("peer closed its side of the connection");
                    pipe.complete(None);
                    return;
                }
                Ok(n) => {
                    total += n as u64;
                    trace!(len = n, "read from transport");
                    match pipe.flush().await {
                        Ok(result) if result.is_completed() => return,
                        Ok(_) => {}
                        Err(e) => {
                            debug!(cause = %e, "inbound pipe failed");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(cause = %e, "can't read from transport");
                    pipe.complete(Some(e));
                    return;
                }
            },
            _ = heartbeat.tick() => {
                if !monitor.check(reading_body.load(Ordering::Relaxed), total, Instant::now()) {
                    warn!("request body data rate too low, abort connection");
                    abort.cancel();
                }
            }
            () = abort.cancelled() => {
                pipe.complete(Some(io::ErrorKind::ConnectionAborted.into()));
                return;
            }
            () = finished.cancelled() => {
                pipe.complete(None);
                return;
            }
        }
    }
}

async fn write_pump<W: AsyncWrite>(io: W, mut pipe: PipeReader, min_rate: Option<MinDataRate>) {
    tokio::pin!(io);
    loop {
        let result = match pipe.read().await {
            Ok(result) => result,
            Err(e) => {
                debug!(cause = %e, "outbound pipe closed with error");
                break;
            }
        };

        let buffer = result.buffer();
        for segment in buffer.segments() {
            let written = match min_rate {
                Some(rate) => timeout(rate.timeout_for(segment.len()), io.write_all(segment))
                    .await
                    .unwrap_or_else(|_elapsed| Err(io::ErrorKind::TimedOut.into())),
                None => io.write_all(segment).await,
            };
            if let Err(e) = written {
                warn!(cause = %e, "can't write to transport");
                pipe.complete(Some(e));
                return;
            }
        }
        if let Err(e) = io.flush().await {
            warn!(cause = %e, "can't flush transport");
            pipe.complete(Some(e));
            return;
        }

        let end = buffer.end();
        if let Err(e) = pipe.advance_to(end, end) {
            debug!(cause = %e, "can't advance outbound pipe");
            return;
        }
        if result.is_completed() {
            break;
        }
    }

    if let Err(e) = io.shutdown().await {
        debug!(cause = %e, "can't shutdown transport");
    }
}

/// Tracks the request body transfer rate across heartbeats.
#[derive(Debug)]
struct RateMonitor {
    min_rate: Option<MinDataRate>,
    started: Option<(Instant, u64)>,
}

impl RateMonitor {
    fn new(min_rate: Option<MinDataRate>) -> Self {
        Self { min_rate, started: None }
    }

    /// Returns false once a body read has been too slow.
    fn check(&mut self, reading_body: bool, total: u64, now: Instant) -> bool {
        let Some(min_rate) = self.min_rate else {
            return true;
        };
        if !reading_body {
            self.started = None;
            return true;
        }

        let (since, base) = *self.started.get_or_insert((now, total));
        min_rate.is_satisfied(total - base, now - since)
    }
}
