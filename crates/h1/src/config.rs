//! Connection tunables.
//!
//! Binding these values from files or the environment is left to the embedding
//! application; this module only holds them and checks they are consistent.
//!
//! ```
//! use std::time::Duration;
//! use micro_h1::config::{PipeOptions, ServerConfig};
//!
//! let config = ServerConfig::builder()
//!     .keep_alive_timeout(Duration::from_secs(30))
//!     .max_request_headers_total_size(16 * 1024)
//!     .inbound_pipe(PipeOptions::new(128 * 1024, 64 * 1024).unwrap())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.limits().keep_alive_timeout(), Duration::from_secs(30));
//! ```

use std::time::Duration;

use http::HeaderValue;
use thiserror::Error;

use crate::ensure;

const DEFAULT_PAUSE_WRITER_THRESHOLD: usize = 64 * 1024;
const DEFAULT_RESUME_WRITER_THRESHOLD: usize = 32 * 1024;

/// Interval used by the transport to check data rates.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("resume writer threshold {resume} must be less than pause writer threshold {pause}")]
    InvalidPipeThresholds { pause: usize, resume: usize },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("min data rate grace period {grace_period:?} must be at least the heartbeat interval {heartbeat:?}")]
    GracePeriodTooShort { grace_period: Duration, heartbeat: Duration },

    #[error("request line limit {line} must not exceed header block limit {headers}")]
    RequestLineExceedsHeaders { line: usize, headers: usize },

    #[error("inbound pause writer threshold {pause} must be at least the request head limit {limit}")]
    InboundPauseBelowHeadLimit { pause: usize, limit: usize },
}

/// Backpressure thresholds of a byte pipe.
///
/// A writer is suspended once more than `pause_writer_threshold` bytes are buffered
/// and stays suspended until the reader has drained the pipe to
/// `resume_writer_threshold` bytes or fewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    pause_writer_threshold: usize,
    resume_writer_threshold: usize,
}

impl PipeOptions {
    pub fn new(pause_writer_threshold: usize, resume_writer_threshold: usize) -> Result<Self, ConfigError> {
        ensure!(
            resume_writer_threshold < pause_writer_threshold,
            ConfigError::InvalidPipeThresholds { pause: pause_writer_threshold, resume: resume_writer_threshold }
        );
        Ok(Self { pause_writer_threshold, resume_writer_threshold })
    }

    #[inline]
    pub fn pause_writer_threshold(&self) -> usize {
        self.pause_writer_threshold
    }

    #[inline]
    pub fn resume_writer_threshold(&self) -> usize {
        self.resume_writer_threshold
    }
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self { pause_writer_threshold: DEFAULT_PAUSE_WRITER_THRESHOLD, resume_writer_threshold: DEFAULT_RESUME_WRITER_THRESHOLD }
    }
}

/// A minimum transfer rate, enforced once the grace period has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinDataRate {
    bytes_per_second: u64,
    grace_period: Duration,
}

impl MinDataRate {
    pub fn new(bytes_per_second: u64, grace_period: Duration) -> Result<Self, ConfigError> {
        ensure!(bytes_per_second > 0, ConfigError::Zero { name: "bytes_per_second" });
        ensure!(
            grace_period >= HEARTBEAT_INTERVAL,
            ConfigError::GracePeriodTooShort { grace_period, heartbeat: HEARTBEAT_INTERVAL }
        );
        Ok(Self { bytes_per_second, grace_period })
    }

    #[inline]
    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    #[inline]
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Time allowed for transferring `len` bytes at this rate, grace period included.
    #[allow(clippy::cast_precision_loss, reason = "sub-byte precision is irrelevant for timeouts")]
    pub fn timeout_for(&self, len: usize) -> Duration {
        self.grace_period + Duration::from_secs_f64(len as f64 / self.bytes_per_second as f64)
    }

    /// Whether `bytes` transferred over `elapsed` satisfies the rate.
    ///
    /// Always true while `elapsed` is within the grace period.
    #[allow(clippy::cast_precision_loss, reason = "sub-byte precision is irrelevant for rates")]
    pub fn is_satisfied(&self, bytes: u64, elapsed: Duration) -> bool {
        if elapsed <= self.grace_period {
            return true;
        }
        bytes as f64 / elapsed.as_secs_f64() >= self.bytes_per_second as f64
    }
}

impl Default for MinDataRate {
    fn default() -> Self {
        Self { bytes_per_second: 240, grace_period: Duration::from_secs(5) }
    }
}

/// Request limits and timeouts of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    max_request_line_size: usize,
    max_request_headers_total_size: usize,
    max_request_header_count: usize,
    max_request_body_size: Option<u64>,
    keep_alive_timeout: Duration,
    request_headers_timeout: Duration,
    min_request_body_data_rate: Option<MinDataRate>,
    min_response_data_rate: Option<MinDataRate>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_request_line_size: 8 * 1024,
            max_request_headers_total_size: 32 * 1024,
            max_request_header_count: 100,
            max_request_body_size: Some(30_000_000),
            keep_alive_timeout: Duration::from_secs(130),
            request_headers_timeout: Duration::from_secs(30),
            min_request_body_data_rate: Some(MinDataRate::default()),
            min_response_data_rate: Some(MinDataRate::default()),
        }
    }
}

impl Limits {
    #[inline]
    pub fn max_request_line_size(&self) -> usize {
        self.max_request_line_size
    }

    /// Maximum size of a header block, request line excluded. Also caps chunked trailers.
    #[inline]
    pub fn max_request_headers_total_size(&self) -> usize {
        self.max_request_headers_total_size
    }

    #[inline]
    pub fn max_request_header_count(&self) -> usize {
        self.max_request_header_count
    }

    /// `None` means unlimited.
    #[inline]
    pub fn max_request_body_size(&self) -> Option<u64> {
        self.max_request_body_size
    }

    #[inline]
    pub fn keep_alive_timeout(&self) -> Duration {
        self.keep_alive_timeout
    }

    #[inline]
    pub fn request_headers_timeout(&self) -> Duration {
        self.request_headers_timeout
    }

    #[inline]
    pub fn min_request_body_data_rate(&self) -> Option<MinDataRate> {
        self.min_request_body_data_rate
    }

    #[inline]
    pub fn min_response_data_rate(&self) -> Option<MinDataRate> {
        self.min_response_data_rate
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(self.max_request_line_size > 0, ConfigError::Zero { name: "max_request_line_size" });
        ensure!(self.max_request_headers_total_size > 0, ConfigError::Zero { name: "max_request_headers_total_size" });
        ensure!(self.max_request_header_count > 0, ConfigError::Zero { name: "max_request_header_count" });
        ensure!(!self.keep_alive_timeout.is_zero(), ConfigError::Zero { name: "keep_alive_timeout" });
        ensure!(!self.request_headers_timeout.is_zero(), ConfigError::Zero { name: "request_headers_timeout" });
        ensure!(
            self.max_request_line_size <= self.max_request_headers_total_size,
            ConfigError::RequestLineExceedsHeaders {
                line: self.max_request_line_size,
                headers: self.max_request_headers_total_size
            }
        );
        Ok(())
    }
}

/// Everything a connection needs to know about its server.
///
/// Shared between connections behind a `triomphe::Arc`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    limits: Limits,
    inbound_pipe: PipeOptions,
    outbound_pipe: PipeOptions,
    server_header: Option<HeaderValue>,
    date_header: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            inbound_pipe: PipeOptions::default(),
            outbound_pipe: PipeOptions::default(),
            server_header: Some(HeaderValue::from_static("micro-h1")),
            date_header: true,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    #[inline]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    #[inline]
    pub fn inbound_pipe(&self) -> PipeOptions {
        self.inbound_pipe
    }

    #[inline]
    pub fn outbound_pipe(&self) -> PipeOptions {
        self.outbound_pipe
    }

    /// Value of the `Server` header added to responses, if any.
    #[inline]
    pub fn server_header(&self) -> Option<&HeaderValue> {
        self.server_header.as_ref()
    }

    #[inline]
    pub fn date_header(&self) -> bool {
        self.date_header
    }
}

#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    fn new() -> Self {
        Self { config: ServerConfig::default() }
    }

    pub fn max_request_line_size(mut self, size: usize) -> Self {
        self.config.limits.max_request_line_size = size;
        self
    }

    pub fn max_request_headers_total_size(mut self, size: usize) -> Self {
        self.config.limits.max_request_headers_total_size = size;
        self
    }

    pub fn max_request_header_count(mut self, count: usize) -> Self {
        self.config.limits.max_request_header_count = count;
        self
    }

    pub fn max_request_body_size(mut self, size: Option<u64>) -> Self {
        self.config.limits.max_request_body_size = size;
        self
    }

    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.config.limits.keep_alive_timeout = timeout;
        self
    }

    pub fn request_headers_timeout(mut self, timeout: Duration) -> Self {
        self.config.limits.request_headers_timeout = timeout;
        self
    }

    pub fn min_request_body_data_rate(mut self, rate: Option<MinDataRate>) -> Self {
        self.config.limits.min_request_body_data_rate = rate;
        self
    }

    pub fn min_response_data_rate(mut self, rate: Option<MinDataRate>) -> Self {
        self.config.limits.min_response_data_rate = rate;
        self
    }

    pub fn inbound_pipe(mut self, options: PipeOptions) -> Self {
        self.config.inbound_pipe = options;
        self
    }

    pub fn outbound_pipe(mut self, options: PipeOptions) -> Self {
        self.config.outbound_pipe = options;
        self
    }

    pub fn server_header(mut self, value: Option<HeaderValue>) -> Self {
        self.config.server_header = value;
        self
    }

    pub fn date_header(mut self, enabled: bool) -> Self {
        self.config.date_header = enabled;
        self
    }

    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let limits = &self.config.limits;
        limits.validate()?;

        // heads are committed one whole line at a time, a line must fit below the pause point
        let pause = self.config.inbound_pipe.pause_writer_threshold();
        let limit = limits.max_request_line_size.max(limits.max_request_headers_total_size);
        ensure!(pause >= limit, ConfigError::InboundPauseBelowHeadLimit { pause, limit });
        Ok(self.config)
    }
}
