//! The per-connection request/response cycle.
//!
//! [`HttpConnection`] reads request heads from the inbound pipe, hands each
//! request to the handler together with a [`ResponseWriter`], drains what the
//! handler left of the request body and completes the response. It loops while
//! keep-alive holds.
//!
//! Progress is tracked by [`ConnectionState`]. `Closing` ends the connection
//! after everything written was flushed; `Aborted` ends it at once.

mod http_connection;
mod response_writer;
mod state;

pub use http_connection::HttpConnection;
pub use response_writer::ResponseWriter;
pub use state::ConnectionState;
