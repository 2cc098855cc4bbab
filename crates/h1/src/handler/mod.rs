//! The application side of a connection.
//!
//! A handler receives each request together with the writer for its response.
//! The request body streams from the connection while the handler runs, and the
//! response is written through the [`ResponseWriter`] as the handler goes.
//!
//! Whatever the handler leaves undone is finished by the connection: unread
//! request body is drained and an unfinished response is completed. A handler
//! returning an error, or panicking, gets a `500` response if nothing was written
//! yet and an aborted connection otherwise.

use crate::connection::ResponseWriter;
use crate::protocol::{HandlerError, Request};

/// Handles requests of a connection, one at a time.
///
/// [`Handler`] is the `Send` variant required by [`crate::transport::serve_connection`].
#[trait_variant::make(Handler: Send)]
pub trait LocalHandler {
    async fn call(&self, request: Request<'_>, response: &mut ResponseWriter<'_>) -> Result<(), HandlerError>;
}
