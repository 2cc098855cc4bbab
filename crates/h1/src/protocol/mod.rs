//! Core HTTP/1.x protocol types.
//!
//! - **Messages** ([`message`]): [`Message`], [`PayloadItem`] and the body framing
//!   [`PayloadSize`] shared by the decoders and encoders
//! - **Requests** ([`request`]): [`RequestHead`] as parsed off the wire and the
//!   [`Request`] handed to handlers
//! - **Header fields** ([`header`]): the ordered [`HeaderList`] and the
//!   [`ConnectionOptions`] read from it
//! - **Request targets** ([`target`]): the four target forms
//! - **Responses** ([`response`]): [`ResponseHead`]
//! - **Bodies** ([`body`]): streaming request bodies implementing `http_body::Body`
//! - **Errors** ([`error`]): [`HttpError`], [`ParseError`] and [`SendError`]

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::Request;
pub use request::RequestHead;

mod response;
pub use response::ResponseHead;

mod header;
pub use header::ConnectionOptions;
pub use header::HeaderField;
pub use header::HeaderList;
pub(crate) use header::{is_field_value, is_token};

mod target;
pub use target::RequestTarget;
pub use target::TargetForm;

mod error;
pub use error::HandlerError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
