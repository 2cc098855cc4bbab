//! Parsed request heads and the request handed to handlers.

use http::{Method, Uri, Version, header};

use crate::protocol::body::ReqBody;
use crate::protocol::{ConnectionOptions, HeaderList, ParseError, RequestTarget};

/// Request line and header fields of a request, as received.
#[derive(Debug, Clone)]
pub struct RequestHead {
    method: Method,
    target: RequestTarget,
    version: Version,
    headers: HeaderList,
    connection: ConnectionOptions,
}

impl RequestHead {
    pub fn new(method: Method, target: RequestTarget, version: Version, headers: HeaderList) -> Self {
        let connection = ConnectionOptions::from_headers(&headers);
        Self { method, target, version, headers, connection }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &RequestTarget {
        &self.target
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    pub fn connection(&self) -> ConnectionOptions {
        self.connection
    }

    pub fn uri(&self) -> Result<Uri, ParseError> {
        self.target.to_uri()
    }

    /// Whether the client wants the connection kept open after this exchange.
    ///
    /// HTTP/1.1 defaults to persistent connections, HTTP/1.0 only keeps them with
    /// `Connection: keep-alive`. `Connection: close` always wins.
    pub fn keep_alive(&self) -> bool {
        if self.connection.close() {
            return false;
        }
        self.version == Version::HTTP_11 || self.connection.keep_alive()
    }

    /// `Expect: 100-continue` on an HTTP/1.1 request.
    pub fn expects_continue(&self) -> bool {
        self.version == Version::HTTP_11
            && self
                .headers
                .get(header::EXPECT.as_str())
                .is_some_and(|value| value.trim_ascii().eq_ignore_ascii_case(b"100-continue"))
    }

    /// Whether a response to this request carries no body, whatever its headers say.
    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }
}

/// A request handed to a handler. The body streams straight from the connection.
pub struct Request<'conn> {
    head: RequestHead,
    body: ReqBody<'conn>,
}

impl<'conn> Request<'conn> {
    pub fn new(head: RequestHead, body: ReqBody<'conn>) -> Self {
        Self { head, body }
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn target(&self) -> &RequestTarget {
        self.head.target()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    pub fn headers(&self) -> &HeaderList {
        self.head.headers()
    }

    pub fn body_mut(&mut self) -> &mut ReqBody<'conn> {
        &mut self.body
    }

    pub fn into_body(self) -> ReqBody<'conn> {
        self.body
    }

    pub fn into_parts(self) -> (RequestHead, ReqBody<'conn>) {
        (self.head, self.body)
    }

    /// Converts into an [`http::Request`], normalizing the headers into a [`http::HeaderMap`].
    pub fn into_http(self) -> Result<http::Request<ReqBody<'conn>>, ParseError> {
        let mut request = http::Request::new(self.body);
        *request.method_mut() = self.head.method.clone();
        *request.uri_mut() = self.head.uri()?;
        *request.version_mut() = self.head.version;
        *request.headers_mut() = self.head.headers.to_header_map()?;
        Ok(request)
    }
}

impl std::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request").field("head", &self.head).field("body", &self.body).finish()
    }
}
