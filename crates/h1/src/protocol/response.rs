use http::Response;

/// Status and headers of a response, before any body is attached.
pub type ResponseHead = Response<()>;
