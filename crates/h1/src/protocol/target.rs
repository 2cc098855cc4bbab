//! Request targets.
//!
//! The raw target is kept as received. [`RequestTarget`] records which form it
//! takes and where its path and query start, so nothing is copied while routing.

use std::ops::Range;

use bytes::Bytes;
use http::uri::Authority;
use http::{Method, Uri};

use crate::ensure;
use crate::protocol::ParseError;

/// The four request-target forms of RFC 9112 section 3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetForm {
    /// `/path?query`
    Origin,
    /// `http://host/path?query`
    Absolute,
    /// `host:port`, only with `CONNECT`
    Authority,
    /// `*`, only with `OPTIONS`
    Asterisk,
}

/// A request target kept exactly as received, still percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    raw: Bytes,
    form: TargetForm,
    authority: Range<usize>,
    path: Range<usize>,
    query: Option<Range<usize>>,
}

impl RequestTarget {
    pub fn parse(method: &Method, raw: Bytes) -> Result<Self, ParseError> {
        ensure!(!raw.is_empty(), ParseError::invalid_request_target("empty target"));
        ensure!(
            raw.iter().all(|b| b.is_ascii_graphic()),
            ParseError::invalid_request_target("target contains invalid characters")
        );

        if method == Method::CONNECT {
            Authority::from_maybe_shared(raw.clone())
                .map_err(|e| ParseError::invalid_request_target(format!("invalid authority form: {e}")))?;
            let len = raw.len();
            return Ok(Self { raw, form: TargetForm::Authority, authority: 0..len, path: len..len, query: None });
        }

        match raw[0] {
            b'/' => {
                let (path, query) = split_query(&raw, 0);
                Ok(Self { raw, form: TargetForm::Origin, authority: 0..0, path, query })
            }
            b'*' => {
                ensure!(raw.len() == 1, ParseError::invalid_request_target("invalid asterisk form"));
                ensure!(method == Method::OPTIONS, ParseError::invalid_request_target("asterisk form requires OPTIONS"));
                Ok(Self { raw, form: TargetForm::Asterisk, authority: 0..0, path: 0..1, query: None })
            }
            _ => {
                let uri = Uri::from_maybe_shared(raw.clone())
                    .map_err(|e| ParseError::invalid_request_target(format!("invalid absolute form: {e}")))?;
                ensure!(
                    uri.scheme().is_some() && uri.authority().is_some(),
                    ParseError::invalid_request_target("absolute form requires scheme and authority")
                );

                let authority_start = raw.windows(3).position(|w| w == b"://").map_or(0, |i| i + 3);
                let authority_end = raw[authority_start..]
                    .iter()
                    .position(|b| *b == b'/' || *b == b'?')
                    .map_or(raw.len(), |i| authority_start + i);
                let (path, query) = split_query(&raw, authority_end);
                Ok(Self { raw, form: TargetForm::Absolute, authority: authority_start..authority_end, path, query })
            }
        }
    }

    #[inline]
    pub fn form(&self) -> TargetForm {
        self.form
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Path component; empty for the authority form and for `http://host`.
    #[inline]
    pub fn path(&self) -> &[u8] {
        &self.raw[self.path.clone()]
    }

    #[inline]
    pub fn query(&self) -> Option<&[u8]> {
        self.query.clone().map(|range| &self.raw[range])
    }

    /// Authority of the absolute and authority forms.
    pub fn authority(&self) -> Option<&[u8]> {
        match self.form {
            TargetForm::Absolute | TargetForm::Authority => Some(&self.raw[self.authority.clone()]),
            TargetForm::Origin | TargetForm::Asterisk => None,
        }
    }

    pub fn to_uri(&self) -> Result<Uri, ParseError> {
        Uri::from_maybe_shared(self.raw.clone()).map_err(ParseError::invalid_request_target)
    }
}

fn split_query(raw: &[u8], path_start: usize) -> (Range<usize>, Option<Range<usize>>) {
    match raw[path_start..].iter().position(|b| *b == b'?') {
        Some(i) => (path_start..path_start + i, Some(path_start + i + 1..raw.len())),
        None => (path_start..raw.len(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(method: Method, raw: &'static str) -> Result<RequestTarget, ParseError> {
        RequestTarget::parse(&method, Bytes::from_static(raw.as_bytes()))
    }

    #[test]
    fn origin_form() {
        let target = parse(Method::GET, "/index/?a=1&b=%20").unwrap();
        assert_eq!(target.form(), TargetForm::Origin);
        assert_eq!(target.path(), b"/index/");
        assert_eq!(target.query(), Some(&b"a=1&b=%20"[..]));
        assert_eq!(target.authority(), None);

        let target = parse(Method::GET, "/a").unwrap();
        assert_eq!(target.path(), b"/a");
        assert_eq!(target.query(), None);
    }

    #[test]
    fn absolute_form() {
        let target = parse(Method::GET, "http://example.com:8080/a/b?c").unwrap();
        assert_eq!(target.form(), TargetForm::Absolute);
        assert_eq!(target.authority(), Some(&b"example.com:8080"[..]));
        assert_eq!(target.path(), b"/a/b");
        assert_eq!(target.query(), Some(&b"c"[..]));

        let target = parse(Method::GET, "http://example.com").unwrap();
        assert_eq!(target.path(), b"");
        assert_eq!(target.authority(), Some(&b"example.com"[..]));
    }

    #[test]
    fn authority_form_only_with_connect() {
        let target = parse(Method::CONNECT, "example.com:443").unwrap();
        assert_eq!(target.form(), TargetForm::Authority);
        assert_eq!(target.authority(), Some(&b"example.com:443"[..]));

        assert!(parse(Method::CONNECT, "/path").is_err());
        assert!(parse(Method::GET, "example.com:443").is_err());
    }

    #[test]
    fn asterisk_form_only_with_options() {
        assert_eq!(parse(Method::OPTIONS, "*").unwrap().form(), TargetForm::Asterisk);
        assert!(parse(Method::GET, "*").is_err());
        assert!(parse(Method::OPTIONS, "**").is_err());
    }

    #[test]
    fn rejects_control_and_non_ascii_bytes() {
        assert!(RequestTarget::parse(&Method::GET, Bytes::from_static(b"/a\x01")).is_err());
        assert!(RequestTarget::parse(&Method::GET, Bytes::from_static(b"/caf\xc3\xa9")).is_err());
        assert!(parse(Method::GET, "").is_err());
    }
}
