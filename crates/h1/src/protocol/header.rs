//! Request header fields in arrival order.
//!
//! Unlike [`HeaderMap`], a [`HeaderList`] keeps the exact order and spelling of the
//! fields a client sent, duplicates included. Names compare case-insensitively.

use std::slice;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::protocol::ParseError;

/// One `name: value` field. Both parts share the memory they were parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    name: Bytes,
    value: Bytes,
}

impl HeaderField {
    pub fn new(name: Bytes, value: Bytes) -> Self {
        Self { name, value }
    }

    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    #[inline]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.as_bytes())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    fields: Vec<HeaderField>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: Bytes, value: Bytes) {
        self.fields.push(HeaderField::new(name, value));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, HeaderField> {
        self.fields.iter()
    }

    /// Value of the first field called `name`.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields.iter().find(|field| field.is(name)).map(HeaderField::value)
    }

    /// Values of every field called `name`, in arrival order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.fields.iter().filter(move |field| field.is(name)).map(HeaderField::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.is(name))
    }

    /// Converts into an [`http::HeaderMap`], which lowercases names and groups duplicates.
    pub fn to_header_map(&self) -> Result<HeaderMap, ParseError> {
        let mut map = HeaderMap::with_capacity(self.fields.len());
        for field in &self.fields {
            let name = HeaderName::from_bytes(&field.name).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_maybe_shared(field.value.clone()).map_err(ParseError::invalid_header)?;
            map.append(name, value);
        }
        Ok(map)
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a HeaderField;
    type IntoIter = slice::Iter<'a, HeaderField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Tokens of the `Connection` header that change connection handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    close: bool,
    keep_alive: bool,
    upgrade: bool,
}

impl ConnectionOptions {
    /// Parses comma separated tokens out of every given `Connection` value.
    pub fn parse<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut options = Self::default();
        for token in values.into_iter().flat_map(|value| value.split(|b| *b == b',')) {
            let token = token.trim_ascii();
            if token.eq_ignore_ascii_case(b"close") {
                options.close = true;
            } else if token.eq_ignore_ascii_case(b"keep-alive") {
                options.keep_alive = true;
            } else if token.eq_ignore_ascii_case(b"upgrade") {
                options.upgrade = true;
            }
        }
        options
    }

    pub fn from_headers(headers: &HeaderList) -> Self {
        Self::parse(headers.get_all(http::header::CONNECTION.as_str()))
    }

    pub fn from_header_map(headers: &HeaderMap) -> Self {
        Self::parse(headers.get_all(http::header::CONNECTION).iter().map(HeaderValue::as_bytes))
    }

    #[inline]
    pub fn close(&self) -> bool {
        self.close
    }

    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    #[inline]
    pub fn upgrade(&self) -> bool {
        self.upgrade
    }
}

/// `tchar` of RFC 9110, the bytes allowed in header names and methods.
#[inline]
pub(crate) fn is_token(byte: u8) -> bool {
    matches!(byte,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
        | b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z')
}

/// Visible characters, obs-text, space and tab.
#[inline]
pub(crate) fn is_field_value(byte: u8) -> bool {
    byte == b'\t' || (byte >= b' ' && byte != 0x7F)
}
