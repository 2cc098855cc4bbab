//! Fixed-width recognition of HTTP methods and versions.
//!
//! Every known token is stored as a little-endian `u64` pattern plus a mask
//! covering its length, so matching eight bytes of input costs one masked
//! comparison per candidate. Method patterns include the space that must follow
//! the method, which stops `GET` from matching the start of `GETS /`.

use http::{Method, Version};

/// Width in bytes of a token window.
pub const TOKEN_WIDTH: usize = 8;

#[derive(Debug)]
struct KnownToken<T> {
    pattern: u64,
    mask: u64,
    len: usize,
    value: T,
}

const fn known<T>(token: &[u8], value: T) -> KnownToken<T> {
    assert!(token.len() <= TOKEN_WIDTH);
    let mut pattern = 0u64;
    let mut mask = 0u64;
    let mut i = 0;
    while i < token.len() {
        pattern |= (token[i] as u64) << (8 * i);
        mask |= 0xFF << (8 * i);
        i += 1;
    }
    KnownToken { pattern, mask, len: token.len(), value }
}

static METHODS: [KnownToken<Method>; 9] = [
    known(b"GET ", Method::GET),
    known(b"PUT ", Method::PUT),
    known(b"POST ", Method::POST),
    known(b"HEAD ", Method::HEAD),
    known(b"TRACE ", Method::TRACE),
    known(b"PATCH ", Method::PATCH),
    known(b"DELETE ", Method::DELETE),
    known(b"CONNECT ", Method::CONNECT),
    known(b"OPTIONS ", Method::OPTIONS),
];

static VERSIONS: [KnownToken<Version>; 2] = [known(b"HTTP/1.1", Version::HTTP_11), known(b"HTTP/1.0", Version::HTTP_10)];

#[inline]
fn window(bytes: &[u8]) -> u64 {
    let mut array = [0u8; TOKEN_WIDTH];
    let n = bytes.len().min(TOKEN_WIDTH);
    array[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(array)
}

/// Matches a known method followed by its space at the start of `bytes`.
///
/// Returns the method and the number of bytes it occupies, trailing space included.
/// Inputs shorter than [`TOKEN_WIDTH`] are treated as zero padded.
pub fn match_method(bytes: &[u8]) -> Option<(Method, usize)> {
    let value = window(bytes);
    METHODS.iter().find(|known| value & known.mask == known.pattern).map(|known| (known.value.clone(), known.len))
}

/// Matches `bytes` against the supported version tokens. The whole slice must be the token.
pub fn match_version(bytes: &[u8]) -> Option<Version> {
    if bytes.len() != TOKEN_WIDTH {
        return None;
    }
    let value = window(bytes);
    VERSIONS.iter().find(|known| value == known.pattern).map(|known| known.value)
}
