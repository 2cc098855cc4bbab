//! Cached value of the `Date` response header.
//!
//! Formatting an HTTP date on every response is wasted work, the value only changes
//! once a second. The cache keeps the formatted value for the current second and
//! rebuilds it on the first read after the second has passed.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use once_cell::sync::Lazy;

static DATE_CACHE: Lazy<DateCache> = Lazy::new(DateCache::new);

struct DateCache {
    current: ArcSwap<(u64, HeaderValue)>,
}

impl DateCache {
    fn new() -> Self {
        let now = unix_seconds();
        Self { current: ArcSwap::from_pointee((now, format_date())) }
    }

    fn header_value(&self) -> HeaderValue {
        let now = unix_seconds();
        let current = self.current.load();
        if current.0 == now {
            return current.1.clone();
        }

        let value = format_date();
        self.current.store(Arc::new((now, value.clone())));
        value
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
}

fn format_date() -> HeaderValue {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    HeaderValue::from_maybe_shared(Bytes::from_owner(buf)).unwrap_or(HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"))
}

/// The current date in IMF-fixdate form, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub(crate) fn http_date() -> HeaderValue {
    DATE_CACHE.header_value()
}
