//! Case-insensitive header set.

use http::header::{AsHeaderName, HeaderName, HeaderValue};
use http::HeaderMap;

/// A case-insensitive mapping from header name to value.
///
/// Repeated headers are joined with `", "` as they arrive, so a lookup
/// always yields a single value. Backed by [`http::HeaderMap`].
#[derive(Debug, Default)]
pub struct Headers {
    inner: HeaderMap,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, joining it onto any existing value for the name.
    pub fn add(&mut self, name: HeaderName, value: HeaderValue) {
        if let Some(existing) = self.inner.get(&name) {
            if let (Ok(old), Ok(new)) = (existing.to_str(), value.to_str()) {
                if let Ok(joined) = HeaderValue::from_str(&format!("{old}, {new}")) {
                    self.inner.insert(name, joined);
                    return;
                }
            }
        }
        self.inner.insert(name, value);
    }

    /// Look up a header value. Values that are not visible ASCII are
    /// treated as absent.
    pub fn get<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.inner.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn contains<K: AsHeaderName>(&self, name: K) -> bool {
        self.inner.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &str)> {
        self.inner.iter().filter_map(|(name, value)| Some((name, value.to_str().ok()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.add(HeaderName::from_static("x-custom"), HeaderValue::from_static("1"));

        assert_eq!(headers.get("X-Custom"), Some("1"));
        assert_eq!(headers.get("x-custom"), Some("1"));
        assert!(headers.contains("X-CUSTOM"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn repeated_headers_join_with_comma() {
        let mut headers = Headers::new();
        headers.add(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.add(header::COOKIE, HeaderValue::from_static("b=2"));
        headers.add(header::COOKIE, HeaderValue::from_static("c=3"));

        assert_eq!(headers.get(header::COOKIE), Some("a=1, b=2, c=3"));
        assert_eq!(headers.len(), 1);
    }
}
