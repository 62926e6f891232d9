//! The decoded request line and header block.

use http::{header, Method, Version};

use crate::protocol::{Arguments, Headers, ParseError};

/// A parsed HTTP request head: request line, header block, and the
/// arguments decoded from the query string.
///
/// Built by [`crate::codec::parse_request_head`]; the version is always
/// `HTTP/1.0` or `HTTP/1.1` (anything else is rejected at parse time).
#[derive(Debug)]
pub struct RequestHead {
    method: Method,
    uri: String,
    path: String,
    query: String,
    version: Version,
    headers: Headers,
    arguments: Arguments,
}

impl RequestHead {
    pub(crate) fn new(
        method: Method,
        uri: String,
        path: String,
        query: String,
        version: Version,
        headers: Headers,
        arguments: Arguments,
    ) -> Self {
        Self { method, uri, path, query, version, headers, arguments }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target exactly as it appeared on the request line.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The target up to the first `?`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string after the first `?`, or empty.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Arguments decoded from the query string.
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// The declared body length, if a `Content-Length` header is present.
    pub fn content_length(&self) -> Result<Option<u64>, ParseError> {
        match self.headers.get(header::CONTENT_LENGTH) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| ParseError::malformed_head(format!("invalid content-length {value:?}"))),
        }
    }

    /// Whether the peer asked for a `100 Continue` before sending its body.
    pub fn expects_continue(&self) -> bool {
        self.headers
            .get(header::EXPECT)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"))
    }
}
