//! Request-line and header-block parsing.

use http::header::{HeaderName, HeaderValue};
use http::{Method, Version};
use tracing::trace;

use crate::codec::decode_component;
use crate::protocol::{Arguments, Headers, ParseError, RequestHead, MAX_ARGUMENTS};

/// Parse a complete request head (everything up to and including the
/// blank line).
///
/// The request line must be `METHOD SP TARGET SP VERSION` with a method
/// token of `[A-Za-z-]+` and a version of `HTTP/1.0` or `HTTP/1.1`.
/// Header lines that do not fit the `name: value` shape are skipped.
/// The query string is decoded into an [`Arguments`] map.
pub fn parse_request_head(bytes: &[u8]) -> Result<RequestHead, ParseError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ParseError::malformed_head("head is not valid utf-8"))?;

    let mut lines = text.split("\r\n");
    let request_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| ParseError::malformed_head("empty request line"))?;

    let (method, uri, version) = parse_request_line(request_line)?;

    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (uri.clone(), String::new()),
    };

    let mut headers = Headers::new();
    parse_header_lines(lines, &mut headers);

    let mut arguments = Arguments::new();
    parse_argument_pairs(&query, &mut arguments)?;

    Ok(RequestHead::new(method, uri, path, query, version, headers, arguments))
}

fn parse_request_line(line: &str) -> Result<(Method, String, Version), ParseError> {
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() != 3 {
        return Err(ParseError::malformed_head(format!("malformed request line {line:?}")));
    }

    let method_token = parts[0];
    let is_method_token = !method_token.is_empty()
        && method_token.bytes().all(|b| b.is_ascii_alphabetic() || b == b'-');
    if !is_method_token {
        return Err(ParseError::malformed_head(format!("invalid method token {method_token:?}")));
    }
    let method = Method::from_bytes(method_token.as_bytes())
        .map_err(|_| ParseError::malformed_head(format!("invalid method token {method_token:?}")))?;

    let version = match parts[2] {
        "HTTP/1.0" => Version::HTTP_10,
        "HTTP/1.1" => Version::HTTP_11,
        other => {
            return Err(ParseError::malformed_head(format!("unsupported version {other:?}")))
        }
    };

    Ok((method, parts[1].to_string(), version))
}

/// Accumulate `name: value` lines into a header set, skipping anything
/// that does not parse. A single leading space is trimmed from values.
pub(crate) fn parse_header_lines<'a>(
    lines: impl Iterator<Item = &'a str>,
    headers: &mut Headers,
) {
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            trace!(line, "skipping header line without a colon");
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            trace!(line, "skipping header line with an invalid name");
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            trace!(line, "skipping header line with an invalid value");
            continue;
        };
        headers.add(name, value);
    }
}

/// Decode `key=value&…` pairs into an argument map. At most
/// [`MAX_ARGUMENTS`] pairs are consumed from one source.
pub(crate) fn parse_argument_pairs(
    input: &str,
    arguments: &mut Arguments,
) -> Result<(), ParseError> {
    if input.is_empty() {
        return Ok(());
    }
    for pair in input.split('&').take(MAX_ARGUMENTS) {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        arguments.insert(decode_component(name)?, decode_component(value)?);
    }
    Ok(())
}
