//! Form-body decoding: urlencoded and multipart.

use bytes::Bytes;
use http::header;
use tracing::warn;

use crate::codec::{parse_argument_pairs, parse_header_lines};
use crate::protocol::{Arguments, FileMap, FilePart, Headers, ParseError};

/// Everything decoded out of one request body.
#[derive(Debug, Default)]
pub struct FormData {
    pub arguments: Arguments,
    pub files: FileMap,
}

/// Decode a request body according to its content type.
///
/// `application/x-www-form-urlencoded` bodies become arguments;
/// `multipart/form-data` bodies become arguments plus [`FilePart`]
/// records. Any other content type decodes to nothing.
pub fn parse_form_body(content_type: &str, body: &[u8]) -> Result<FormData, ParseError> {
    if content_type.contains("application/x-www-form-urlencoded") {
        let mut form = FormData::default();
        let text = String::from_utf8_lossy(body);
        parse_argument_pairs(&text, &mut form.arguments)?;
        return Ok(form);
    }

    if content_type.contains("multipart/form-data") {
        let Some(boundary) = boundary_parameter(content_type) else {
            return Err(ParseError::malformed_body("multipart content type without a boundary"));
        };
        return parse_multipart(boundary, body);
    }

    Ok(FormData::default())
}

fn boundary_parameter(content_type: &str) -> Option<&str> {
    let after = &content_type[content_type.find("boundary=")? + "boundary=".len()..];
    let value = after.split(';').next().unwrap_or(after).trim();
    let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
    (!value.is_empty()).then_some(value)
}

fn parse_multipart(boundary: &str, body: &[u8]) -> Result<FormData, ParseError> {
    let marker = format!("--{boundary}");
    let marker = marker.as_bytes();
    let mut form = FormData::default();

    let Some(first) = find(body, marker) else {
        return Err(ParseError::malformed_body("multipart boundary never appears in body"));
    };

    let mut cursor = first + marker.len();
    loop {
        let rest = &body[cursor..];
        if rest.starts_with(b"--") {
            break;
        }
        let Some(line_end) = find(rest, b"\r\n") else {
            break;
        };

        let part_start = cursor + line_end + 2;
        let Some(next) = find(&body[part_start..], marker) else {
            warn!("multipart body ends without a closing boundary");
            break;
        };
        let part_end = part_start + next;

        let part = &body[part_start..part_end];
        let part = part.strip_suffix(b"\r\n").unwrap_or(part);
        parse_part(part, &mut form);

        cursor = part_end + marker.len();
    }

    Ok(form)
}

fn parse_part(part: &[u8], form: &mut FormData) {
    let Some(split) = find(part, b"\r\n\r\n") else {
        warn!("skipping multipart part without a header terminator");
        return;
    };
    let (head, content) = (&part[..split], &part[split + 4..]);
    let Ok(head) = std::str::from_utf8(head) else {
        warn!("skipping multipart part with non-utf8 headers");
        return;
    };

    let mut headers = Headers::new();
    parse_header_lines(head.split("\r\n"), &mut headers);

    let Some(disposition) = headers.get(header::CONTENT_DISPOSITION) else {
        warn!("skipping multipart part without content-disposition");
        return;
    };
    let Some(name) = disposition_parameter(disposition, "name") else {
        warn!("skipping multipart part without a field name");
        return;
    };

    match disposition_parameter(disposition, "filename") {
        Some(filename) => {
            let content_type = headers
                .get(header::CONTENT_TYPE)
                .unwrap_or("application/octet-stream")
                .to_string();
            form.files.entry(name).or_default().push(FilePart {
                filename,
                content_type,
                body: Bytes::copy_from_slice(content),
            });
        }
        None => {
            form.arguments.insert(name, String::from_utf8_lossy(content).into_owned());
        }
    }
}

fn disposition_parameter(value: &str, name: &str) -> Option<String> {
    for piece in value.split(';').skip(1) {
        let Some((key, val)) = piece.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case(name) {
            return Some(val.trim().trim_matches('"').to_string());
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
