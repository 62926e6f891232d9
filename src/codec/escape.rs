//! Percent-encoding of URL components.

use crate::protocol::ParseError;

/// Decode a percent-encoded byte string.
///
/// `%HH` escapes become the byte they name; with `plus_as_space`, `+`
/// becomes a space (the form-urlencoded rule). A truncated escape or a
/// non-hex digit is rejected.
pub fn percent_decode(input: &[u8], plus_as_space: bool) -> Result<Vec<u8>, ParseError> {
    let mut decoded = Vec::with_capacity(input.len());
    let mut bytes = input.iter().copied();
    while let Some(byte) = bytes.next() {
        match byte {
            b'%' => {
                let (Some(high), Some(low)) = (bytes.next(), bytes.next()) else {
                    return Err(ParseError::malformed_encoding("truncated percent-escape"));
                };
                let (Some(high), Some(low)) = (hex_digit(high), hex_digit(low)) else {
                    return Err(ParseError::malformed_encoding(format!(
                        "invalid hex digits in escape %{}{}",
                        high as char, low as char
                    )));
                };
                decoded.push(high << 4 | low);
            }
            b'+' if plus_as_space => decoded.push(b' '),
            other => decoded.push(other),
        }
    }
    Ok(decoded)
}

/// Percent-encode arbitrary bytes so that [`percent_decode`] restores
/// them exactly. Unreserved characters pass through; everything else
/// (including `+` and space) is escaped.
pub fn percent_encode(input: &[u8]) -> String {
    let mut encoded = String::with_capacity(input.len());
    for &byte in input {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(byte as char);
        } else {
            encoded.push('%');
            encoded.push(char::from_digit((byte >> 4) as u32, 16).unwrap_or('0').to_ascii_uppercase());
            encoded.push(char::from_digit((byte & 0xf) as u32, 16).unwrap_or('0').to_ascii_uppercase());
        }
    }
    encoded
}

/// Decode one query/form component into text. Bytes that do not form
/// valid UTF-8 are replaced rather than rejected.
pub(crate) fn decode_component(input: &str) -> Result<String, ParseError> {
    let decoded = percent_decode(input.as_bytes(), true)?;
    Ok(String::from_utf8_lossy(&decoded).into_owned())
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decodes_escapes_and_plus() {
        assert_eq!(percent_decode(b"a%20b", false).unwrap(), b"a b");
        assert_eq!(percent_decode(b"a+b", true).unwrap(), b"a b");
        assert_eq!(percent_decode(b"a+b", false).unwrap(), b"a+b");
        assert_eq!(percent_decode(b"%7E%7e", false).unwrap(), b"~~");
        assert_eq!(percent_decode(b"", true).unwrap(), b"");
    }

    #[test]
    fn rejects_bad_escapes() {
        assert!(matches!(
            percent_decode(b"%zz", false),
            Err(ParseError::MalformedEncoding { .. })
        ));
        assert!(matches!(
            percent_decode(b"%4", false),
            Err(ParseError::MalformedEncoding { .. })
        ));
        assert!(matches!(
            percent_decode(b"100%", false),
            Err(ParseError::MalformedEncoding { .. })
        ));
    }

    proptest! {
        #[test]
        fn round_trips_arbitrary_bytes(input in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = percent_encode(&input);
            let decoded = percent_decode(encoded.as_bytes(), true).unwrap();
            prop_assert_eq!(decoded, input);
        }
    }
}
