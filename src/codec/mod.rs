//! Decoding of HTTP request heads, query strings, and form bodies.
//!
//! Everything here is a pure function over byte strings; the connection
//! layer feeds it whatever the stream produced. The grammar is
//! deliberately permissive where the wire is messy (header lines that do
//! not parse are skipped) and strict where it matters (method token,
//! version token, percent-escapes).

mod escape;
pub use escape::percent_decode;
pub use escape::percent_encode;

mod form;
pub use form::parse_form_body;
pub use form::FormData;

mod head;
pub use head::parse_request_head;

pub(crate) use escape::decode_component;
pub(crate) use head::parse_argument_pairs;
pub(crate) use head::parse_header_lines;
