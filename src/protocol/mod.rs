//! Protocol value types shared across the crate.
//!
//! This module holds the passive data carried through a connection's
//! lifecycle: the case-insensitive header set, the argument map decoded
//! from query strings and form bodies, the parsed request head, the
//! [`Request`] handed to application handlers, and the error hierarchy.

mod arguments;
pub use arguments::Arguments;
pub use arguments::Value;
pub use arguments::MAX_ARGUMENTS;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::StreamError;

mod head;
pub use head::RequestHead;

mod headers;
pub use headers::Headers;

mod request;
pub use request::FileMap;
pub use request::FilePart;
pub use request::Request;
pub use request::ResponseWriter;
