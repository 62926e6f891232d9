pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod reactor;
pub mod server;
pub mod stream;

mod utils;

pub(crate) use utils::ensure;

pub type Error = anyhow::Error;
pub type Result<T> = anyhow::Result<T>;
