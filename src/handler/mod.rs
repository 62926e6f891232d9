//! The application-facing handler contract.

use async_trait::async_trait;
use futures::future::LocalBoxFuture;

use crate::protocol::Request;

/// The application entry point: one call per decoded request.
///
/// The handler must eventually call [`Request::finish`]; it may call the
/// write methods any number of times first, across awaits. Handlers run
/// on the reactor thread and never move across threads, so neither the
/// handler nor its futures need to be `Send`.
#[async_trait(?Send)]
pub trait RequestHandler: 'static {
    async fn handle(&self, request: Request<'_>);
}

/// Adapts a closure returning a boxed future into a [`RequestHandler`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap a closure as a handler.
///
/// ```ignore
/// let handler = make_handler(|mut request: Request<'_>| {
///     async move {
///         let _ = request.write_bytes("HTTP/1.1 204 No Content\r\n\r\n").await;
///         let _ = request.finish().await;
///     }
///     .boxed_local()
/// });
/// ```
pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(Request<'a>) -> LocalBoxFuture<'a, ()> + 'static,
{
    HandlerFn { f }
}

#[async_trait(?Send)]
impl<F> RequestHandler for HandlerFn<F>
where
    F: for<'a> Fn(Request<'a>) -> LocalBoxFuture<'a, ()> + 'static,
{
    async fn handle(&self, request: Request<'_>) {
        (self.f)(request).await
    }
}
