//! Inbound stream handlers.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::stream::Stream;

/// A registered callback invoked once per inbound stream.
///
/// Handlers are plain values looked up by protocol ID and invoked
/// indirectly, one independently scheduled task per delivered stream. The
/// boxed-future shape lets any async closure over a [`Stream`] serve as a
/// handler without a bespoke trait.
pub type StreamHandler = Arc<dyn Fn(Stream) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into a [`StreamHandler`] value.
pub(crate) fn into_handler<F, Fut>(handler: F) -> StreamHandler
where
    F: Fn(Stream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |stream| handler(stream).boxed())
}
