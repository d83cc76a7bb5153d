//! The callback surface the server delegates to.

use std::future::Future;
use std::sync::Arc;

use crate::session::ClientSession;
use crate::Result;

/// User-supplied callbacks driven by the [`Server`](crate::Server).
///
/// One handler instance serves every session, so implementations must be
/// safe to call concurrently across sessions. Within a single session the
/// callbacks are sequential: `on_connected` first, then `on_message` in
/// byte-stream order, then `on_disconnected` exactly once.
///
/// Returning an `Err` from `on_message` terminates that session only; the
/// server keeps running.
pub trait Handler<M>: Send + Sync + 'static {
    /// A connection was accepted; fires before its receive loop starts.
    fn on_connected(&self, session: &Arc<ClientSession<M>>) -> impl Future<Output = ()> + Send;

    /// A complete framed message arrived on a session.
    fn on_message(
        &self,
        session: &Arc<ClientSession<M>>,
        message: M,
    ) -> impl Future<Output = Result<()>> + Send;

    /// A session stopped; its admission slot is released right after this
    /// returns.
    fn on_disconnected(&self, session: &Arc<ClientSession<M>>) -> impl Future<Output = ()> + Send;
}
