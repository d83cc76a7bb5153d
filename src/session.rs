//! Per-connection session state machine.
//!
//! A [`ClientSession`] owns one connected socket, one framer, and one
//! receive buffer rented from the shared I/O op pool. [`start`] drives the
//! receive loop; every terminal condition - peer hangup, framing overflow,
//! socket error, cancellation, explicit [`stop`] - converges on the same
//! teardown: shut the socket down once, then raise the disconnected event
//! exactly once.
//!
//! [`start`]: ClientSession::start
//! [`stop`]: ClientSession::stop

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::framing::Framer;
use crate::pool::{IoOp, IoOpPool};
use crate::{NetframeError, Result};

/// Stable per-session identifier, unique within one server.
pub type SessionId = u64;

/// Error raised on misuse of the session API.
///
/// Distinct from socket errors and framing overflow; the caller can recover
/// from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientError {
    /// `send` (or an internal write) was attempted while the session is not
    /// running.
    #[error("session is not running")]
    NotRunning,

    /// `start` was called a second time.
    #[error("session was already started")]
    AlreadyStarted,
}

/// Sink for the events a running session emits.
///
/// The server wires this to the user-supplied [`Handler`](crate::Handler);
/// tests can implement it directly. An `Err` from `on_message` terminates
/// the session - handler failures are deliberately not isolated per message,
/// since swallowing them hides bugs.
pub trait SessionEvents<M>: Send + Sync + 'static {
    /// Called once per framed message, in byte-stream order.
    fn on_message(
        &self,
        session: &Arc<ClientSession<M>>,
        message: M,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Called exactly once, after the last message the session observed.
    fn on_disconnected(&self, session: &Arc<ClientSession<M>>) -> impl Future<Output = ()> + Send;
}

const FRESH: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// One accepted connection: receive loop, framer, and send surface.
///
/// The session exclusively owns its socket and framer and shares the I/O op
/// pool with the rest of the server. The state machine is
/// `fresh -> running -> stopped`; `stopped` is terminal and [`stop`] is
/// idempotent.
///
/// [`stop`]: ClientSession::stop
pub struct ClientSession<M> {
    id: SessionId,
    peer_addr: SocketAddr,
    state: AtomicU8,
    disconnect_raised: AtomicBool,
    cancel: CancellationToken,
    reader: Mutex<Option<OwnedReadHalf>>,
    framer: Mutex<Option<Box<dyn Framer<M>>>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    buffer_size: usize,
    pool: Arc<IoOpPool>,
}

impl<M: Send + 'static> ClientSession<M> {
    /// Wrap an accepted, connected stream.
    ///
    /// The caller supplies the id; it stays stable for the session's
    /// lifetime.
    pub fn new(
        id: SessionId,
        stream: TcpStream,
        framer: Box<dyn Framer<M>>,
        buffer_size: usize,
        pool: Arc<IoOpPool>,
    ) -> Result<Self> {
        if buffer_size == 0 {
            return Err(NetframeError::Config("buffer_size must be > 0".to_string()));
        }
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            id,
            peer_addr,
            state: AtomicU8::new(FRESH),
            disconnect_raised: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            reader: Mutex::new(Some(reader)),
            framer: Mutex::new(Some(framer)),
            writer: tokio::sync::Mutex::new(Some(writer)),
            buffer_size,
            pool,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Run the session until it stops.
    ///
    /// Drives the receive loop on the calling task and completes once the
    /// session has fully stopped and the disconnected event has been
    /// raised. Cancelling `cancel` (or the session's own token, via
    /// [`stop`](ClientSession::stop)) triggers a graceful stop.
    ///
    /// The returned error reports the terminal condition for sessions that
    /// ended on a socket, framing, pool, or handler failure; a peer hangup
    /// or cancellation completes with `Ok(())`.
    pub async fn start<E>(
        self: Arc<Self>,
        events: Arc<E>,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        E: SessionEvents<M>,
    {
        let reader = self
            .reader
            .lock()
            .take()
            .ok_or(ClientError::AlreadyStarted)?;
        let framer = self
            .framer
            .lock()
            .take()
            .ok_or(ClientError::AlreadyStarted)?;

        // A session stopped before start stays stopped; the loop below then
        // exits on its first state check.
        let _ = self
            .state
            .compare_exchange(FRESH, RUNNING, Ordering::AcqRel, Ordering::Acquire);

        let result = Self::receive_loop(&self, reader, framer, &events, &cancel).await;

        if let Err(ref e) = result {
            debug!("Session {} terminated: {}", self.id, e);
        }
        self.stop().await;
        Self::raise_disconnected(&self, &events).await;
        result
    }

    /// Stop the session.
    ///
    /// Idempotent: the first call transitions to `stopped`, cancels the
    /// internal token (waking the receive loop), and shuts the socket down
    /// in an orderly fashion; later calls return immediately. The socket is
    /// closed exactly once regardless of which path got here first.
    pub async fn stop(&self) {
        if self.state.swap(STOPPED, Ordering::AcqRel) == STOPPED {
            return;
        }
        self.cancel.cancel();

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("Session {} socket shutdown failed: {}", self.id, e);
            }
        }
        debug!("Session {} stopped (peer: {})", self.id, self.peer_addr);
    }

    /// Queue one send and await its completion.
    ///
    /// Sends on the same session are serialized internally; ordering across
    /// concurrent callers is whatever order they win the send lock in.
    /// Fails with [`ClientError::NotRunning`] once the session has stopped
    /// (or before it started). A socket failure stops the session and
    /// propagates.
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        if !self.is_running() {
            return Err(ClientError::NotRunning.into());
        }

        let mut op = self.pool.get()?;
        op.buffer_mut().extend_from_slice(payload);

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            // Lost the race against stop().
            drop(guard);
            let _ = self.pool.put(op);
            return Err(ClientError::NotRunning.into());
        };
        let write_result = writer.write_all(op.buffer().as_ref()).await;
        drop(guard);

        if self.pool.put(op).is_err() {
            debug!("Session {} dropping send op, pool disposed", self.id);
        }

        match write_result {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Session {} send failed: {}", self.id, e);
                self.stop().await;
                Err(e.into())
            }
        }
    }

    /// Raise the disconnected event if it has not fired yet.
    ///
    /// The normal path is the epilogue of [`start`]; the server also calls
    /// this when a session task dies without reaching it.
    ///
    /// [`start`]: ClientSession::start
    pub(crate) async fn raise_disconnected<E>(this: &Arc<Self>, events: &Arc<E>)
    where
        E: SessionEvents<M>,
    {
        if !this.disconnect_raised.swap(true, Ordering::AcqRel) {
            events.on_disconnected(this).await;
        }
    }

    /// Rent the receive op, pump the socket, and return the op on the way
    /// out unless the pool has been disposed underneath us.
    async fn receive_loop<E>(
        this: &Arc<Self>,
        mut reader: OwnedReadHalf,
        mut framer: Box<dyn Framer<M>>,
        events: &Arc<E>,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        E: SessionEvents<M>,
    {
        let mut op = this.pool.get()?;
        op.buffer_mut().resize(this.buffer_size, 0);

        let result = Self::pump(this, &mut reader, framer.as_mut(), &mut op, events, cancel).await;

        if this.pool.put(op).is_err() {
            debug!("Session {} dropping receive op, pool disposed", this.id);
        }
        result
    }

    async fn pump<E>(
        this: &Arc<Self>,
        reader: &mut OwnedReadHalf,
        framer: &mut dyn Framer<M>,
        op: &mut IoOp,
        events: &Arc<E>,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        E: SessionEvents<M>,
    {
        loop {
            if this.state.load(Ordering::Acquire) != RUNNING {
                return Ok(());
            }

            let bytes_read = tokio::select! {
                _ = this.cancel.cancelled() => return Ok(()),
                _ = cancel.cancelled() => return Ok(()),
                read = reader.read(op.buffer_mut().as_mut()) => read?,
            };

            if bytes_read == 0 {
                debug!("Session {} peer closed (peer: {})", this.id, this.peer_addr);
                return Ok(());
            }

            if let Err(e) = framer.feed(&op.buffer()[..bytes_read]) {
                warn!("Session {} framing overflow: {}", this.id, e);
                return Err(e.into());
            }

            loop {
                match framer.next() {
                    Ok(Some(message)) => {
                        events.on_message(this, message).await?;
                        // Let sibling tasks run between messages of a large
                        // batch.
                        tokio::task::yield_now().await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Session {} framing overflow: {}", this.id, e);
                        return Err(e.into());
                    }
                }
            }
        }
    }
}

impl<M> std::fmt::Debug for ClientSession<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state.load(Ordering::Acquire))
            .finish()
    }
}
