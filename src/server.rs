//! TCP server: admission control, accept loop, and session lifecycle.
//!
//! The server owns the listening socket, an admission semaphore sized to
//! `max_connections`, the live-session registry, and the shared I/O op
//! pool. Each accepted connection consumes one admission permit; the permit
//! is released exactly once - on disconnect, or immediately if the accept
//! pipeline fails before a session exists.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::framing::FramerFactory;
use crate::handler::Handler;
use crate::pool::IoOpPool;
use crate::session::{ClientSession, SessionEvents, SessionId};
use crate::{NetframeError, Result};

/// Routes session events to the user handler and keeps the registry honest.
///
/// Registry removal happens inside the disconnect path, before the
/// admission permit is released, so registry size never exceeds consumed
/// permits.
struct SessionDispatcher<M, H> {
    handler: H,
    sessions: DashMap<SessionId, Arc<ClientSession<M>>>,
}

impl<M, H> SessionEvents<M> for SessionDispatcher<M, H>
where
    M: Send + 'static,
    H: Handler<M>,
{
    async fn on_message(&self, session: &Arc<ClientSession<M>>, message: M) -> Result<()> {
        self.handler.on_message(session, message).await
    }

    async fn on_disconnected(&self, session: &Arc<ClientSession<M>>) {
        self.handler.on_disconnected(session).await;
        self.sessions.remove(&session.id());
    }
}

/// Asynchronous TCP server generic over the message type `M`, the framing
/// factory `F`, and the application handler `H`.
///
/// Accepts at most `max_connections` concurrent sessions; an additional
/// client waits in the listen backlog until a slot frees up. [`run`] drives
/// the accept loop until cancelled or [`dispose`]d.
///
/// [`run`]: Server::run
/// [`dispose`]: Server::dispose
pub struct Server<M, F, H>
where
    M: Send + 'static,
    F: FramerFactory<M>,
    H: Handler<M>,
{
    config: ServerConfig,
    factory: F,
    dispatcher: Arc<SessionDispatcher<M, H>>,
    permits: Arc<Semaphore>,
    pool: Arc<IoOpPool>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    next_session_id: AtomicU64,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
    disposed: AtomicBool,
}

impl<M, F, H> Server<M, F, H>
where
    M: Send + 'static,
    F: FramerFactory<M>,
    H: Handler<M>,
{
    /// Validate the configuration and build a server.
    ///
    /// Fails fast on configuration errors; binding happens later, in
    /// [`run`](Server::run).
    pub fn new(config: ServerConfig, factory: F, handler: H) -> Result<Self> {
        config.validate()?;
        info!(
            "Server configured on {}:{} (max_connections: {}, buffer_size: {})",
            config.ip_address, config.port, config.max_connections, config.buffer_size
        );
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            factory,
            dispatcher: Arc::new(SessionDispatcher {
                handler,
                sessions: DashMap::new(),
            }),
            pool: Arc::new(IoOpPool::new()),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            next_session_id: AtomicU64::new(1),
            local_addr: parking_lot::Mutex::new(None),
            disposed: AtomicBool::new(false),
        })
    }

    /// The bound listener address, available once [`run`](Server::run) has
    /// started listening. Useful when binding to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Number of live sessions in the registry.
    pub fn active_sessions(&self) -> usize {
        self.dispatcher.sessions.len()
    }

    /// Free admission slots.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Bind, listen, and accept until cancelled or disposed.
    ///
    /// Cancelling `cancel` stops every session gracefully and re-surfaces
    /// as [`NetframeError::Cancelled`]; [`dispose`](Server::dispose) ends
    /// the loop with `Ok(())`.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let listener = self.bind_listener()?;
        let local = listener.local_addr()?;
        *self.local_addr.lock() = Some(local);
        info!("Server listening on {}", local);

        // Fold external cancellation into the shutdown token so sessions
        // observe a single stop signal.
        {
            let external = cancel.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = external.cancelled() => shutdown.cancel(),
                    _ = shutdown.cancelled() => {}
                }
            });
        }

        loop {
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                acquired = Arc::clone(&self.permits).acquire_owned() => match acquired {
                    Ok(permit) => permit,
                    // Semaphore closed by dispose.
                    Err(_) => break,
                },
            };

            let (stream, peer_addr) = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    drop(permit);
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(connection) => connection,
                    Err(e) => {
                        warn!("Accept failed, releasing admission permit: {}", e);
                        drop(permit);
                        continue;
                    }
                },
            };

            if let Err(e) = tune_client_socket(&stream) {
                warn!("Failed to tune client socket {}: {}", peer_addr, e);
            }

            let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            let framer = self.factory.create();
            let session = match ClientSession::new(
                id,
                stream,
                framer,
                self.config.buffer_size,
                Arc::clone(&self.pool),
            ) {
                Ok(session) => Arc::new(session),
                Err(e) => {
                    warn!("Dropping connection {}, session setup failed: {}", peer_addr, e);
                    drop(permit);
                    continue;
                }
            };
            debug!(
                "Client connected: {} as session {} (active: {})",
                peer_addr,
                id,
                self.active_sessions() + 1
            );

            self.dispatcher.handler.on_connected(&session).await;
            self.dispatcher.sessions.insert(id, Arc::clone(&session));

            let dispatcher = Arc::clone(&self.dispatcher);
            let session_cancel = self.shutdown.child_token();
            self.tracker.spawn(async move {
                let outcome = AssertUnwindSafe(
                    Arc::clone(&session).start(Arc::clone(&dispatcher), session_cancel),
                )
                .catch_unwind()
                .await;
                match outcome {
                    Ok(Ok(())) => debug!("Session {} completed", session.id()),
                    Ok(Err(e)) => debug!("Session {} ended with error: {}", session.id(), e),
                    Err(_) => {
                        error!("Session {} task panicked", session.id());
                        session.stop().await;
                        ClientSession::raise_disconnected(&session, &dispatcher).await;
                    }
                }
                // Permit released here, after the disconnect path removed
                // the registry entry.
                drop(permit);
            });
        }

        drop(listener);
        if cancel.is_cancelled() {
            info!("Server run cancelled");
            return Err(NetframeError::Cancelled);
        }
        info!("Server accept loop stopped");
        Ok(())
    }

    /// Shut the server down.
    ///
    /// Idempotent. Closes the listener, stops every live session, awaits
    /// their tasks, then disposes the admission semaphore and the I/O op
    /// pool.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Disposing server");
        self.shutdown.cancel();
        self.permits.close();

        let sessions: Vec<Arc<ClientSession<M>>> = self
            .dispatcher
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for session in sessions {
            session.stop().await;
        }

        self.tracker.close();
        self.tracker.wait().await;
        self.pool.dispose();
        info!("Server disposed");
    }

    /// Build the listener through socket2 so the backlog tracks the
    /// admission capacity.
    fn bind_listener(&self) -> Result<TcpListener> {
        let addr = self.config.socket_addr()?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        let backlog = i32::try_from(self.config.max_connections).unwrap_or(i32::MAX);
        socket.listen(backlog)?;
        Ok(TcpListener::from_std(socket.into())?)
    }
}

/// Per-connection TCP tuning: disable Nagle, enable keepalive.
fn tune_client_socket(stream: &TcpStream) -> std::io::Result<()> {
    let socket_ref = SockRef::from(stream);
    socket_ref.set_nodelay(true)?;
    socket_ref.set_keepalive(true)?;
    Ok(())
}
