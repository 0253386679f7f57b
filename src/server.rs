//! Server endpoint: accept a SETUP and spawn the connection actor.

use std::sync::Arc;

use crate::{
    config::ConnectionConfig,
    connection::{ConnectionHandle, SetupAcceptor},
    frame::Setup,
    handler::Responder,
    requester::Requester,
    stream::Role,
    transport::FrameIo,
};

/// Builder for the accepting side of a connection.
///
/// The server adopts the keepalive settings and lease flag the client
/// declares in SETUP, so only local resource bounds and the application
/// hooks are configured here. One `Server` accepts one connection; a
/// listener loop constructs one per accepted transport.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use weft::{Payload, Responder, Server};
///
/// struct Pong;
///
/// #[async_trait]
/// impl Responder for Pong {
///     async fn request_response(&self, _payload: Payload) -> weft::Result<Payload> {
///         Ok(Payload::from_data("pong"))
///     }
/// }
///
/// # async fn demo() -> weft::Result<()> {
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:7878").await?;
/// let (socket, _peer) = listener.accept().await?;
/// let (_requester, connection) = Server::new()
///     .responder(Pong)
///     .accept(weft::transport::framed(socket));
/// connection.closed().await
/// # }
/// ```
pub struct Server {
    config: ConnectionConfig,
    responder: Arc<dyn Responder>,
    acceptor: Option<SetupAcceptor>,
}

impl Default for Server {
    fn default() -> Self { Self::new() }
}

impl Server {
    /// Start from the default configuration and a reject-all responder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
            responder: Arc::new(()),
            acceptor: None,
        }
    }

    /// Fragment frames whose payload exceeds `bytes` (zero disables).
    #[must_use]
    pub fn fragment_size(mut self, bytes: usize) -> Self {
        self.config.fragment_size = bytes;
        self
    }

    /// Cap the per-stream reassembly buffer.
    #[must_use]
    pub fn reassembly_limit(mut self, bytes: usize) -> Self {
        self.config.reassembly_max_bytes = bytes;
        self
    }

    /// Serve inbound interactions with `responder`.
    #[must_use]
    pub fn responder(mut self, responder: impl Responder) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    /// Vet the SETUP frame before the connection goes active.
    ///
    /// A returned `Err(reason)` rejects the connection with
    /// ERROR(REJECTED_SETUP) carrying `reason`.
    #[must_use]
    pub fn acceptor<F>(mut self, acceptor: F) -> Self
    where
        F: Fn(&Setup) -> Result<(), String> + Send + Sync + 'static,
    {
        self.acceptor = Some(Box::new(acceptor));
        self
    }

    /// Await the client's SETUP on `io` and spawn the connection actor.
    ///
    /// Returns the requester facade (the server issues requests too) plus
    /// a handle to the spawned task. Must be called within a tokio
    /// runtime.
    pub fn accept<T>(self, io: T) -> (Requester, ConnectionHandle)
    where
        T: FrameIo + 'static,
    {
        crate::client::spawn_connection(io, Role::Server, self.config, self.responder, self.acceptor)
    }
}
